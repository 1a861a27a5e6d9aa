//! An embeddable Raft consensus engine.
//!
//! The crate implements the consensus state machine only: leader election,
//! log replication, commitment, and membership changes for a single
//! consensus group. It never opens sockets, touches disk, or spawns threads.
//! The embedding host drives a [`Server`] with inbound messages, periodic
//! [`Server::tick`] calls, and entry submissions, and provides networking,
//! durable storage, and the application state machine through the [`Host`]
//! callback trait.

#![warn(clippy::all)]

mod encoding;
mod error;
mod host;
mod log;
mod message;
mod node;
mod server;

pub use self::log::{ConfigChange, Entry, EntryKind, Index, Log};
pub use error::{Error, Result};
pub use host::Host;
pub use message::{
    AppendEntries, AppendEntriesResponse, EntryReceipt, EntryStatus, RequestVote,
    RequestVoteResponse,
};
pub use node::{MembershipEvent, Node, NodeID, Nodes, Term};
pub use server::{Options, RoleKind, Server, Status};

/// The default base election timeout, in milliseconds.
pub const ELECTION_TIMEOUT: u64 = 1000;

/// The default leader replication interval, in milliseconds.
pub const HEARTBEAT_INTERVAL: u64 = 200;

/// The default maximum number of entries per AppendEntries message.
pub const MAX_APPEND_ENTRIES: usize = 8;
