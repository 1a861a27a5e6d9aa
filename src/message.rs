use super::{Entry, Index, NodeID, Term};

use serde::{Deserialize, Serialize};

/// A candidate's request for a vote in a term. Sent to every other voting,
/// active node when an election timeout fires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestVote {
    /// The candidate's term.
    pub term: Term,
    /// The candidate requesting the vote.
    pub candidate: NodeID,
    /// The index of the candidate's last log entry.
    pub last_index: Index,
    /// The term of the candidate's last log entry.
    pub last_term: Term,
}

/// A voter's response to a [`RequestVote`]. Votes are a function of persisted
/// state, so re-delivering the same request yields the same response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    /// The voter's current term. If above the candidate's term, the candidate
    /// steps down.
    pub term: Term,
    /// Whether the vote was granted.
    pub vote_granted: bool,
}

/// A leader's log replication to a peer. An empty entry list doubles as a
/// heartbeat, asserting leadership and propagating the commit index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppendEntries {
    /// The leader's term.
    pub term: Term,
    /// The leader sending the entries.
    pub leader: NodeID,
    /// The index of the entry immediately preceding `entries`, or 0 when
    /// replicating from the start of the log.
    pub prev_index: Index,
    /// The term of the entry at `prev_index`, or 0 when `prev_index` is 0.
    pub prev_term: Term,
    /// The leader's commit index.
    pub commit_index: Index,
    /// The entries to append. Indexes are contiguous from `prev_index + 1`.
    pub entries: Vec<Entry>,
}

/// A peer's response to an [`AppendEntries`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    /// The responder's current term. If above the leader's term, the leader
    /// steps down.
    pub term: Term,
    /// Whether the entries were appended.
    pub success: bool,
    /// On success, the index of the last entry covered by this response. On
    /// rejection, a hint for the leader's next probe: the first index of the
    /// conflicting term if the logs conflict at `prev_index`, otherwise the
    /// responder's last index (the logs were too short).
    pub current_index: Index,
    /// On success, the first index covered by this response, if any entries
    /// were sent.
    pub first_index: Option<Index>,
}

/// A receipt for a submitted entry. The submitter polls
/// [`Server::entry_status`](crate::Server::entry_status) with it to learn the
/// entry's fate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryReceipt {
    /// The index assigned to the entry.
    pub index: Index,
    /// The term the entry was proposed in.
    pub term: Term,
    /// The submitter's opaque entry id.
    pub id: u32,
}

/// The fate of a submitted entry, as far as the local server knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    /// The entry is in the log but not yet committed.
    Pending,
    /// The entry has been committed and will be applied on every server.
    Committed,
    /// The entry was replaced by a later leader's log and will never commit.
    /// The submitter must re-submit it.
    Superseded,
}
