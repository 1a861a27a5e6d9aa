use serde::{Deserialize, Serialize};

/// A crate result returning [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// An engine error. Safety violations in incoming messages (stale terms,
/// conflicting logs) are not errors: they produce response messages that the
/// sender interprets to correct itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    /// The operation must be submitted to the leader, and this server isn't
    /// it. The client should retry against the current leader, if any.
    NotLeader,
    /// A voting-configuration change was rejected because an earlier one has
    /// not been committed and applied yet. Only one may be in flight.
    VotingChangeInFlight,
    /// This server has been removed from the committed configuration and no
    /// longer participates in the cluster.
    Shutdown,
    /// A host callback failed. The enclosing operation is incomplete; state
    /// mutations made before the failure remain in effect, and the host
    /// should treat this as fatal and recover from durable state.
    Callback(String),
    /// An internal invariant or resource failure. Treated as fatal.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotLeader => write!(f, "not the leader"),
            Error::VotingChangeInFlight => {
                write!(f, "a voting configuration change is already in flight")
            }
            Error::Shutdown => write!(f, "server removed from the cluster"),
            Error::Callback(message) => write!(f, "host callback failed: {message}"),
            Error::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
