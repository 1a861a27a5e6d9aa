use super::{AppendEntries, Entry, MembershipEvent, NodeID, RequestVote, Result, Term};

/// The host callback surface. The engine never opens sockets, touches disk,
/// or spawns threads; it delegates every effect through this trait, invoked
/// synchronously from inside the public [`Server`](crate::Server) operations.
///
/// Callbacks must not re-enter the server. They may block (e.g. on fsync);
/// the host budgets its timeouts accordingly. A callback error surfaces from
/// the enclosing public operation with prior state mutations intact, so the
/// host must treat it as fatal and recover from durable state.
///
/// The persistence callbacks carry a durability contract: `persist_term` and
/// `persist_vote` must be durable before any message depending on them is
/// sent or acknowledged, and the log callbacks must be durable before they
/// return success.
pub trait Host {
    /// Sends a vote request to a peer. Delivery may fail silently; elections
    /// are retried on timeout.
    fn send_request_vote(&mut self, to: NodeID, msg: &RequestVote) -> Result<()>;

    /// Sends a log replication (or heartbeat) to a peer. Delivery may fail
    /// silently; replication is retried on the next tick.
    fn send_append_entries(&mut self, to: NodeID, msg: &AppendEntries) -> Result<()>;

    /// Applies a committed entry to the host state machine. Called in strict
    /// index order, exactly once per entry on this server.
    fn apply(&mut self, entry: &Entry) -> Result<()>;

    /// Persists the current term.
    fn persist_term(&mut self, term: Term) -> Result<()>;

    /// Persists the vote cast in the current term, or its absence.
    fn persist_vote(&mut self, vote: Option<NodeID>) -> Result<()>;

    /// Persists an entry appended to the log at `entry.index`.
    fn log_offer(&mut self, entry: &Entry) -> Result<()>;

    /// Unpersists an entry truncated from the tail of the log.
    fn log_pop(&mut self, entry: &Entry) -> Result<()>;

    /// Releases an entry compacted away from the front of the log.
    fn log_poll(&mut self, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    /// Reports that a node's log has caught up with the leader's, making it
    /// eligible for promotion to voting membership. Fired at most once per
    /// node; the host typically responds by submitting an
    /// [`EntryKind::AddNode`](crate::EntryKind::AddNode) entry.
    fn promotable(&mut self, _node: NodeID) -> Result<()> {
        Ok(())
    }

    /// Reports a membership change in the node table. `info` carries the
    /// opaque host data from the configuration entry, e.g. a peer address.
    fn membership_event(&mut self, _node: NodeID, _event: MembershipEvent, _info: &[u8]) {}
}

#[cfg(test)]
pub mod test {
    use super::*;

    use crossbeam::channel::Sender;

    /// A recorded host callback.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Callback {
        RequestVote(NodeID, RequestVote),
        AppendEntries(NodeID, AppendEntries),
        Apply(Entry),
        PersistTerm(Term),
        PersistVote(Option<NodeID>),
        Offer(Entry),
        Pop(Entry),
        Poll(Entry),
        Promotable(NodeID),
        Membership(NodeID, MembershipEvent),
    }

    /// A host that records every callback, for test assertions.
    pub struct Recorder {
        callbacks: Vec<Callback>,
        /// When set, log_offer fails with this message.
        pub fail_offer: Option<String>,
    }

    impl Recorder {
        pub fn new() -> Self {
            Self { callbacks: Vec::new(), fail_offer: None }
        }

        /// Returns all recorded callbacks.
        pub fn callbacks(&self) -> Vec<Callback> {
            self.callbacks.clone()
        }

        /// Discards recorded callbacks.
        pub fn clear(&mut self) {
            self.callbacks.clear();
        }
    }

    impl Host for Recorder {
        fn send_request_vote(&mut self, to: NodeID, msg: &RequestVote) -> Result<()> {
            self.callbacks.push(Callback::RequestVote(to, msg.clone()));
            Ok(())
        }

        fn send_append_entries(&mut self, to: NodeID, msg: &AppendEntries) -> Result<()> {
            self.callbacks.push(Callback::AppendEntries(to, msg.clone()));
            Ok(())
        }

        fn apply(&mut self, entry: &Entry) -> Result<()> {
            self.callbacks.push(Callback::Apply(entry.clone()));
            Ok(())
        }

        fn persist_term(&mut self, term: Term) -> Result<()> {
            self.callbacks.push(Callback::PersistTerm(term));
            Ok(())
        }

        fn persist_vote(&mut self, vote: Option<NodeID>) -> Result<()> {
            self.callbacks.push(Callback::PersistVote(vote));
            Ok(())
        }

        fn log_offer(&mut self, entry: &Entry) -> Result<()> {
            if let Some(message) = &self.fail_offer {
                return Err(crate::Error::Callback(message.clone()));
            }
            self.callbacks.push(Callback::Offer(entry.clone()));
            Ok(())
        }

        fn log_pop(&mut self, entry: &Entry) -> Result<()> {
            self.callbacks.push(Callback::Pop(entry.clone()));
            Ok(())
        }

        fn log_poll(&mut self, entry: &Entry) -> Result<()> {
            self.callbacks.push(Callback::Poll(entry.clone()));
            Ok(())
        }

        fn promotable(&mut self, node: NodeID) -> Result<()> {
            self.callbacks.push(Callback::Promotable(node));
            Ok(())
        }

        fn membership_event(&mut self, node: NodeID, event: MembershipEvent, _info: &[u8]) {
            self.callbacks.push(Callback::Membership(node, event));
        }
    }

    /// A host that emits every callback onto a channel, for tests that move
    /// the host into a server but still want to observe its traffic.
    pub struct Emit {
        tx: Sender<Callback>,
    }

    impl Emit {
        pub fn new(tx: Sender<Callback>) -> Self {
            Self { tx }
        }

        fn emit(&self, callback: Callback) -> Result<()> {
            self.tx.send(callback).map_err(|e| crate::Error::Internal(e.to_string()))
        }
    }

    impl Host for Emit {
        fn send_request_vote(&mut self, to: NodeID, msg: &RequestVote) -> Result<()> {
            self.emit(Callback::RequestVote(to, msg.clone()))
        }

        fn send_append_entries(&mut self, to: NodeID, msg: &AppendEntries) -> Result<()> {
            self.emit(Callback::AppendEntries(to, msg.clone()))
        }

        fn apply(&mut self, entry: &Entry) -> Result<()> {
            self.emit(Callback::Apply(entry.clone()))
        }

        fn persist_term(&mut self, term: Term) -> Result<()> {
            self.emit(Callback::PersistTerm(term))
        }

        fn persist_vote(&mut self, vote: Option<NodeID>) -> Result<()> {
            self.emit(Callback::PersistVote(vote))
        }

        fn log_offer(&mut self, entry: &Entry) -> Result<()> {
            self.emit(Callback::Offer(entry.clone()))
        }

        fn log_pop(&mut self, entry: &Entry) -> Result<()> {
            self.emit(Callback::Pop(entry.clone()))
        }

        fn log_poll(&mut self, entry: &Entry) -> Result<()> {
            self.emit(Callback::Poll(entry.clone()))
        }

        fn promotable(&mut self, node: NodeID) -> Result<()> {
            self.emit(Callback::Promotable(node))
        }

        fn membership_event(&mut self, node: NodeID, event: MembershipEvent, _info: &[u8]) {
            _ = self.emit(Callback::Membership(node, event));
        }
    }
}
