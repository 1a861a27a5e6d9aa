use super::{
    AppendEntries, AppendEntriesResponse, ConfigChange, Entry, EntryKind, EntryReceipt,
    EntryStatus, Error, Host, Index, Log, MembershipEvent, Node, NodeID, Nodes, RequestVote,
    RequestVoteResponse, Result, Term, ELECTION_TIMEOUT, HEARTBEAT_INTERVAL, MAX_APPEND_ENTRIES,
};

use itertools::Itertools as _;
use log::{debug, info};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server options.
pub struct Options {
    /// The base election timeout in milliseconds. Each election cycle samples
    /// its actual timeout uniformly from [timeout, 2 * timeout).
    pub election_timeout: u64,
    /// The leader's replication interval in milliseconds. Must be well below
    /// the election timeout, typically by 5-10x.
    pub heartbeat_interval: u64,
    /// Maximum number of entries in a single AppendEntries message.
    pub max_append_entries: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            election_timeout: ELECTION_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            max_append_entries: MAX_APPEND_ENTRIES,
        }
    }
}

/// A server role. A follower replicates state from a leader, a candidate
/// campaigns for leadership, a leader serves submissions and replicates its
/// log to peers.
enum Role {
    Follower {
        /// The known leader in this term, or None if just initialized.
        leader: Option<NodeID>,
    },
    Candidate,
    Leader,
}

/// A server role, for observability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleKind {
    Follower,
    Candidate,
    Leader,
}

/// Server status, as reported by [`Server::status`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// The reporting server.
    pub server: NodeID,
    /// Its role.
    pub role: RoleKind,
    /// The known leader, if any.
    pub leader: Option<NodeID>,
    /// The current term.
    pub term: Term,
    /// The last log index.
    pub last_index: Index,
    /// The commit index.
    pub commit_index: Index,
    /// The applied index.
    pub applied_index: Index,
    /// The match index of every known node, as tracked by a leader.
    pub match_index: HashMap<NodeID, Index>,
}

/// A Raft consensus server: the per-server state machine driving leader
/// election, log replication, commitment, and membership changes for a single
/// consensus group.
///
/// The server is driven synchronously by the host: messages are passed in via
/// the receive methods, time advances via [`Server::tick`], and entries are
/// submitted via [`Server::submit`]. All outbound effects (sending RPCs,
/// persisting state, applying entries) happen through the [`Host`] callbacks,
/// invoked from inside these methods. The server never blocks, never spawns
/// threads, and is not reentrant; the host serializes all calls.
pub struct Server {
    /// The local node ID.
    id: NodeID,
    /// The host callback surface.
    host: Box<dyn Host>,
    opts: Options,
    /// The replicated log.
    log: Log,
    /// All known cluster members, including the local server.
    nodes: Nodes,
    role: Role,
    /// The current term. Durable via `persist_term`.
    term: Term,
    /// The vote cast in the current term, if any. Durable via `persist_vote`.
    voted_for: Option<NodeID>,
    /// The index of the last committed entry. Not durable; recovered from a
    /// log quorum after restarts.
    commit_index: Index,
    /// The index of the last entry applied to the host state machine.
    applied_index: Index,
    /// Milliseconds since the last timer-relevant event: a message from the
    /// leader, a vote grant, or (on a leader) the last heartbeat.
    elapsed: u64,
    /// The sampled election timeout for the current election cycle.
    election_timeout: u64,
    /// The index of the uncommitted voting-configuration change, if any. At
    /// most one may be in flight; set when such an entry enters the log,
    /// cleared when it is applied or truncated.
    voting_change_at: Option<Index>,
    /// Set once this server's own removal from the cluster has been applied.
    /// A shut-down server no longer campaigns, submits, or applies.
    shutdown: bool,
}

impl Server {
    /// Creates a new server with the given voting peers as the bootstrap
    /// configuration. It starts as a leaderless follower at term 0.
    pub fn new(id: NodeID, peers: Vec<NodeID>, host: Box<dyn Host>, opts: Options) -> Self {
        let mut nodes = Nodes::new();
        nodes.insert(Node::new(id, true));
        for peer in peers.into_iter().unique() {
            nodes.insert(Node::new(peer, true));
        }
        let election_timeout = sample_election_timeout(&opts);
        Self {
            id,
            host,
            opts,
            log: Log::new(),
            nodes,
            role: Role::Follower { leader: None },
            term: 0,
            voted_for: None,
            commit_index: 0,
            applied_index: 0,
            elapsed: 0,
            election_timeout,
            voting_change_at: None,
            shutdown: false,
        }
    }

    /// Returns the server's node ID.
    pub fn id(&self) -> NodeID {
        self.id
    }

    /// Returns the current term.
    pub fn term(&self) -> Term {
        self.term
    }

    /// Returns the vote cast in the current term, if any.
    pub fn voted_for(&self) -> Option<NodeID> {
        self.voted_for
    }

    /// Returns the current role.
    pub fn role(&self) -> RoleKind {
        match self.role {
            Role::Follower { .. } => RoleKind::Follower,
            Role::Candidate => RoleKind::Candidate,
            Role::Leader => RoleKind::Leader,
        }
    }

    /// Returns the known leader in the current term, if any.
    pub fn leader(&self) -> Option<NodeID> {
        match self.role {
            Role::Follower { leader } => leader,
            Role::Candidate => None,
            Role::Leader => Some(self.id),
        }
    }

    /// Whether this server currently leads.
    pub fn is_leader(&self) -> bool {
        matches!(self.role, Role::Leader)
    }

    /// Returns the commit index.
    pub fn commit_index(&self) -> Index {
        self.commit_index
    }

    /// Returns the applied index.
    pub fn applied_index(&self) -> Index {
        self.applied_index
    }

    /// Returns the last log index.
    pub fn last_index(&self) -> Index {
        self.log.last_index()
    }

    /// Returns a node record, for host inspection.
    pub fn node(&self, id: NodeID) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Returns the current server status.
    pub fn status(&self) -> Status {
        Status {
            server: self.id,
            role: self.role(),
            leader: self.leader(),
            term: self.term,
            last_index: self.log.last_index(),
            commit_index: self.commit_index,
            applied_index: self.applied_index,
            match_index: self
                .nodes
                .iter()
                .map(|n| (n.id, if n.id == self.id { self.log.last_index() } else { n.match_index }))
                .collect(),
        }
    }

    /// Adds a voting node to the bootstrap configuration. Does not touch the
    /// log or callbacks; runtime membership changes go through
    /// [`Server::submit`] with a membership entry kind instead.
    pub fn add_node(&mut self, id: NodeID) {
        let mut node = Node::new(id, true);
        node.next_index = self.log.last_index() + 1;
        self.nodes.insert(node);
    }

    /// Adds a non-voting node to the bootstrap configuration.
    pub fn add_nonvoting_node(&mut self, id: NodeID) {
        let mut node = Node::new(id, false);
        node.next_index = self.log.last_index() + 1;
        self.nodes.insert(node);
    }

    /// Marks a node active or inactive. Inactive nodes are skipped by
    /// elections and replication and don't count towards quorum, but keep
    /// their table entry; hosts use this to park unreachable peers.
    pub fn set_active(&mut self, id: NodeID, active: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.active = active;
        }
    }

    /// Positions an empty log after a compaction boundary: the snapshot
    /// covered up to `index`, whose entry had `term`. Must precede
    /// [`Server::restore`].
    pub fn restore_snapshot(&mut self, index: Index, term: Term) {
        self.log.reset_base(index + 1, term);
        self.commit_index = index;
        self.applied_index = index;
    }

    /// Replays durable state on startup: the persisted term and vote, then
    /// the retained log entries in order. Entries bypass `log_offer` (they
    /// are already durable) but still rebuild offer-time membership state.
    /// The commit index recovers as the compaction boundary and re-advances
    /// through normal message traffic.
    pub fn restore(
        &mut self,
        term: Term,
        voted_for: Option<NodeID>,
        entries: Vec<Entry>,
    ) -> Result<()> {
        assert_eq!(self.term, 0, "can't restore after message traffic");
        assert_eq!(self.log.last_index() + 1, self.log.base_index(), "log already has entries");
        self.term = term;
        self.voted_for = voted_for;
        for entry in entries {
            let (index, kind, change) = Self::dissect(&entry)?;
            self.log.append_restored(entry);
            self.offer_effects(index, kind, change)?;
        }
        Ok(())
    }

    /// Restores the applied index for hosts that persist it alongside their
    /// state machine, skipping re-application of those entries. Entries at or
    /// below the applied index were necessarily committed.
    pub fn restore_applied(&mut self, applied: Index) {
        assert!(applied + 1 >= self.log.base_index(), "applied index below compaction boundary");
        assert!(applied <= self.log.last_index(), "applied index beyond last entry");
        self.applied_index = applied;
        self.commit_index = self.commit_index.max(applied);
        if self.voting_change_at.is_some_and(|at| at <= applied) {
            self.voting_change_at = None;
        }
    }

    /// Compacts the front of the log up to and including `up_to`, bounded by
    /// the applied index, releasing each entry via `log_poll`. Returns the
    /// number of entries compacted.
    pub fn compact(&mut self, up_to: Index) -> Result<usize> {
        let up_to = up_to.min(self.applied_index);
        let mut count = 0;
        while self.log.base_index() <= up_to {
            self.log.pop_front(self.host.as_mut())?;
            count += 1;
        }
        Ok(count)
    }

    /// Advances time by the given number of milliseconds. Followers and
    /// candidates campaign when their election timeout lapses; a leader
    /// replicates to all active peers on every heartbeat interval. Commits
    /// and applies are advanced at the end.
    pub fn tick(&mut self, elapsed_ms: u64) -> Result<()> {
        self.elapsed += elapsed_ms;
        match self.role {
            Role::Leader => {
                if self.elapsed >= self.opts.heartbeat_interval {
                    self.elapsed = 0;
                    self.broadcast_appends()?;
                }
            }
            Role::Follower { .. } | Role::Candidate => {
                if self.elapsed >= self.election_timeout {
                    if self.can_campaign() {
                        self.campaign()?;
                    } else {
                        self.reset_election_timer();
                    }
                }
            }
        }
        self.maybe_commit()?;
        self.apply_all()
    }

    /// Submits an entry for consensus. Leader-only: the entry is stamped with
    /// the current term and the next index, appended to the log, and
    /// replicated to peers. The returned receipt tracks the entry's fate via
    /// [`Server::entry_status`].
    pub fn submit(&mut self, id: u32, kind: EntryKind, payload: Vec<u8>) -> Result<EntryReceipt> {
        if self.shutdown {
            return Err(Error::Shutdown);
        }
        if !self.is_leader() {
            return Err(Error::NotLeader);
        }
        if kind.is_voting_change() && self.voting_change_at.is_some() {
            return Err(Error::VotingChangeInFlight);
        }

        let index = self.log.last_index() + 1;
        let term = self.term;
        debug!("Appending entry {index} in term {term}");
        self.offer(Entry { index, term, id, kind, payload })?;

        // Eagerly send to peers in steady state, where we've already sent all
        // previous entries. Lagging or divergent peers are caught up by their
        // response handling and by ticks.
        for peer in self.nodes.active_peers(self.id) {
            if self.nodes.get(peer).is_some_and(|n| n.next_index == index) {
                self.send_append(peer)?;
            }
        }

        // A cluster with a single voter commits immediately.
        self.maybe_commit()?;
        self.apply_all()?;
        Ok(EntryReceipt { index, term, id })
    }

    /// Reports the fate of a submitted entry: still pending, committed, or
    /// superseded by a later leader's log (the submitter must re-submit).
    pub fn entry_status(&self, receipt: &EntryReceipt) -> EntryStatus {
        // Compaction only consumes applied entries, so a compacted index was
        // necessarily committed.
        if receipt.index < self.log.base_index() {
            return EntryStatus::Committed;
        }
        match self.log.get(receipt.index) {
            Some(e) if e.term == receipt.term && e.id == receipt.id => {
                if receipt.index <= self.commit_index {
                    EntryStatus::Committed
                } else {
                    EntryStatus::Pending
                }
            }
            // A different entry occupies the index, or it was truncated away.
            _ => EntryStatus::Superseded,
        }
    }

    /// Processes a vote request from a candidate.
    pub fn receive_request_vote(
        &mut self,
        from: NodeID,
        msg: RequestVote,
    ) -> Result<RequestVoteResponse> {
        assert_eq!(from, msg.candidate, "vote request relayed from other node");
        self.observe_term(msg.term)?;

        let grant = self.should_grant_vote(&msg);
        if grant {
            info!("Voting for {from} in term {} election", self.term);
            if self.voted_for != Some(from) {
                self.voted_for = Some(from);
                self.host.persist_vote(Some(from))?;
            }
            self.reset_election_timer();
        } else {
            debug!("Denying vote for {from} in term {}", msg.term);
        }
        Ok(RequestVoteResponse { term: self.term, vote_granted: grant })
    }

    /// Processes a response to our vote request. Reaching a strict majority
    /// of voters (including ourself) wins the election.
    pub fn receive_request_vote_response(
        &mut self,
        from: NodeID,
        msg: RequestVoteResponse,
    ) -> Result<()> {
        self.observe_term(msg.term)?;
        if msg.term < self.term || !matches!(self.role, Role::Candidate) {
            debug!("Ignoring vote response from {from} at term {}", msg.term);
            return Ok(());
        }
        if !msg.vote_granted {
            return Ok(());
        }
        if let Some(node) = self.nodes.get_mut(from) {
            node.has_vote_for_me = true;
        }
        self.maybe_become_leader()
    }

    /// Processes a log replication (or heartbeat) from a leader.
    pub fn receive_append_entries(
        &mut self,
        from: NodeID,
        msg: AppendEntries,
    ) -> Result<AppendEntriesResponse> {
        assert_eq!(from, msg.leader, "append relayed from other node");
        if let Some(first) = msg.entries.first() {
            assert_eq!(first.index, msg.prev_index + 1, "base index mismatch");
        }
        self.observe_term(msg.term)?;

        if msg.term < self.term {
            debug!("Rejecting stale append from {from} at term {}", msg.term);
            return Ok(AppendEntriesResponse {
                term: self.term,
                success: false,
                current_index: self.log.last_index(),
                first_index: None,
            });
        }

        // The sender is the leader in this (now current) term.
        self.follow(from);

        // The entry preceding the batch must match our log.
        if msg.prev_index > 0 && !self.log.has(msg.prev_index, msg.prev_term) {
            let current_index = match self.log.term_at(msg.prev_index) {
                // Conflicting term: point the leader at the first index of the
                // conflicting term, backing it up past the term in one round.
                Some(conflict) => self.first_index_of_term(msg.prev_index, conflict),
                // Our log is too short: point the leader at its end.
                None => self.log.last_index(),
            };
            debug!("Rejecting append at base {}@{} from {from}", msg.prev_index, msg.prev_term);
            return Ok(AppendEntriesResponse {
                term: self.term,
                success: false,
                current_index,
                first_index: None,
            });
        }

        let count = msg.entries.len() as Index;
        for entry in msg.entries {
            match self.log.term_at(entry.index) {
                // New index: append.
                None => self.offer(entry)?,
                // Same entry already present (e.g. a re-delivered message).
                Some(term) if term == entry.term => continue,
                // Conflicting uncommitted suffix: truncate, then append. The
                // leader never sends a batch that would truncate a committed
                // entry.
                Some(_) => {
                    assert!(entry.index > self.commit_index, "conflict below commit index");
                    let dropped = self.log.truncate_from(self.host.as_mut(), entry.index)?;
                    for dropped in &dropped {
                        self.revert_offer(dropped)?;
                    }
                    self.offer(entry)?;
                }
            }
        }

        if msg.commit_index > self.commit_index {
            self.commit_index = msg.commit_index.min(self.log.last_index());
        }
        self.apply_all()?;

        Ok(AppendEntriesResponse {
            term: self.term,
            success: true,
            current_index: msg.prev_index + count,
            first_index: (count > 0).then_some(msg.prev_index + 1),
        })
    }

    /// Processes a peer's response to our replication, advancing its progress
    /// and the commit index, or backing up towards a log match.
    pub fn receive_append_entries_response(
        &mut self,
        from: NodeID,
        msg: AppendEntriesResponse,
    ) -> Result<()> {
        self.observe_term(msg.term)?;
        if msg.term < self.term || !self.is_leader() {
            debug!("Ignoring append response from {from} at term {}", msg.term);
            return Ok(());
        }

        let last_index = self.log.last_index();
        if msg.success {
            assert!(msg.current_index <= last_index, "follower matched unknown index");
            let Some(node) = self.nodes.get_mut(from) else {
                return Ok(()); // the peer was removed
            };
            if msg.current_index > node.match_index {
                node.match_index = msg.current_index;
                node.next_index = msg.current_index + 1;
            }
            // A caught-up non-voting node becomes eligible for promotion, once.
            let promotable =
                !node.voting && node.match_index >= last_index && !node.has_sufficient_logs;
            if promotable {
                node.has_sufficient_logs = true;
            }
            let more = node.next_index <= last_index;
            if promotable {
                self.host.promotable(from)?;
            }
            self.maybe_commit()?;
            self.apply_all()?;
            // Keep catching the peer up, one batch at a time.
            if more {
                self.send_append(from)?;
            }
        } else {
            let Some(node) = self.nodes.get_mut(from) else {
                return Ok(());
            };
            // Regress next_index towards the follower's hint, never below its
            // match index, and retry immediately.
            let next = if msg.current_index < node.next_index {
                msg.current_index
            } else {
                node.next_index - 1
            };
            node.next_index = next.max(node.match_index + 1).max(1);
            debug!("Backing up to index {} for {from}", node.next_index);
            self.send_append(from)?;
        }
        Ok(())
    }

    /// Applies committed entries to the host state machine, in index order,
    /// handling membership effects. Stops at this server's own removal.
    pub fn apply_all(&mut self) -> Result<()> {
        while self.applied_index < self.commit_index && !self.shutdown {
            let index = self.applied_index + 1;
            let entry = self.log.get(index).expect("committed entry must be retained").clone();
            debug!("Applying {entry:?}");
            self.host.apply(&entry)?;
            self.applied_index = index;
            self.apply_effects(&entry)?;
        }
        Ok(())
    }

    /// Universal term rule: discovering a higher term reverts to follower in
    /// it, clearing the vote. Both are persisted before any dependent message
    /// is sent or acknowledged.
    fn observe_term(&mut self, term: Term) -> Result<()> {
        if term <= self.term {
            return Ok(());
        }
        info!("Discovered new term {term}, reverting to follower");
        self.term = term;
        self.voted_for = None;
        self.host.persist_term(term)?;
        self.host.persist_vote(None)?;
        self.role = Role::Follower { leader: None };
        self.reset_election_timer();
        Ok(())
    }

    /// Records the sender as the leader of the current term, resetting the
    /// election timer. Two leaders in one term is a safety violation.
    fn follow(&mut self, leader: NodeID) {
        match &mut self.role {
            Role::Leader => panic!("saw other leader {leader} in term {}", self.term),
            Role::Candidate => {
                info!("Lost election, following leader {leader} in term {}", self.term);
                self.role = Role::Follower { leader: Some(leader) };
            }
            Role::Follower { leader: current } => match current {
                Some(current) => {
                    assert_eq!(*current, leader, "multiple leaders in term {}", self.term)
                }
                None => {
                    info!("Following leader {leader} in term {}", self.term);
                    *current = Some(leader);
                }
            },
        }
        self.elapsed = 0;
    }

    /// Whether this server may start an election: it must be an active voting
    /// member and not shut down.
    fn can_campaign(&self) -> bool {
        !self.shutdown && self.nodes.get(self.id).is_some_and(|n| n.voting && n.active)
    }

    /// Campaigns for leadership: increments the term, votes for ourself, and
    /// solicits votes from all other voting, active nodes.
    fn campaign(&mut self) -> Result<()> {
        let term = self.term + 1;
        info!("Starting election for term {term}");
        self.term = term;
        self.voted_for = Some(self.id);
        self.host.persist_term(term)?;
        self.host.persist_vote(Some(self.id))?;
        self.role = Role::Candidate;
        self.nodes.reset_votes();
        if let Some(node) = self.nodes.get_mut(self.id) {
            node.has_vote_for_me = true;
        }
        self.reset_election_timer();

        let msg = RequestVote {
            term,
            candidate: self.id,
            last_index: self.log.last_index(),
            last_term: self.log.last_term(),
        };
        for peer in self.nodes.voting_peers(self.id) {
            self.host.send_request_vote(peer, &msg)?;
        }

        // A cluster with a single voter wins immediately.
        self.maybe_become_leader()
    }

    /// Assumes leadership if our votes constitute a strict majority of the
    /// voting members.
    fn maybe_become_leader(&mut self) -> Result<()> {
        if !matches!(self.role, Role::Candidate) {
            return Ok(());
        }
        if self.nodes.votes() < self.nodes.quorum_size() {
            return Ok(());
        }
        info!("Won election for term {}, becoming leader", self.term);
        self.role = Role::Leader;
        self.elapsed = 0;
        let next_index = self.log.last_index() + 1;
        for node in self.nodes.iter_mut() {
            node.next_index = next_index;
            node.match_index = 0;
        }
        // Broadcast immediately to assert leadership. Entries from previous
        // terms are not committed by counting replicas; they commit
        // transitively once an entry from this term does.
        self.broadcast_appends()
    }

    /// Whether a vote request merits our vote, per the Raft rules: the
    /// candidate's term is current, we haven't voted for anyone else in it,
    /// and the candidate's log is at least as up-to-date as ours.
    fn should_grant_vote(&self, msg: &RequestVote) -> bool {
        if msg.term < self.term {
            return false;
        }
        if let Some(voted_for) = self.voted_for {
            if voted_for != msg.candidate {
                return false;
            }
        }
        let (last_index, last_term) = (self.log.last_index(), self.log.last_term());
        msg.last_term > last_term || (msg.last_term == last_term && msg.last_index >= last_index)
    }

    /// Sends pending entries (or an empty heartbeat) to a peer, starting at
    /// its next index.
    fn send_append(&mut self, peer: NodeID) -> Result<()> {
        let next = match self.nodes.get(peer) {
            Some(node) => node.next_index,
            None => return Ok(()),
        };
        let prev_index = next - 1;
        let Some(prev_term) = self.log.term_at(prev_index) else {
            // The peer is behind the compaction boundary and needs a snapshot,
            // which is transferred out of band.
            debug!("Peer {peer} is behind the compacted log, skipping replication");
            return Ok(());
        };
        let entries = self.log.entries_from(next, self.opts.max_append_entries);
        debug!("Replicating {} entries at base {prev_index} to {peer}", entries.len());
        let msg = AppendEntries {
            term: self.term,
            leader: self.id,
            prev_index,
            prev_term,
            commit_index: self.commit_index,
            entries,
        };
        self.host.send_append_entries(peer, &msg)
    }

    /// Replicates to all active peers.
    fn broadcast_appends(&mut self) -> Result<()> {
        for peer in self.nodes.active_peers(self.id) {
            self.send_append(peer)?;
        }
        Ok(())
    }

    /// Commits entries replicated to a quorum of voters. Only entries from
    /// the current term commit by counting replicas (Raft paper figure 8).
    fn maybe_commit(&mut self) -> Result<()> {
        if !self.is_leader() || self.nodes.voting_count() == 0 {
            return Ok(());
        }
        let quorum_index = self.nodes.quorum_match_index(self.id, self.log.last_index());
        if quorum_index <= self.commit_index {
            return Ok(());
        }
        if self.log.term_at(quorum_index) != Some(self.term) {
            return Ok(());
        }
        debug!("Committing to {quorum_index} in term {}", self.term);
        self.commit_index = quorum_index;
        Ok(())
    }

    /// Splits an entry into the parts needed for offer effects, decoding the
    /// membership payload of configuration entries.
    fn dissect(entry: &Entry) -> Result<(Index, EntryKind, Option<ConfigChange>)> {
        let change = match entry.kind {
            EntryKind::Normal => None,
            _ => Some(entry.config_change()?),
        };
        Ok((entry.index, entry.kind, change))
    }

    /// Appends an entry to the log, persisting it via `log_offer`, and
    /// applies its offer-time effects.
    fn offer(&mut self, entry: Entry) -> Result<()> {
        let (index, kind, change) = Self::dissect(&entry)?;
        self.log.append(self.host.as_mut(), entry)?;
        self.offer_effects(index, kind, change)
    }

    /// Offer-time entry effects: non-voting nodes join the table as soon as
    /// the entry enters the log, so the leader can replicate to them at once,
    /// and a voting change marks itself as in flight.
    fn offer_effects(
        &mut self,
        index: Index,
        kind: EntryKind,
        change: Option<ConfigChange>,
    ) -> Result<()> {
        if kind == EntryKind::AddNonvotingNode {
            let change = change.expect("config entry without change");
            if !self.nodes.contains(change.node) {
                info!("Adding non-voting node {}", change.node);
                let mut node = Node::new(change.node, false);
                node.next_index = self.log.last_index() + 1;
                self.nodes.insert(node);
                self.host.membership_event(
                    change.node,
                    MembershipEvent::AddedNonvoting,
                    &change.info,
                );
            }
        } else if kind.is_voting_change() {
            self.voting_change_at = Some(index);
        }
        Ok(())
    }

    /// Reverses the offer-time effects of a truncated entry.
    fn revert_offer(&mut self, entry: &Entry) -> Result<()> {
        match entry.kind {
            EntryKind::Normal => {}
            EntryKind::AddNonvotingNode => {
                let change = entry.config_change()?;
                if change.node != self.id && self.nodes.get(change.node).is_some_and(|n| !n.voting)
                {
                    info!("Reverting addition of non-voting node {}", change.node);
                    self.nodes.remove(change.node);
                    self.host.membership_event(
                        change.node,
                        MembershipEvent::Removed,
                        &change.info,
                    );
                }
            }
            _ => {
                if self.voting_change_at == Some(entry.index) {
                    self.voting_change_at = None;
                }
            }
        }
        Ok(())
    }

    /// Apply-time entry effects: voting-configuration changes only take
    /// effect here, so a truncated change never alters the voters.
    fn apply_effects(&mut self, entry: &Entry) -> Result<()> {
        if self.voting_change_at == Some(entry.index) {
            self.voting_change_at = None;
        }
        let change = match entry.kind {
            // Normal entries and non-voting adds (effective at offer time)
            // have no further effect here.
            EntryKind::Normal | EntryKind::AddNonvotingNode => return Ok(()),
            _ => entry.config_change()?,
        };
        match entry.kind {
            EntryKind::AddNode => {
                if !self.nodes.contains(change.node) {
                    self.nodes.insert(Node::new(change.node, false));
                }
                let node = self.nodes.get_mut(change.node).expect("node was just inserted");
                if !node.voting {
                    info!("Node {} is now a voting member", change.node);
                    node.voting = true;
                    self.host.membership_event(
                        change.node,
                        MembershipEvent::Promoted,
                        &change.info,
                    );
                }
            }
            EntryKind::DemoteNode => {
                if let Some(node) = self.nodes.get_mut(change.node) {
                    if node.voting {
                        info!("Node {} demoted to non-voting", change.node);
                        node.voting = false;
                        self.host.membership_event(
                            change.node,
                            MembershipEvent::Demoted,
                            &change.info,
                        );
                    }
                }
            }
            EntryKind::RemoveNode => {
                if self.nodes.remove(change.node).is_some() {
                    info!("Node {} removed from the cluster", change.node);
                    self.host.membership_event(
                        change.node,
                        MembershipEvent::Removed,
                        &change.info,
                    );
                }
                if change.node == self.id {
                    info!("This server was removed from the cluster, shutting down");
                    self.shutdown = true;
                    if self.is_leader() {
                        self.role = Role::Follower { leader: None };
                    }
                }
            }
            EntryKind::Normal | EntryKind::AddNonvotingNode => unreachable!("handled above"),
        }
        Ok(())
    }

    /// Returns the first index of the contiguous run of `term` ending at
    /// `from`, for the conflict fast-backup hint.
    fn first_index_of_term(&self, from: Index, term: Term) -> Index {
        let mut index = from;
        while index > self.log.base_index() && self.log.term_at(index - 1) == Some(term) {
            index -= 1;
        }
        index
    }

    /// Restarts the election timer with a fresh randomized timeout.
    fn reset_election_timer(&mut self) {
        self.elapsed = 0;
        self.election_timeout = sample_election_timeout(&self.opts);
    }
}

/// Samples a randomized election timeout from [timeout, 2 * timeout), to
/// break symmetry between simultaneous candidates.
fn sample_election_timeout(opts: &Options) -> u64 {
    rand::thread_rng().gen_range(opts.election_timeout..2 * opts.election_timeout)
}
