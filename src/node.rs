use super::Index;

use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node ID.
pub type NodeID = u32;

/// A leader term.
pub type Term = u64;

/// A membership change applied to the node table, reported to the host via
/// [`Host::membership_event`](crate::Host::membership_event).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    /// The node was added as a non-voting member.
    AddedNonvoting,
    /// The node became a voting member.
    Promoted,
    /// The node was demoted to non-voting.
    Demoted,
    /// The node was removed from the cluster.
    Removed,
}

/// A cluster member, with its replication progress as tracked by the leader.
/// Progress fields are only meaningful while the local server leads.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// The node ID.
    pub id: NodeID,
    /// Whether the node counts towards quorum.
    pub voting: bool,
    /// Whether the node receives traffic. Inactive nodes are skipped by
    /// elections and replication but retained in the table.
    pub active: bool,
    /// The next index to replicate to the node.
    pub next_index: Index,
    /// The last index known to match the leader's log.
    pub match_index: Index,
    /// Latched once the node's log has caught up with the leader's, making a
    /// non-voting node eligible for promotion. Reported at most once.
    pub has_sufficient_logs: bool,
    /// Whether the node granted its vote in the current election.
    pub has_vote_for_me: bool,
}

impl Node {
    /// Creates a new node record.
    pub fn new(id: NodeID, voting: bool) -> Self {
        Self {
            id,
            voting,
            active: true,
            next_index: 1,
            match_index: 0,
            has_sufficient_logs: false,
            has_vote_for_me: false,
        }
    }
}

/// The node table: all known cluster members, including the local server.
/// Quorum math uses voting, active nodes only.
pub struct Nodes {
    nodes: HashMap<NodeID, Node>,
}

impl Nodes {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self { nodes: HashMap::new() }
    }

    /// Fetches a node.
    pub fn get(&self, id: NodeID) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Fetches a node for mutation.
    pub fn get_mut(&mut self, id: NodeID) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Inserts a node, replacing any existing record with the same ID.
    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    /// Removes a node, returning its record if it existed.
    pub fn remove(&mut self, id: NodeID) -> Option<Node> {
        self.nodes.remove(&id)
    }

    /// Whether the table contains a node.
    pub fn contains(&self, id: NodeID) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Iterates over all nodes in ID order, for deterministic send order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().sorted_by_key(|n| n.id)
    }

    /// Iterates mutably over all nodes, in arbitrary order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Returns the IDs of all active peers of `this`, in ID order.
    pub fn active_peers(&self, this: NodeID) -> Vec<NodeID> {
        self.iter().filter(|n| n.id != this && n.active).map(|n| n.id).collect()
    }

    /// Returns the IDs of all voting, active peers of `this`, in ID order.
    pub fn voting_peers(&self, this: NodeID) -> Vec<NodeID> {
        self.iter().filter(|n| n.id != this && n.voting && n.active).map(|n| n.id).collect()
    }

    /// Returns the number of voting, active nodes.
    pub fn voting_count(&self) -> usize {
        self.nodes.values().filter(|n| n.voting && n.active).count()
    }

    /// Returns the quorum size (strict majority of voters).
    pub fn quorum_size(&self) -> usize {
        quorum_size(self.voting_count())
    }

    /// Counts election votes among voters, including the local server's own.
    pub fn votes(&self) -> usize {
        self.nodes.values().filter(|n| n.voting && n.active && n.has_vote_for_me).count()
    }

    /// Clears all recorded votes, at the start of a new election.
    pub fn reset_votes(&mut self) {
        for node in self.nodes.values_mut() {
            node.has_vote_for_me = false;
        }
    }

    /// Returns the highest index replicated to a quorum of voters, taking
    /// `last_index` as the local server's own match index.
    pub fn quorum_match_index(&self, this: NodeID, last_index: Index) -> Index {
        let matches = self
            .nodes
            .values()
            .filter(|n| n.voting && n.active)
            .map(|n| if n.id == this { last_index } else { n.match_index })
            .collect();
        quorum_value(matches)
    }
}

impl Default for Nodes {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the size of a quorum (strict majority), given a total size.
fn quorum_size(size: usize) -> usize {
    size / 2 + 1
}

/// Returns the quorum (median) value of the given unsorted vector, in
/// descending order. The vector cannot be empty.
fn quorum_value<T: Ord + Copy>(mut values: Vec<T>) -> T {
    assert!(!values.is_empty(), "no values provided");
    let index = quorum_size(values.len()) - 1;
    *values.select_nth_unstable_by(index, |a, b: &T| a.cmp(b).reverse()).1
}
