use super::{encoding, Host, NodeID, Result, Term};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A log index. Starts at 1, indicates no index if 0.
pub type Index = u64;

/// A replicated log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The entry index.
    pub index: Index,
    /// The term in which the entry was proposed.
    pub term: Term,
    /// An opaque tag chosen by the submitter, for client-side matching and
    /// deduplication. It has no consensus meaning.
    pub id: u32,
    /// The entry kind.
    pub kind: EntryKind,
    /// The entry payload. A state machine command for normal entries, an
    /// encoded [`ConfigChange`] for membership entries.
    pub payload: Vec<u8>,
}

impl Entry {
    /// Decodes the membership change carried by a configuration entry.
    pub fn config_change(&self) -> Result<ConfigChange> {
        assert!(self.kind != EntryKind::Normal, "normal entry has no config change");
        encoding::deserialize(&self.payload)
    }
}

/// A log entry kind. Membership entries flow through the normal replication
/// path, and take effect on the node table when offered or applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A state machine command.
    Normal,
    /// Adds a non-voting node. Takes effect when the entry enters the log, so
    /// the leader can begin replicating to the node immediately; reversed if
    /// the entry is truncated away.
    AddNonvotingNode,
    /// Promotes a node to voting. Takes effect on application.
    AddNode,
    /// Demotes a node to non-voting. Takes effect on application.
    DemoteNode,
    /// Removes a node. Takes effect on application.
    RemoveNode,
}

impl EntryKind {
    /// Whether this kind changes the voting configuration. At most one such
    /// entry may be uncommitted at any time.
    pub fn is_voting_change(self) -> bool {
        matches!(self, EntryKind::AddNode | EntryKind::DemoteNode | EntryKind::RemoveNode)
    }
}

/// The payload of a membership entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    /// The node being added, promoted, demoted, or removed.
    pub node: NodeID,
    /// Opaque host data for the node, e.g. its network address. The engine
    /// stores and forwards it but never interprets it.
    pub info: Vec<u8>,
}

impl ConfigChange {
    /// Encodes the change into an entry payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encoding::serialize(self)
    }
}

/// The replicated log: an ordered sequence of entries with contiguous indexes
/// and non-decreasing terms. It is bounded on the left by `base_index`, which
/// starts at 1 and only advances when the front of the log is compacted away.
///
/// The log itself is in memory. Durability is the host's: every mutation
/// synchronously invokes the corresponding [`Host`] callback (`log_offer` on
/// append, `log_pop` on truncation, `log_poll` on compaction), which must
/// persist the change before returning. A callback failure propagates to the
/// caller with the in-memory mutation already made; the host treats this as
/// fatal and recovers from durable state.
///
/// Invariants:
///
/// * Entry indexes are contiguous from `base_index` (no gaps).
/// * Entry terms never decrease from the previous entry.
/// * Entries at or below the commit index are never truncated (enforced by
///   the server, which owns the commit index).
pub struct Log {
    /// The retained entries. `entries[0]`, if any, has index `base_index`.
    entries: VecDeque<Entry>,
    /// The first retained index. Entries below it have been compacted away.
    base_index: Index,
    /// The term of the entry at `base_index - 1`, i.e. the compaction
    /// boundary, or 0 if the log has never been compacted.
    base_term: Term,
}

impl Log {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self { entries: VecDeque::new(), base_index: 1, base_term: 0 }
    }

    /// Returns the first retained index.
    pub fn base_index(&self) -> Index {
        self.base_index
    }

    /// Returns the last index, or `base_index - 1` if the log is empty.
    pub fn last_index(&self) -> Index {
        self.base_index - 1 + self.entries.len() as Index
    }

    /// Returns the term of the last entry, or the compaction boundary term if
    /// the log is empty.
    pub fn last_term(&self) -> Term {
        self.entries.back().map(|e| e.term).unwrap_or(self.base_term)
    }

    /// Fetches the entry at an index, if retained.
    pub fn get(&self, index: Index) -> Option<&Entry> {
        if index < self.base_index {
            return None;
        }
        self.entries.get((index - self.base_index) as usize)
    }

    /// Returns the term of the entry at an index. Index 0 and the compaction
    /// boundary have known terms even though they hold no entry; indexes
    /// beyond the last entry or compacted below the boundary have none.
    pub fn term_at(&self, index: Index) -> Option<Term> {
        if index == 0 {
            return Some(0);
        }
        if index == self.base_index - 1 {
            return Some(self.base_term);
        }
        self.get(index).map(|e| e.term)
    }

    /// Checks if the log contains an entry with the given index and term.
    pub fn has(&self, index: Index, term: Term) -> bool {
        self.term_at(index) == Some(term)
    }

    /// Returns up to `max` entries starting at `from`, cloned for transport.
    pub fn entries_from(&self, from: Index, max: usize) -> Vec<Entry> {
        if from < self.base_index || from > self.last_index() {
            return Vec::new();
        }
        let skip = (from - self.base_index) as usize;
        self.entries.iter().skip(skip).take(max).cloned().collect()
    }

    /// Appends an entry and offers it to the host for persistence. The entry
    /// must directly follow the last index without regressing the term.
    pub fn append(&mut self, host: &mut dyn Host, entry: Entry) -> Result<Index> {
        assert_eq!(entry.index, self.last_index() + 1, "appended entry has index gap");
        assert!(entry.term >= self.last_term(), "appended entry regresses term");
        assert!(entry.term > 0, "appended entry has term 0");
        self.entries.push_back(entry);
        host.log_offer(self.entries.back().expect("entry was just appended"))?;
        Ok(self.last_index())
    }

    /// Appends a replayed entry during startup recovery, without involving
    /// the host: the entry is already durable.
    pub fn append_restored(&mut self, entry: Entry) {
        assert_eq!(entry.index, self.last_index() + 1, "restored entry has index gap");
        assert!(entry.term >= self.last_term(), "restored entry regresses term");
        self.entries.push_back(entry);
    }

    /// Drops the suffix of the log starting at `from`, notifying the host of
    /// each dropped entry from the tail backwards so it can unpersist them in
    /// reverse append order. Returns the dropped entries in that order.
    pub fn truncate_from(&mut self, host: &mut dyn Host, from: Index) -> Result<Vec<Entry>> {
        assert!(from >= self.base_index, "can't truncate compacted entries");
        let mut dropped = Vec::new();
        while self.last_index() >= from {
            let entry = self.entries.pop_back().expect("suffix entry must exist");
            host.log_pop(&entry)?;
            dropped.push(entry);
        }
        Ok(dropped)
    }

    /// Removes and returns the oldest retained entry, notifying the host.
    /// Used by compaction; the caller must only compact applied entries.
    pub fn pop_front(&mut self, host: &mut dyn Host) -> Result<Option<Entry>> {
        let Some(entry) = self.entries.pop_front() else {
            return Ok(None);
        };
        self.base_index += 1;
        self.base_term = entry.term;
        host.log_poll(&entry)?;
        Ok(Some(entry))
    }

    /// Positions an empty log after a compaction boundary, before replaying
    /// retained entries on startup.
    pub fn reset_base(&mut self, base_index: Index, base_term: Term) {
        assert!(self.entries.is_empty(), "can't reset base of non-empty log");
        assert!(base_index > 0, "base index must be at least 1");
        self.base_index = base_index;
        self.base_term = base_term;
    }
}

impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}
