//! Transactions as snowstorm sees them

use crate::zfx_id::Id;

use std::collections::HashSet;

/// Decision state of a transaction or vertex.
///
/// The transitions are monotone: `Processing` moves to exactly one of
/// `Accepted` or `Rejected` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Processing,
    Accepted,
    Rejected,
}

impl Status {
    pub fn decided(&self) -> bool {
        match self {
            Status::Processing => false,
            Status::Accepted | Status::Rejected => true,
        }
    }
}

/// A transaction together with its declared conflict set.
///
/// `conflicts` holds the ids of the other transactions that may not co-accept
/// with this one; a transaction whose conflict set contains only itself (an
/// empty `conflicts` here) is virtuous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    pub id: Id,
    pub bytes: Vec<u8>,
    pub conflicts: HashSet<Id>,
}

impl Tx {
    pub fn new(id: Id, bytes: Vec<u8>, conflicts: HashSet<Id>) -> Self {
        Tx { id, bytes, conflicts }
    }

    /// A transaction with an empty conflict set.
    pub fn virtuous(id: Id, bytes: Vec<u8>) -> Self {
        Tx { id, bytes, conflicts: HashSet::new() }
    }

    /// A transaction conflicting with the given ids.
    pub fn conflicting(id: Id, bytes: Vec<u8>, conflicts: Vec<Id>) -> Self {
        Tx { id, bytes, conflicts: conflicts.into_iter().collect() }
    }
}

impl std::fmt::Display for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "tx {} ({} conflicts)", self.id, self.conflicts.len())
    }
}
