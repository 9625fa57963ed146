//! Snowstorm resolves conflicts between transactions using the Snowball
//! confidence protocol over conflict sets.
//!
//! Every transaction declares the set of transaction ids it cannot co-accept
//! with. The graph tracks per-transaction confidence across polls and ensures
//! that for any conflict set at most one member ever becomes accepted.

mod conflict_graph;
pub mod tx;

pub use conflict_graph::{ConflictGraph, PollOutcome};
pub use tx::{Status, Tx};

use crate::zfx_id::Id;

#[derive(Debug)]
pub enum Error {
    /// A transaction was expected in the graph but is not there
    UnknownTx(Id),
    /// `remove` was called on a transaction that has already been decided
    RemoveDecided(Id),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
