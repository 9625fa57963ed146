//! Bootstrap: a stake-weighted majority poll over accepted blocks
//!
//! Starting from an initial frontier of candidate block ids, every peer is
//! asked which of them it considers accepted; the ids vouched for by more than
//! half of the total stake form the starting set for fetch-and-apply.

mod majority;

pub use majority::{Bootstrapper, MajorityPoll};

use crate::zfx_id::NodeId;

#[derive(Debug)]
pub enum Error {
    /// The poll result was requested before every peer answered or timed out
    PollUnfinished,
    /// An opinion arrived from a peer that was never polled
    UnknownPeer(NodeId),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
