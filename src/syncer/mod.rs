//! State sync: selecting a trusted state summary before bootstrapping
//!
//! The syncer samples beacons for their state-summary frontiers, puts the
//! candidate summaries to a vote of the full beacon set, and hands the summary
//! that gathered enough stake to the VM. Insufficient quorum restarts the
//! attempt when retries are configured, otherwise the node falls through to
//! bootstrapping from genesis.

mod state_syncer;

pub use state_syncer::{Phase, StateSyncer, Step, WeightedSummary};

use crate::sampler;
use crate::vm;

#[derive(Debug)]
pub enum Error {
    Vm(vm::Error),
    Sampler(sampler::Error),
}

impl std::error::Error for Error {}

impl std::convert::From<vm::Error> for Error {
    fn from(error: vm::Error) -> Self {
        Error::Vm(error)
    }
}

impl std::convert::From<sampler::Error> for Error {
    fn from(error: sampler::Error) -> Self {
        Error::Sampler(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
