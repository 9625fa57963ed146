//! # Blizzard
//!
//! Blizzard is the consensus core of a proof-of-stake node built around the `Snow*`
//! family of algorithms. Given a stream of inbound votes from validator peers it
//! decides which vertices of a transaction DAG the local node considers accepted,
//! and drives the node from a cold start (state sync, then bootstrap) into normal
//! operation.
//!
//! ## Snowstorm
//!
//! Snowstorm resolves conflicts between transactions: for every conflict set at
//! most one member ever becomes accepted.
//!
//! ## Avalanche
//!
//! Avalanche maintains the vertex DAG on top of snowstorm, records polls and
//! propagates votes upward through the DAG, and finalises vertices when their
//! confidence thresholds are met.
//!
//! ## Syncer
//!
//! The state syncer samples beacons for state-summary frontiers, puts the
//! candidate summaries to a stake-weighted vote and hands the winner to the VM
//! before bootstrapping begins.
//!
//! ## Bootstrap
//!
//! The bootstrap majority poll asks every peer for its accepted set and keeps
//! the blocks that more than half of the total stake vouches for.

#[macro_use]
extern crate serde_derive;
extern crate actix_derive;
extern crate colored;

pub mod zfx_id;

pub mod collections;
pub mod params;
pub mod settings;

pub mod sampler;

pub mod message;
pub mod tracker;

pub mod snowstorm;

pub mod avalanche;

pub mod bootstrap;
pub mod syncer;

pub mod engine;
pub mod sender;
pub mod storage;
pub mod vm;

mod integration_test;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Actix(actix::MailboxError),

    Sampler(sampler::Error),
    Message(message::Error),
    Snowstorm(snowstorm::Error),
    Avalanche(avalanche::Error),
    Bootstrap(bootstrap::Error),
    Syncer(syncer::Error),
    Storage(storage::Error),
    Vm(vm::Error),

    /// Error caused by converting from a `String` to an `Id`
    TryFromStringError,
    /// The consensus parameters failed validation
    InvalidParameters(String),
    /// An engine health bound was exceeded
    HealthCheckFailed(String),
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<actix::MailboxError> for Error {
    fn from(error: actix::MailboxError) -> Self {
        Error::Actix(error)
    }
}

impl std::convert::From<sampler::Error> for Error {
    fn from(error: sampler::Error) -> Self {
        Error::Sampler(error)
    }
}

impl std::convert::From<message::Error> for Error {
    fn from(error: message::Error) -> Self {
        Error::Message(error)
    }
}

impl std::convert::From<snowstorm::Error> for Error {
    fn from(error: snowstorm::Error) -> Self {
        Error::Snowstorm(error)
    }
}

impl std::convert::From<avalanche::Error> for Error {
    fn from(error: avalanche::Error) -> Self {
        Error::Avalanche(error)
    }
}

impl std::convert::From<bootstrap::Error> for Error {
    fn from(error: bootstrap::Error) -> Self {
        Error::Bootstrap(error)
    }
}

impl std::convert::From<syncer::Error> for Error {
    fn from(error: syncer::Error) -> Self {
        Error::Syncer(error)
    }
}

impl std::convert::From<storage::Error> for Error {
    fn from(error: storage::Error) -> Self {
        Error::Storage(error)
    }
}

impl std::convert::From<vm::Error> for Error {
    fn from(error: vm::Error) -> Self {
        Error::Vm(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
