//! Outbound consensus messages and their wire framing
//!
//! Every message the engines send is built here: a typed payload is tagged with
//! its opcode, optionally zstd-compressed, and framed behind a 4-byte big-endian
//! length prefix whose top bit is reserved for a future framing variant.

mod builder;
mod framing;

pub use builder::{Builder, OutboundMessage, Payload};
pub use framing::{frame, unframe, FLAG_COMPRESSED, LENGTH_VARIANT_BIT};

/// Node version advertised during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Version {
    pub fn current() -> Version {
        Version { major: 0, minor: 1, patch: 0 }
    }

    /// Peers are compatible while they share a major version.
    pub fn compatible(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

/// The closed set of wire opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Version,
    PeerList,
    Ping,
    Pong,
    GetStateSummaryFrontier,
    StateSummaryFrontier,
    GetAcceptedStateSummary,
    AcceptedStateSummary,
    GetAcceptedFrontier,
    AcceptedFrontier,
    GetAccepted,
    Accepted,
    GetAncestors,
    Ancestors,
    Get,
    Put,
    PushQuery,
    PullQuery,
    Chits,
    AppRequest,
    AppResponse,
    AppGossip,
}

impl Op {
    pub fn byte(&self) -> u8 {
        match self {
            Op::Version => 0,
            Op::PeerList => 1,
            Op::Ping => 2,
            Op::Pong => 3,
            Op::GetStateSummaryFrontier => 4,
            Op::StateSummaryFrontier => 5,
            Op::GetAcceptedStateSummary => 6,
            Op::AcceptedStateSummary => 7,
            Op::GetAcceptedFrontier => 8,
            Op::AcceptedFrontier => 9,
            Op::GetAccepted => 10,
            Op::Accepted => 11,
            Op::GetAncestors => 12,
            Op::Ancestors => 13,
            Op::Get => 14,
            Op::Put => 15,
            Op::PushQuery => 16,
            Op::PullQuery => 17,
            Op::Chits => 18,
            Op::AppRequest => 19,
            Op::AppResponse => 20,
            Op::AppGossip => 21,
        }
    }

    pub fn from_byte(b: u8) -> Result<Op> {
        let op = match b {
            0 => Op::Version,
            1 => Op::PeerList,
            2 => Op::Ping,
            3 => Op::Pong,
            4 => Op::GetStateSummaryFrontier,
            5 => Op::StateSummaryFrontier,
            6 => Op::GetAcceptedStateSummary,
            7 => Op::AcceptedStateSummary,
            8 => Op::GetAcceptedFrontier,
            9 => Op::AcceptedFrontier,
            10 => Op::GetAccepted,
            11 => Op::Accepted,
            12 => Op::GetAncestors,
            13 => Op::Ancestors,
            14 => Op::Get,
            15 => Op::Put,
            16 => Op::PushQuery,
            17 => Op::PullQuery,
            18 => Op::Chits,
            19 => Op::AppRequest,
            20 => Op::AppResponse,
            21 => Op::AppGossip,
            _ => return Err(Error::UnknownOpcode(b)),
        };
        Ok(op)
    }

    /// Whether this opcode may be compressed when compression is negotiated.
    /// Only the payload-bearing messages are worth the cycles.
    pub fn compressible(&self) -> bool {
        match self {
            Op::PeerList
            | Op::StateSummaryFrontier
            | Op::Ancestors
            | Op::Put
            | Op::PushQuery
            | Op::AppRequest
            | Op::AppResponse
            | Op::AppGossip => true,
            _ => false,
        }
    }

    /// Handshake and liveness traffic skips the outbound throttler.
    pub fn bypass_throttling(&self) -> bool {
        match self {
            Op::Version | Op::PeerList | Op::Ping | Op::Pong => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Bincode(bincode::Error),
    Compression(std::io::Error),
    UnknownOpcode(u8),
    /// The length prefix announced an unsupported framing variant
    UnsupportedFrameVariant,
    /// The framed message would exceed the configured maximum size
    MessageTooLarge(usize, usize),
    /// The frame is shorter than its header
    TruncatedFrame,
}

impl std::error::Error for Error {}

impl std::convert::From<bincode::Error> for Error {
    fn from(error: bincode::Error) -> Self {
        Error::Bincode(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
