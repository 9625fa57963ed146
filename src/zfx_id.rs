//! Content-addressed identifiers for consensus objects and peers

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use base58check::{FromBase58Check, ToBase58Check};
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use rand::{self, Rng};

const ID_LEN: usize = 32;
const NODE_ID_LEN: usize = 20;

/// Identifies vertices, transactions, blocks and state summaries.
///
/// An `Id` is the 256-bit blake2b digest of the object it names. Comparing two
/// ids compares their bytes, and the derived `Ord` gives the byte-lexicographic
/// total order the engines rely on for deterministic tie-breaking. Rendering
/// uses Base58check.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Serialize, Deserialize, Default)]
pub struct Id([u8; ID_LEN]);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Id {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, crate::Error> {
        match s.from_base58check() {
            Ok((0, bytes)) => {
                let bytes =
                    <[u8; ID_LEN]>::try_from(bytes.as_slice()).map_err(|_| crate::Error::TryFromStringError)?;
                Ok(Id(bytes))
            }
            _ => Err(crate::Error::TryFromStringError),
        }
    }
}

impl Id {
    /// Names an object by hashing its encoding.
    pub fn new(bytes: &[u8]) -> Id {
        Id(digest(bytes))
    }

    /// Wraps an existing digest. Shorter input is zero-padded on the right,
    /// longer input is truncated.
    pub fn from_hash(bytes: &[u8]) -> Id {
        let mut id = [0u8; ID_LEN];
        let n = std::cmp::min(bytes.len(), ID_LEN);
        id[..n].copy_from_slice(&bytes[..n]);
        Id(id)
    }

    /// A fresh random `Id`.
    pub fn generate() -> Id {
        Id(rand::thread_rng().gen())
    }

    /// An `Id` with every byte set to `b` (for testing).
    pub fn filled(b: u8) -> Id {
        Id([b; ID_LEN])
    }

    /// The minimum `Id` (for testing).
    pub fn zero() -> Id {
        Id::filled(0)
    }

    /// The maximum `Id` (for testing).
    pub fn max() -> Id {
        Id::filled(0xff)
    }

    /// All-ones `Id` (for testing).
    pub fn one() -> Id {
        Id::filled(1)
    }

    /// All-twos `Id` (for testing).
    pub fn two() -> Id {
        Id::filled(2)
    }

    /// The digest as an owned array.
    pub fn bytes(&self) -> [u8; ID_LEN] {
        self.0
    }

    /// The digest as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Identifies a network peer.
///
/// A `NodeId` is the 20-byte digest a peer derives from its staking
/// certificate. It is deliberately distinct from [Id] so that vertex and peer
/// identifiers cannot be confused for one another.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Serialize, Deserialize, Default)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl NodeId {
    /// Derives a peer identity from its certificate bytes: the 256-bit digest
    /// truncated to 20 bytes.
    pub fn new(bytes: &[u8]) -> NodeId {
        let full = digest(bytes);
        let mut id = [0u8; NODE_ID_LEN];
        id.copy_from_slice(&full[..NODE_ID_LEN]);
        NodeId(id)
    }

    /// Wraps an already-derived identity.
    pub fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> NodeId {
        NodeId(bytes)
    }

    /// A fresh random `NodeId`.
    pub fn generate() -> NodeId {
        let mut id = [0u8; NODE_ID_LEN];
        rand::thread_rng().fill(&mut id[..]);
        NodeId(id)
    }

    /// A `NodeId` with every byte set to `b` (for testing).
    pub fn filled(b: u8) -> NodeId {
        NodeId([b; NODE_ID_LEN])
    }

    /// The minimum `NodeId` (for testing).
    pub fn zero() -> NodeId {
        NodeId::filled(0)
    }

    /// The identity as an owned array.
    pub fn bytes(&self) -> [u8; NODE_ID_LEN] {
        self.0
    }

    /// The identity as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn digest(input: &[u8]) -> [u8; ID_LEN] {
    let mut out = [0u8; ID_LEN];
    let mut hasher = Blake2bVar::new(ID_LEN).expect("digest width is fixed");
    hasher.update(input);
    hasher.finalize_variable(&mut out).expect("digest width is fixed");
    out
}
