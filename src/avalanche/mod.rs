//! Avalanche reaches consensus on a DAG of vertices, each wrapping a batch of
//! transactions, by integrating snowstorm's transaction-level conflict
//! resolution with vertex-level preference.
//!
//! [Topological] holds the DAG state and the poll machinery; [Avalanche] is the
//! actor shell that translates wire events into engine calls; the
//! [issuer](issuer) gates vertices whose dependencies have not arrived yet.

pub mod avalanche;
pub mod issuer;
mod topological;
mod vertex;

pub use avalanche::Avalanche;
pub use topological::{Metrics, Topological, NPARENTS};
pub use vertex::Vertex;

use crate::snowstorm;
use crate::vm;
use crate::zfx_id::Id;

#[derive(Debug)]
pub enum Error {
    /// A parent of the admitted vertex is not known to the engine
    UnknownParent(Id),
    /// A parent of the admitted vertex has been rejected
    RejectedParent(Id),
    /// A vertex was expected in the engine but is not there
    UnknownVertex(Id),
    Snowstorm(snowstorm::Error),
    Vm(vm::Error),
}

impl std::error::Error for Error {}

impl std::convert::From<snowstorm::Error> for Error {
    fn from(error: snowstorm::Error) -> Self {
        Error::Snowstorm(error)
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
