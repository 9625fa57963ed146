//! Durable storage for accepted vertices

mod vertex_store;

pub use vertex_store::SledVertexStore;

#[derive(Debug)]
pub enum Error {
    Sled(sled::Error),
    Bincode(bincode::Error),
    /// No vertex has been accepted yet
    EmptyStore,
}

impl std::error::Error for Error {}

impl std::convert::From<sled::Error> for Error {
    fn from(error: sled::Error) -> Self {
        Error::Sled(error)
    }
}

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
