//! Weighted sampling of validators without replacement

mod weighted;

pub use weighted::WeightedSampler;

#[derive(Debug)]
pub enum Error {
    /// The accumulated weights are inconsistent with the drawn value. Callers
    /// should treat this as a retriable sampling fault, not a consensus fault.
    InconsistentWeights,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
