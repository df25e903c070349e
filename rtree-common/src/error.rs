use thiserror::Error;

/// The error taxonomy for the whole spatial index (spec §7).
///
/// The index never retries; every fallible entry point returns one of these
/// kinds along with a human-readable message. `Internal` denotes an
/// invariant violation and should never escape in normal operation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("empty: {0}")]
    Empty(String),

    #[error("range lies outside the domain: {0}")]
    OutOfDomain(String),

    #[error("buffer too small: {0}")]
    BufferTooSmall(String),

    #[error("I/O error while fetching a tile: {0}")]
    IoError(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn out_of_domain(msg: impl Into<String>) -> Self {
        Self::OutOfDomain(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
