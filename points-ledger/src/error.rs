//! Error types for the points ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// The first failing condition is surfaced and processing stops; no partial
/// mutation is ever observable behind an error. `Storage` may be transient
/// from the caller's point of view, everything else is permanent for the
/// given input.
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced stream or user does not exist (or user is inactive)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Out-of-range or missing required field
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Donation exceeds the donor's points
    #[error("Insufficient balance: have {points}, need {amount}")]
    InsufficientBalance {
        /// Donor's current points
        points: i64,
        /// Requested donation amount
        amount: i64,
    },

    /// Request timestamp outside the freshness window
    #[error("Stale request: {0}")]
    StaleRequest(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
