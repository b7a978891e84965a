//! Error types for the banking ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Entity id or number does not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller does not own the touched entity
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed value (non-positive amount, unknown enum, self-transfer)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity is not in the status the operation requires
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Balance is lower than the requested debit
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Card spend would exceed the spending limit
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Duplicate active entity, double-close, etc.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation on a card past its expiry date
    #[error("Expired: {0}")]
    Expired(String),

    /// Unique reference generation gave up after the configured attempts
    #[error("Reference generation exhausted after {0} attempts")]
    ReferenceExhausted(u32),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a domain rejection (the operation was refused
    /// by validation) as opposed to an internal failure
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::Forbidden(_)
                | Error::InvalidInput(_)
                | Error::InvalidState(_)
                | Error::InsufficientFunds(_)
                | Error::LimitExceeded(_)
                | Error::Conflict(_)
                | Error::Expired(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
