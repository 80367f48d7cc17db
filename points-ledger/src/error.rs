//! Error types for the points ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Reward account not found
    #[error("Reward account not found for user {0}")]
    AccountNotFound(u64),

    /// Report not found
    #[error("Report not found: {0}")]
    ReportNotFound(u64),

    /// Catalog entry not found
    #[error("Catalog entry not found: {0}")]
    CatalogEntryNotFound(u64),

    /// Notification not found
    #[error("Notification not found: {0}")]
    NotificationNotFound(u64),

    /// Email already registered
    #[error("Email already registered: {0}")]
    EmailTaken(String),

    /// Not enough points for a redemption or report submission
    #[error("Insufficient points: required {required}, available {available}")]
    InsufficientPoints {
        /// Points the operation needs
        required: i64,
        /// Points the account holds
        available: i64,
    },

    /// Invalid point amount (zero or negative)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Invalid transaction kind for the operation
    #[error("Invalid transaction kind: {0}")]
    InvalidKind(String),

    /// Invalid report status transition
    #[error("Invalid report transition: {0}")]
    InvalidTransition(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
