//! Error types for the quotesync engine.

use thiserror::Error;

/// All possible errors from the quotesync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Storage errors
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("malformed persisted data: {0}")]
    MalformedPersistedData(String),

    // Input errors
    #[error("malformed import: {0}")]
    MalformedImport(String),

    #[error("field must not be empty: {0}")]
    EmptyField(&'static str),

    #[error("encoding failed: {0}")]
    Encoding(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
