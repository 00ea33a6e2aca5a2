//! Error types for credential persistence

/// Errors from writing the credential file.
///
/// Reads never fail: unreadable or corrupted data is reported as an absent
/// credential.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
