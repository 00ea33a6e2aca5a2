//! Error taxonomy for the request pipeline

/// Errors surfaced by the pipeline and the refresh coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No stored credential, the refresh that should have produced one
    /// failed, or the replay was rejected again. Raised by the pipeline for a
    /// final 401 when the caller asked for `throw_error`.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The refresh endpoint rejected the refresh token or could not be reached.
    /// Callers see this as a 401 result; internally it is what clears the store.
    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),

    /// Non-authorization failure reported by the transport or the upstream,
    /// raised by the pipeline when the caller asked for `throw_error`.
    #[error("request failed ({code}): {message}")]
    Transport { code: u16, message: String },

    /// The descriptor cannot be turned into a request (unresolved placeholder,
    /// invalid header). Raised before anything is dispatched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A failure-shaped `ApiResponse` converted with `into_result`.
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },
}

impl Error {
    /// Status-like code for the error.
    pub fn code(&self) -> u16 {
        match self {
            Error::Unauthorized(_) | Error::RefreshFailed(_) => 401,
            Error::Transport { code, .. } | Error::Api { code, .. } => *code,
            Error::Configuration(_) => 400,
        }
    }

    /// Message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Unauthorized(m) | Error::RefreshFailed(m) | Error::Configuration(m) => m,
            Error::Transport { message, .. } | Error::Api { message, .. } => message,
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
