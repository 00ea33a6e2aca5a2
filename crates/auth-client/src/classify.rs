//! Response classification
//!
//! Decides what an upstream response means for the pipeline: success,
//! authorization failure (eligible for refresh), or any other failure. Also
//! extracts the human-readable message from an error body.

/// Error code reported when a failure carries no HTTP status.
pub const DEFAULT_ERROR_CODE: u16 = 500;

/// Message reported when an error body carries none.
pub const DEFAULT_ERROR_MESSAGE: &str = "Request failed";

/// Message for authorization failures.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// What a response status means to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// The presented credential is invalid or expired
    Unauthorized,
    Failure,
}

/// Classify a response by HTTP status.
///
/// Only 401 is an authorization failure. 403 means the credential is valid but
/// lacks permission, so refreshing it would not help.
pub fn classify_status(status: u16) -> Classification {
    match status {
        200..=299 => Classification::Success,
        401 => Classification::Unauthorized,
        _ => Classification::Failure,
    }
}

/// Pull the error message out of a JSON error body.
///
/// Looks for a top-level `message`, then `error.message`, then a string
/// `error`. Returns `None` for non-JSON bodies or blank messages.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| {
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
        })
        .or_else(|| value.get("error").and_then(|e| e.as_str()))?;
    let message = message.trim();
    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}
