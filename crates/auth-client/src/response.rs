//! Structured call results

use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::error::{Error, Result};

/// Outcome of a call as seen by the caller.
///
/// Serializes as `{"success":true,"data":...}` or
/// `{"success":false,"errorCode":401,"errorMessage":"Unauthorized"}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Success { data: T },
    Failure { error_code: u16, error_message: String },
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse::Success { data }
    }

    pub fn failure(error_code: u16, error_message: impl Into<String>) -> Self {
        ApiResponse::Failure {
            error_code,
            error_message: error_message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ApiResponse::Success { data } => Some(data),
            ApiResponse::Failure { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<u16> {
        match self {
            ApiResponse::Success { .. } => None,
            ApiResponse::Failure { error_code, .. } => Some(*error_code),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ApiResponse::Success { .. } => None,
            ApiResponse::Failure { error_message, .. } => Some(error_message),
        }
    }

    /// Convert into a `Result`, turning a failure into `Error::Api`.
    pub fn into_result(self) -> Result<T> {
        match self {
            ApiResponse::Success { data } => Ok(data),
            ApiResponse::Failure {
                error_code,
                error_message,
            } => Err(Error::Api {
                code: error_code,
                message: error_message,
            }),
        }
    }
}

impl<T: Serialize> Serialize for ApiResponse<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ApiResponse::Success { data } => {
                let mut s = serializer.serialize_struct("ApiResponse", 2)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("data", data)?;
                s.end()
            }
            ApiResponse::Failure {
                error_code,
                error_message,
            } => {
                let mut s = serializer.serialize_struct("ApiResponse", 3)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("errorCode", error_code)?;
                s.serialize_field("errorMessage", error_message)?;
                s.end()
            }
        }
    }
}
