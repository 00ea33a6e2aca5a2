//! Refresh endpoint client
//!
//! POSTs `{"refreshToken": "..."}` to the refresh path without credentials and
//! expects `{"access": "...", "refresh": "..."}` back. Anything else (non-2xx,
//! no response, empty or malformed body) is a refresh failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use credential_store::Credential;
use serde_json::json;
use tracing::debug;

use crate::coordinator::Refresher;
use crate::descriptor::RequestDescriptor;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// `Refresher` that calls the refresh endpoint through a `Transport`.
pub struct EndpointRefresher {
    transport: Arc<dyn Transport>,
    path: String,
}

impl EndpointRefresher {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }
}

impl Refresher for EndpointRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + 'a>> {
        Box::pin(async move {
            let request = RequestDescriptor::post(self.path.as_str())
                .json(json!({ "refreshToken": refresh_token }))
                .ignore_auth()
                .prepare()?;

            let response = self
                .transport
                .send(&request)
                .await
                .map_err(|e| Error::RefreshFailed(format!("refresh request failed: {e}")))?;

            if !response.is_success() {
                return Err(Error::RefreshFailed(format!(
                    "refresh endpoint returned {}",
                    response.status
                )));
            }
            if response.body.trim().is_empty() {
                return Err(Error::RefreshFailed(
                    "refresh endpoint returned no credential".into(),
                ));
            }

            let credential: Credential = serde_json::from_str(&response.body).map_err(|e| {
                Error::RefreshFailed(format!("invalid refresh response: {e}"))
            })?;
            debug!("refresh endpoint issued a new credential");
            Ok(credential)
        })
    }
}
