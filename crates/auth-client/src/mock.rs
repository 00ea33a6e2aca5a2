//! Scripted in-memory transport shared by the unit tests.
//!
//! Routes:
//! - `.../token/refresh`: answers with the configured `RefreshReply`; an issued
//!   credential becomes the one the API accepts
//! - `/always-401`: rejects every token
//! - `/missing`: 404 with a JSON message
//! - `/vanished`: 401 unless authorized, then 404
//! - `/unreachable`: transport error
//! - `/public...`: 200 without credentials
//! - anything else: 200 if `Authorization: Bearer <accepted>`, otherwise 401
//!
//! Calls are recorded synchronously when `send` is first polled, so the
//! recorded order is the dispatch order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use credential_store::Credential;
use serde_json::json;
use tokio::sync::Notify;

use crate::descriptor::PreparedRequest;
use crate::transport::{Transport, TransportError, TransportResponse};

#[derive(Clone)]
pub(crate) enum RefreshReply {
    Issue(Credential),
    Status(u16),
    Empty,
    Body(String),
    Unreachable,
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub body: Option<serde_json::Value>,
}

pub(crate) struct MockTransport {
    accepted: Mutex<String>,
    refresh_reply: RefreshReply,
    gated: bool,
    gate: Notify,
    calls: Mutex<Vec<Recorded>>,
    refresh_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(accepted: &str, refresh_reply: RefreshReply) -> Arc<Self> {
        Self::build(accepted, refresh_reply, false)
    }

    /// Refresh calls block until `open_gate` is called.
    pub fn gated(accepted: &str, refresh_reply: RefreshReply) -> Arc<Self> {
        Self::build(accepted, refresh_reply, true)
    }

    fn build(accepted: &str, refresh_reply: RefreshReply, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            accepted: Mutex::new(accepted.to_string()),
            refresh_reply,
            gated,
            gate: Notify::new(),
            calls: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    pub fn open_gate(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Non-refresh calls that carried the given Authorization header, in
    /// dispatch order.
    pub fn calls_with(&self, authorization: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.url.ends_with("/token/refresh"))
            .filter(|c| c.authorization.as_deref() == Some(authorization))
            .map(|c| c.url)
            .collect()
    }

    async fn answer_refresh(&self) -> Result<TransportResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.gate.notified().await;
        }
        match &self.refresh_reply {
            RefreshReply::Issue(credential) => {
                *self.accepted.lock().unwrap() = credential.access.clone();
                Ok(TransportResponse::new(
                    200,
                    serde_json::to_string(credential).unwrap(),
                ))
            }
            RefreshReply::Status(status) => Ok(TransportResponse::new(
                *status,
                r#"{"message":"refresh rejected"}"#,
            )),
            RefreshReply::Empty => Ok(TransportResponse::new(200, "")),
            RefreshReply::Body(body) => Ok(TransportResponse::new(200, body.clone())),
            RefreshReply::Unreachable => Err(TransportError::Connect("connection refused".into())),
        }
    }
}

impl Transport for MockTransport {
    fn send<'a>(
        &'a self,
        request: &'a PreparedRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>> {
        let authorization = request.authorization().map(str::to_string);
        self.calls.lock().unwrap().push(Recorded {
            method: request.method.to_string(),
            url: request.url.clone(),
            authorization: authorization.clone(),
            body: request.body.clone(),
        });

        Box::pin(async move {
            let path = request.path();
            if path.ends_with("/token/refresh") {
                return self.answer_refresh().await;
            }
            match path {
                "/always-401" => Ok(TransportResponse::new(401, r#"{"message":"token rejected"}"#)),
                "/missing" => Ok(TransportResponse::new(404, r#"{"message":"order not found"}"#)),
                "/unreachable" => Err(TransportError::Connect("connection refused".into())),
                p if p.starts_with("/public") => {
                    Ok(TransportResponse::new(200, json!({"public": true}).to_string()))
                }
                _ => {
                    let expected = format!("Bearer {}", self.accepted.lock().unwrap());
                    if authorization.as_deref() != Some(expected.as_str()) {
                        Ok(TransportResponse::new(401, r#"{"message":"token expired"}"#))
                    } else if path == "/vanished" {
                        Ok(TransportResponse::new(404, r#"{"message":"resource removed"}"#))
                    } else {
                        Ok(TransportResponse::new(
                            200,
                            json!({"path": request.url, "auth": expected}).to_string(),
                        ))
                    }
                }
            }
        })
    }
}
