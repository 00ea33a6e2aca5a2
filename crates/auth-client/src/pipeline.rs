//! Request pipeline
//!
//! Per-call state machine:
//!
//! ```text
//! NotStarted -> InFlight -> Succeeded
//!                        -> Failed
//!                        -> AwaitingRefresh -> Replayed -> Succeeded | Failed
//! ```
//!
//! A call is replayed at most once. A 401 on the replay is final and never
//! starts a second refresh for that call.
//!
//! With `throw_error`, a final 401 is raised as `Error::Unauthorized` and any
//! other failure as `Error::Transport`.

use std::future::poll_fn;
use std::sync::Arc;

use credential_store::CredentialStore;
use notify_sink::{NotificationSink, Severity};
use serde::de::DeserializeOwned;
use tracing::{Span, debug, instrument, warn};

use crate::classify::{
    Classification, DEFAULT_ERROR_CODE, DEFAULT_ERROR_MESSAGE, UNAUTHORIZED_MESSAGE,
    classify_status, error_message,
};
use crate::coordinator::{DispatchTurn, RefreshCoordinator, Refresher, Resumed};
use crate::descriptor::{CallOptions, PreparedRequest, RequestDescriptor};
use crate::error::{Error, Result};
use crate::refresh::EndpointRefresher;
use crate::response::ApiResponse;
use crate::telemetry;
use crate::transport::{Transport, TransportError, TransportResponse};

/// Refresh endpoint path used when none is configured.
pub const DEFAULT_REFRESH_PATH: &str = "/token/refresh";

/// Notice raised when an authenticated call finds no stored credential.
pub const NO_CREDENTIAL_MESSAGE: &str = "No stored credential, please sign in";

/// Result of a single dispatch.
enum Attempt {
    Succeeded(String),
    Unauthorized(String),
    Failed { code: u16, message: String },
}

/// Executes calls with credential attach, refresh, and replay.
pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator<PreparedRequest>>,
    sink: Arc<dyn NotificationSink>,
    refresh_path: String,
}

impl RequestPipeline {
    /// Pipeline that refreshes through `refresh_path` on the same transport.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        sink: Arc<dyn NotificationSink>,
        refresh_path: impl Into<String>,
    ) -> Self {
        let refresh_path = refresh_path.into();
        let refresher = Arc::new(EndpointRefresher::new(
            transport.clone(),
            refresh_path.clone(),
        ));
        Self::with_refresher(transport, store, sink, refresher, refresh_path)
    }

    /// Pipeline with a custom refresher. Calls to `refresh_path` made through
    /// the pipeline still never trigger a refresh.
    pub fn with_refresher(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        sink: Arc<dyn NotificationSink>,
        refresher: Arc<dyn Refresher>,
        refresh_path: impl Into<String>,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(store, refresher, sink.clone()));
        Self {
            transport,
            coordinator,
            sink,
            refresh_path: refresh_path.into(),
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator<PreparedRequest>> {
        &self.coordinator
    }

    /// Execute a call and decode a successful body as `T`.
    ///
    /// Returns `Err` only for configuration errors and, when the descriptor
    /// asks for `throw_error`, for failures after dispatch. Everything else,
    /// including the no-credential fast path, is an `ApiResponse`.
    #[instrument(
        skip_all,
        fields(
            request_id = tracing::field::Empty,
            method = %descriptor.method,
            url = %descriptor.url
        )
    )]
    pub async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<ApiResponse<T>> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().simple());
        Span::current().record("request_id", request_id.as_str());

        let options = descriptor.options;
        let mut request = descriptor.prepare()?;

        let presented = if options.ignore_auth {
            None
        } else {
            match self.coordinator.credential().await {
                Some(credential) => {
                    request.set_bearer(&credential.access)?;
                    Some(credential.access)
                }
                None => {
                    // Fails fast regardless of call flags
                    warn!("no stored credential, call not dispatched");
                    self.sink
                        .notify(NO_CREDENTIAL_MESSAGE, Severity::Error, None);
                    telemetry::record_request(401, request.method.as_str());
                    return Ok(ApiResponse::failure(401, UNAUTHORIZED_MESSAGE));
                }
            }
        };

        match self.dispatch(&request).await {
            Attempt::Succeeded(body) => self.succeed(&request, &body, options),
            Attempt::Unauthorized(message) => match presented {
                Some(stale) if !self.is_refresh_call(&request) => {
                    self.replay_after_refresh(&stale, request, options).await
                }
                _ => self.fail(&request, 401, message, options),
            },
            Attempt::Failed { code, message } => self.fail(&request, code, message, options),
        }
    }

    /// Suspend on the coordinator, then dispatch once more with the new token.
    async fn replay_after_refresh<T: DeserializeOwned>(
        &self,
        stale_access: &str,
        request: PreparedRequest,
        options: CallOptions,
    ) -> Result<ApiResponse<T>> {
        debug!("authorization failed, awaiting credential refresh");
        let method = request.method.clone();
        let Resumed {
            mut request,
            credential,
            turn,
        } = match self.coordinator.request_refresh(stale_access, request).await {
            Ok(resumed) => resumed,
            Err(e) => {
                // A failed refresh already notified once for the whole wave
                debug!(error = %e, "no credential to replay with");
                telemetry::record_request(401, method.as_str());
                return self.finish_failure(401, UNAUTHORIZED_MESSAGE.into(), options);
            }
        };

        request.set_bearer(&credential.access)?;
        telemetry::record_replay();
        debug!("replaying call with refreshed credential");

        match self.dispatch_in_turn(&request, turn).await {
            Attempt::Succeeded(body) => self.succeed(&request, &body, options),
            Attempt::Unauthorized(message) => {
                warn!("replay rejected again, giving up");
                self.fail(&request, 401, message, options)
            }
            Attempt::Failed { code, message } => self.fail(&request, code, message, options),
        }
    }

    async fn dispatch(&self, request: &PreparedRequest) -> Attempt {
        Self::classify(self.transport.send(request).await)
    }

    /// Dispatch, releasing `turn` once the send has been polled for the first
    /// time so the next resumed call can start.
    async fn dispatch_in_turn(&self, request: &PreparedRequest, turn: DispatchTurn) -> Attempt {
        let mut sending = self.transport.send(request);
        let mut turn = Some(turn);
        let outcome = poll_fn(|cx| {
            let poll = sending.as_mut().poll(cx);
            if let Some(turn) = turn.take() {
                turn.release();
            }
            poll
        })
        .await;
        Self::classify(outcome)
    }

    fn classify(outcome: std::result::Result<TransportResponse, TransportError>) -> Attempt {
        match outcome {
            Ok(response) => match classify_status(response.status) {
                Classification::Success => Attempt::Succeeded(response.body),
                Classification::Unauthorized => Attempt::Unauthorized(
                    error_message(&response.body).unwrap_or_else(|| UNAUTHORIZED_MESSAGE.into()),
                ),
                Classification::Failure => Attempt::Failed {
                    code: response.status,
                    message: error_message(&response.body)
                        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.into()),
                },
            },
            Err(e) => {
                warn!(error = %e, "transport failure");
                Attempt::Failed {
                    code: DEFAULT_ERROR_CODE,
                    message: DEFAULT_ERROR_MESSAGE.into(),
                }
            }
        }
    }

    fn succeed<T: DeserializeOwned>(
        &self,
        request: &PreparedRequest,
        body: &str,
        options: CallOptions,
    ) -> Result<ApiResponse<T>> {
        let body = if body.trim().is_empty() { "null" } else { body };
        match serde_json::from_str::<T>(body) {
            Ok(data) => {
                telemetry::record_request(200, request.method.as_str());
                Ok(ApiResponse::success(data))
            }
            Err(e) => {
                warn!(error = %e, "response body did not decode");
                self.fail(
                    request,
                    DEFAULT_ERROR_CODE,
                    format!("invalid response body: {e}"),
                    options,
                )
            }
        }
    }

    /// Record, notify unless silent, and shape a failure.
    fn fail<T>(
        &self,
        request: &PreparedRequest,
        code: u16,
        message: String,
        options: CallOptions,
    ) -> Result<ApiResponse<T>> {
        telemetry::record_request(code, request.method.as_str());
        if !options.silent_error {
            self.sink.notify(&message, Severity::Error, None);
        }
        self.finish_failure(code, message, options)
    }

    fn finish_failure<T>(
        &self,
        code: u16,
        message: String,
        options: CallOptions,
    ) -> Result<ApiResponse<T>> {
        debug!(code, %message, "call failed");
        if options.throw_error {
            return Err(match code {
                401 => Error::Unauthorized(message),
                code => Error::Transport { code, message },
            });
        }
        Ok(ApiResponse::failure(code, message))
    }

    fn is_refresh_call(&self, request: &PreparedRequest) -> bool {
        let refresh = self.refresh_path.trim_end_matches('/');
        !refresh.is_empty() && request.path().trim_end_matches('/').ends_with(refresh)
    }
}
