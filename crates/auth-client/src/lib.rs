//! Authenticated request client with single-flight credential refresh
//!
//! Every call goes through `RequestPipeline::execute`:
//! 1. The descriptor's `:name` placeholders are resolved (`path`)
//! 2. The stored access token is attached as `Authorization: Bearer ...`
//! 3. The call is dispatched through a `Transport`
//! 4. A 401 hands the call to the `RefreshCoordinator`: the first caller runs
//!    the refresh, every other caller that fails meanwhile is suspended in a
//!    FIFO queue, and all of them replay once with the new credential
//! 5. A failed refresh clears the store, notifies once, and rejects the wave
//!
//! Notices go to an injected `notify_sink::NotificationSink`; credentials live
//! in a `credential_store::CredentialStore`.

pub mod classify;
pub mod coordinator;
pub mod descriptor;
pub mod error;
pub mod path;
pub mod pipeline;
pub mod refresh;
pub mod response;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use coordinator::{DispatchTurn, RefreshCoordinator, RefreshState, Refresher, Resumed};
pub use descriptor::{CallOptions, PreparedRequest, RequestDescriptor};
pub use error::{Error, Result};
pub use pipeline::{DEFAULT_REFRESH_PATH, RequestPipeline};
pub use refresh::EndpointRefresher;
pub use response::ApiResponse;
pub use transport::{ReqwestTransport, Transport, TransportError, TransportResponse};

pub use reqwest::Method;
