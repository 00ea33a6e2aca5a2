//! Notification capability for user-facing failure notices
//!
//! Defines the `NotificationSink` trait that decouples the request pipeline and
//! the refresh coordinator from how failures are presented. `ConsoleSink` is the
//! default: it logs every notice and raises a blocking alert on stderr for
//! errors. `MemorySink` records notices for embedders that render them later
//! (and for tests).

pub mod console;
pub mod memory;

pub use console::ConsoleSink;
pub use memory::{MemorySink, Notice};

use serde::Serialize;
use std::time::Duration;

/// How long a notice stays visible when the caller does not say.
pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_millis(5000);

/// Severity of a notice.
///
/// `Error` is the default: callers that report a failure without choosing a
/// level get the most visible presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
}

impl Severity {
    /// Label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Receives human-readable failure notices.
///
/// Implementations must not block for long: the refresh coordinator calls
/// `notify` while it holds its critical section.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str, severity: Severity, duration: Option<Duration>);
}

impl<S: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<S> {
    fn notify(&self, message: &str, severity: Severity, duration: Option<Duration>) {
        (**self).notify(message, severity, duration)
    }
}
