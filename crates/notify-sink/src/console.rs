//! Default sink: structured log line plus a stderr alert for errors.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::{DEFAULT_NOTICE_DURATION, NotificationSink, Severity};

/// Logs every notice through `tracing`. `Severity::Error` notices are also
/// written to the alert writer (stderr unless replaced) so an operator sees
/// them even when logs go elsewhere.
pub struct ConsoleSink {
    alert: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_alert_writer(Box::new(std::io::stderr()))
    }

    /// Replace the alert destination.
    pub fn with_alert_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            alert: Mutex::new(writer),
        }
    }

    fn raise_alert(&self, message: &str) {
        let mut writer = match self.alert.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(writer, "[Error]: {message}").and_then(|_| writer.flush()) {
            warn!(error = %e, "failed to write alert");
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for ConsoleSink {
    fn notify(&self, message: &str, severity: Severity, duration: Option<Duration>) {
        let duration_ms = duration.unwrap_or(DEFAULT_NOTICE_DURATION).as_millis() as u64;
        let label = severity.label();
        match severity {
            Severity::Info => info!(severity = label, duration_ms, "{message}"),
            Severity::Warning => warn!(severity = label, duration_ms, "{message}"),
            Severity::Error => {
                error!(severity = label, duration_ms, "{message}");
                self.raise_alert(message);
            }
        }
    }
}
