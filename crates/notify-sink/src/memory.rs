//! Sink that keeps notices in memory.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::{NotificationSink, Severity};

/// A notice as received by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Records every notice in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    notices: Mutex<Vec<Notice>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all notices received so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.lock().clone()
    }

    /// Number of notices received with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.lock().iter().filter(|n| n.severity == severity).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notice>> {
        match self.notices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, message: &str, severity: Severity, duration: Option<Duration>) {
        self.lock().push(Notice {
            message: message.to_string(),
            severity,
            duration_ms: duration.map(|d| d.as_millis() as u64),
        });
    }
}
