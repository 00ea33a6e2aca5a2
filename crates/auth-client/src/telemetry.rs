//! Metrics emitted by the pipeline and the coordinator
//!
//! - `auth_requests_total` (counter): labels `status`, `method`
//! - `auth_refresh_total` (counter): label `outcome` (`success` | `failure`)
//! - `auth_replays_total` (counter): calls re-dispatched after a refresh
//! - `auth_pending_calls` (gauge): calls parked behind the running refresh
//!
//! Without an installed recorder these calls are no-ops.

/// Record a finished call with its final status code and HTTP method.
pub fn record_request(status: u16, method: &str) {
    metrics::counter!(
        "auth_requests_total",
        "status" => status.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

/// Record a settled refresh.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("auth_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a replay after refresh.
pub fn record_replay() {
    metrics::counter!("auth_replays_total").increment(1);
}

/// Set the suspended-call depth.
pub fn set_pending(depth: usize) {
    metrics::gauge!("auth_pending_calls").set(depth as f64);
}
