// ── Submission metrics (request-driven) ─────────────────────────

/// Counter: finished form submissions. Labels: outcome.
pub const SUBMISSIONS_TOTAL: &str = "slotbook_submissions_total";

/// Histogram: notification dispatch latency in seconds.
pub const DISPATCH_DURATION_SECONDS: &str = "slotbook_dispatch_duration_seconds";

// ── Storage metrics ─────────────────────────────────────────────

/// Counter: state writes that storage refused.
pub const PERSIST_FAILURES_TOTAL: &str = "slotbook_persist_failures_total";

/// Install the fmt subscriber. Safe to call more than once; later calls are
/// no-ops, as is calling it when the host already installed a subscriber.
pub fn init_tracing() {
    if tracing_subscriber::fmt().try_init().is_ok() {
        tracing::debug!("tracing initialised");
    }
}
