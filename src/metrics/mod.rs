//! Prometheus metrics for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// HTTP requests received
    pub http_requests: AtomicU64,
    /// Sessions opened
    pub sessions_created: AtomicU64,
    /// Sessions closed
    pub sessions_closed: AtomicU64,
    /// Sessions currently in the table
    pub active_sessions: AtomicU64,
    /// Tool calls
    pub tool_calls: AtomicU64,
    /// Tool calls that returned an error
    pub tool_failures: AtomicU64,
    /// Failed upstream API requests
    pub upstream_errors: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment HTTP requests.
    pub fn inc_http_requests(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a new session.
    pub fn session_opened(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed session.
    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        // Never wraps below zero.
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Increment tool calls.
    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment failed tool calls.
    pub fn inc_tool_failures(&self) {
        self.tool_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment upstream errors.
    pub fn inc_upstream_errors(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            http_requests: self.http_requests.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            tool_failures: self.tool_failures.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP cucumberstudio_mcp_http_requests_total HTTP requests received
# TYPE cucumberstudio_mcp_http_requests_total counter
cucumberstudio_mcp_http_requests_total {}

# HELP cucumberstudio_mcp_sessions_created_total Sessions opened
# TYPE cucumberstudio_mcp_sessions_created_total counter
cucumberstudio_mcp_sessions_created_total {}

# HELP cucumberstudio_mcp_sessions_closed_total Sessions closed
# TYPE cucumberstudio_mcp_sessions_closed_total counter
cucumberstudio_mcp_sessions_closed_total {}

# HELP cucumberstudio_mcp_active_sessions Open sessions
# TYPE cucumberstudio_mcp_active_sessions gauge
cucumberstudio_mcp_active_sessions {}

# HELP cucumberstudio_mcp_tool_calls_total Tool calls
# TYPE cucumberstudio_mcp_tool_calls_total counter
cucumberstudio_mcp_tool_calls_total {}

# HELP cucumberstudio_mcp_tool_failures_total Tool calls that failed
# TYPE cucumberstudio_mcp_tool_failures_total counter
cucumberstudio_mcp_tool_failures_total {}

# HELP cucumberstudio_mcp_upstream_errors_total Failed Cucumber Studio API requests
# TYPE cucumberstudio_mcp_upstream_errors_total counter
cucumberstudio_mcp_upstream_errors_total {}
"#,
            s.http_requests,
            s.sessions_created,
            s.sessions_closed,
            s.active_sessions,
            s.tool_calls,
            s.tool_failures,
            s.upstream_errors
        )
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub http_requests: u64,
    pub sessions_created: u64,
    pub sessions_closed: u64,
    pub active_sessions: u64,
    pub tool_calls: u64,
    pub tool_failures: u64,
    pub upstream_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_gauge() {
        let metrics = Metrics::new();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();

        let s = metrics.snapshot();
        assert_eq!(s.sessions_created, 2);
        assert_eq!(s.sessions_closed, 1);
        assert_eq!(s.active_sessions, 1);

        metrics.session_closed();
        metrics.session_closed();
        assert_eq!(metrics.snapshot().active_sessions, 0);
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = Metrics::new();
        metrics.inc_tool_calls();
        metrics.inc_tool_failures();
        metrics.inc_upstream_errors();

        let text = metrics.to_prometheus();
        assert!(text.contains("cucumberstudio_mcp_tool_calls_total 1"));
        assert!(text.contains("cucumberstudio_mcp_tool_failures_total 1"));
        assert!(text.contains("cucumberstudio_mcp_upstream_errors_total 1"));
        assert!(text.contains("# TYPE cucumberstudio_mcp_active_sessions gauge"));
    }
}
