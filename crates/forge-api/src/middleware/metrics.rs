//! # Request Metrics
//!
//! Lightweight request counters using atomics, rendered together with the
//! lifecycle and dispatch counters in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use forge_lifecycle::{DispatchSnapshot, StatsSnapshot};

/// Shared request counters.
#[derive(Debug, Clone, Default)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Render every counter in Prometheus text format.
    pub fn render(&self, lifecycle: StatsSnapshot, dispatch: DispatchSnapshot) -> String {
        let mut out = String::new();
        counter(&mut out, "forge_http_requests_total", "HTTP requests served.", &[("", self.requests())]);
        counter(
            &mut out,
            "forge_http_errors_total",
            "HTTP responses with 4xx or 5xx status.",
            &[("", self.errors())],
        );
        counter(
            &mut out,
            "forge_transitions_total",
            "Transition requests by outcome.",
            &[
                ("outcome=\"applied\"", lifecycle.applied),
                ("outcome=\"entity_not_found\"", lifecycle.entity_not_found),
                ("outcome=\"stale_state\"", lifecycle.stale_state),
                ("outcome=\"illegal_transition\"", lifecycle.illegal_transition),
                ("outcome=\"validation\"", lifecycle.validation),
                ("outcome=\"store_failure\"", lifecycle.store_failure),
            ],
        );
        counter(
            &mut out,
            "forge_dispatch_total",
            "Side-effect dispatch events.",
            &[
                ("event=\"queued\"", dispatch.queued),
                ("event=\"delivered\"", dispatch.delivered),
                ("event=\"retried\"", dispatch.retried),
                ("event=\"failed\"", dispatch.failed),
            ],
        );
        out
    }
}

fn counter(out: &mut String, name: &str, help: &str, samples: &[(&str, u64)]) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    for (labels, value) in samples {
        if labels.is_empty() {
            let _ = writeln!(out, "{name} {value}");
        } else {
            let _ = writeln!(out, "{name}{{{labels}}} {value}");
        }
    }
}

/// Middleware that increments request and error counters.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        m.request_count.fetch_add(1, Ordering::Relaxed);
        if response.status().is_server_error() || response.status().is_client_error() {
            m.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let m = ApiMetrics::new();
        assert_eq!((m.requests(), m.errors()), (0, 0));
    }

    #[test]
    fn clone_shares_underlying_counters() {
        let m = ApiMetrics::new();
        let c = m.clone();
        c.request_count.fetch_add(2, Ordering::Relaxed);
        assert_eq!(m.requests(), 2);
    }

    #[test]
    fn render_includes_labelled_outcomes() {
        let m = ApiMetrics::new();
        m.request_count.fetch_add(5, Ordering::Relaxed);
        let text = m.render(
            StatsSnapshot {
                applied: 3,
                stale_state: 1,
                ..StatsSnapshot::default()
            },
            DispatchSnapshot::default(),
        );
        assert!(text.contains("forge_http_requests_total 5"));
        assert!(text.contains("forge_transitions_total{outcome=\"applied\"} 3"));
        assert!(text.contains("forge_transitions_total{outcome=\"stale_state\"} 1"));
        assert!(text.contains("# TYPE forge_dispatch_total counter"));
    }
}
