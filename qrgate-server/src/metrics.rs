//! Simple metrics collection for observability
//!
//! This module provides lightweight metrics collection using atomic counters.
//! Designed for minimal overhead and zero allocations in the hot path.

use crate::types::EndpointClass;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// How an operation request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Admitted and completed
    Succeeded,
    /// Refused by the rate limiter
    Rejected,
    /// Admitted but failed (validation, codec or library error)
    Failed,
}

/// Core metrics collected by the server
pub struct Metrics {
    /// Server start time
    start_time: Instant,

    /// Total operation requests received
    pub total_requests: AtomicU64,

    /// Requests by endpoint class
    pub generate_requests: AtomicU64,
    pub decode_requests: AtomicU64,
    pub ocr_requests: AtomicU64,

    /// Outcomes
    pub requests_succeeded: AtomicU64,
    pub requests_rejected: AtomicU64,
    pub requests_failed: AtomicU64,

    /// Request latency buckets (in microseconds)
    pub latency_under_10ms: AtomicU64,
    pub latency_under_100ms: AtomicU64,
    pub latency_under_1s: AtomicU64,
    pub latency_under_10s: AtomicU64,
    pub latency_over_10s: AtomicU64,

    /// Histogram support
    pub latency_sum_micros: AtomicU64,
    pub latency_count: AtomicU64,

    /// Limiter store
    pub active_windows: AtomicUsize,
    pub window_evictions: AtomicU64,

    /// Audit journal
    pub audit_entries: AtomicU64,
    pub audit_failures: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            generate_requests: AtomicU64::new(0),
            decode_requests: AtomicU64::new(0),
            ocr_requests: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            latency_under_10ms: AtomicU64::new(0),
            latency_under_100ms: AtomicU64::new(0),
            latency_under_1s: AtomicU64::new(0),
            latency_under_10s: AtomicU64::new(0),
            latency_over_10s: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            active_windows: AtomicUsize::new(0),
            window_evictions: AtomicU64::new(0),
            audit_entries: AtomicU64::new(0),
            audit_failures: AtomicU64::new(0),
        }
    }

    /// Record a finished operation request and its latency
    pub fn record_request(&self, class: EndpointClass, latency_us: u64, outcome: Outcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match class {
            EndpointClass::Generate => self.generate_requests.fetch_add(1, Ordering::Relaxed),
            EndpointClass::Decode => self.decode_requests.fetch_add(1, Ordering::Relaxed),
            EndpointClass::Ocr => self.ocr_requests.fetch_add(1, Ordering::Relaxed),
        };

        match outcome {
            Outcome::Succeeded => self.requests_succeeded.fetch_add(1, Ordering::Relaxed),
            Outcome::Rejected => self.requests_rejected.fetch_add(1, Ordering::Relaxed),
            Outcome::Failed => self.requests_failed.fetch_add(1, Ordering::Relaxed),
        };

        // Record latency bucket
        match latency_us {
            0..=9_999 => self.latency_under_10ms.fetch_add(1, Ordering::Relaxed),
            10_000..=99_999 => self.latency_under_100ms.fetch_add(1, Ordering::Relaxed),
            100_000..=999_999 => self.latency_under_1s.fetch_add(1, Ordering::Relaxed),
            1_000_000..=9_999_999 => self.latency_under_10s.fetch_add(1, Ordering::Relaxed),
            _ => self.latency_over_10s.fetch_add(1, Ordering::Relaxed),
        };

        self.latency_sum_micros
            .fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the number of open rate windows
    pub fn update_active_windows(&self, count: usize) {
        self.active_windows.store(count, Ordering::Relaxed);
    }

    /// Record windows reclaimed by a sweep
    pub fn record_evictions(&self, count: usize) {
        self.window_evictions
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_audit_entry(&self) {
        self.audit_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        output.push_str("# HELP qrgate_uptime_seconds Time since server start in seconds\n");
        output.push_str("# TYPE qrgate_uptime_seconds gauge\n");
        output.push_str(&format!(
            "qrgate_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        output.push_str("# HELP qrgate_requests_total Total number of operation requests\n");
        output.push_str("# TYPE qrgate_requests_total counter\n");
        output.push_str(&format!(
            "qrgate_requests_total {}\n\n",
            self.total_requests.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP qrgate_requests_by_endpoint Operation requests by endpoint class\n");
        output.push_str("# TYPE qrgate_requests_by_endpoint counter\n");
        for (class, counter) in [
            (EndpointClass::Generate, &self.generate_requests),
            (EndpointClass::Decode, &self.decode_requests),
            (EndpointClass::Ocr, &self.ocr_requests),
        ] {
            output.push_str(&format!(
                "qrgate_requests_by_endpoint{{endpoint=\"{}\"}} {}\n",
                class,
                counter.load(Ordering::Relaxed)
            ));
        }
        output.push('\n');

        output.push_str("# HELP qrgate_requests_succeeded Operations that completed\n");
        output.push_str("# TYPE qrgate_requests_succeeded counter\n");
        output.push_str(&format!(
            "qrgate_requests_succeeded {}\n\n",
            self.requests_succeeded.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP qrgate_requests_rejected Operations refused by the rate limiter\n");
        output.push_str("# TYPE qrgate_requests_rejected counter\n");
        output.push_str(&format!(
            "qrgate_requests_rejected {}\n\n",
            self.requests_rejected.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP qrgate_requests_failed Admitted operations that failed\n");
        output.push_str("# TYPE qrgate_requests_failed counter\n");
        output.push_str(&format!(
            "qrgate_requests_failed {}\n\n",
            self.requests_failed.load(Ordering::Relaxed)
        ));

        let under_10ms = self.latency_under_10ms.load(Ordering::Relaxed);
        let under_100ms = under_10ms + self.latency_under_100ms.load(Ordering::Relaxed);
        let under_1s = under_100ms + self.latency_under_1s.load(Ordering::Relaxed);
        let under_10s = under_1s + self.latency_under_10s.load(Ordering::Relaxed);

        output.push_str("# HELP qrgate_request_duration Request latency distribution\n");
        output.push_str("# TYPE qrgate_request_duration histogram\n");
        output.push_str(&format!(
            "qrgate_request_duration_bucket{{le=\"0.01\"}} {under_10ms}\n"
        ));
        output.push_str(&format!(
            "qrgate_request_duration_bucket{{le=\"0.1\"}} {under_100ms}\n"
        ));
        output.push_str(&format!(
            "qrgate_request_duration_bucket{{le=\"1\"}} {under_1s}\n"
        ));
        output.push_str(&format!(
            "qrgate_request_duration_bucket{{le=\"10\"}} {under_10s}\n"
        ));
        output.push_str(&format!(
            "qrgate_request_duration_bucket{{le=\"+Inf\"}} {}\n",
            self.latency_count.load(Ordering::Relaxed)
        ));

        let latency_sum_seconds =
            self.latency_sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!(
            "qrgate_request_duration_sum {latency_sum_seconds:.6}\n"
        ));
        output.push_str(&format!(
            "qrgate_request_duration_count {}\n\n",
            self.latency_count.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP qrgate_active_windows Number of open rate limit windows\n");
        output.push_str("# TYPE qrgate_active_windows gauge\n");
        output.push_str(&format!(
            "qrgate_active_windows {}\n\n",
            self.active_windows.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP qrgate_window_evictions Total expired windows reclaimed\n");
        output.push_str("# TYPE qrgate_window_evictions counter\n");
        output.push_str(&format!(
            "qrgate_window_evictions {}\n\n",
            self.window_evictions.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP qrgate_audit_entries Total entries written to the audit log\n");
        output.push_str("# TYPE qrgate_audit_entries counter\n");
        output.push_str(&format!(
            "qrgate_audit_entries {}\n\n",
            self.audit_entries.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP qrgate_audit_failures Audit log writes that failed\n");
        output.push_str("# TYPE qrgate_audit_failures counter\n");
        output.push_str(&format!(
            "qrgate_audit_failures {}\n",
            self.audit_failures.load(Ordering::Relaxed)
        ));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.total_requests.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.requests_succeeded.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.requests_rejected.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.audit_failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new();

        metrics.record_request(EndpointClass::Generate, 5_000, Outcome::Succeeded);
        assert_eq!(metrics.total_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.generate_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.latency_under_10ms.load(Ordering::Relaxed), 1);

        metrics.record_request(EndpointClass::Ocr, 2_500_000, Outcome::Rejected);
        assert_eq!(metrics.total_requests.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.ocr_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.requests_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.latency_under_10s.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_store_and_audit_counters() {
        let metrics = Metrics::new();
        metrics.update_active_windows(12);
        metrics.record_evictions(3);
        metrics.record_evictions(2);
        metrics.record_audit_entry();
        metrics.record_audit_failure();

        assert_eq!(metrics.active_windows.load(Ordering::Relaxed), 12);
        assert_eq!(metrics.window_evictions.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.audit_entries.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.audit_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();

        metrics.record_request(EndpointClass::Decode, 500, Outcome::Succeeded);
        metrics.record_request(EndpointClass::Decode, 1_500, Outcome::Failed);
        metrics.record_audit_failure();

        let output = metrics.export_prometheus();

        assert!(output.contains("qrgate_uptime_seconds"));
        assert!(output.contains("qrgate_requests_total 2"));
        assert!(output.contains("qrgate_requests_succeeded 1"));
        assert!(output.contains("qrgate_requests_failed 1"));
        assert!(output.contains("qrgate_requests_by_endpoint{endpoint=\"decode\"} 2"));
        assert!(output.contains("qrgate_request_duration_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("qrgate_audit_failures 1"));
    }
}
