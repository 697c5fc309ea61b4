//! Process-wide counters.
//!
//! Plain atomics shared behind an `Arc`; no sampling, no windows. The health
//! `/metrics` route serializes snapshots of these.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters maintained by the request validator.
#[derive(Debug, Default)]
pub struct ValidationMetrics {
    total_validations: AtomicU64,
    failed_validations: AtomicU64,
    sanitizations: AtomicU64,
    security_threats: AtomicU64,
    performance_warnings: AtomicU64,
}

impl ValidationMetrics {
    pub fn record_validation(&self, passed: bool) {
        self.total_validations.fetch_add(1, Ordering::Relaxed);
        if !passed {
            self.failed_validations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_sanitization(&self) {
        self.sanitizations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_security_threats(&self, count: u64) {
        if count > 0 {
            self.security_threats.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_performance_warning(&self) {
        self.performance_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ValidationMetricsSnapshot {
        ValidationMetricsSnapshot {
            total_validations: self.total_validations.load(Ordering::Relaxed),
            failed_validations: self.failed_validations.load(Ordering::Relaxed),
            sanitizations: self.sanitizations.load(Ordering::Relaxed),
            security_threats: self.security_threats.load(Ordering::Relaxed),
            performance_warnings: self.performance_warnings.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationMetricsSnapshot {
    pub total_validations: u64,
    pub failed_validations: u64,
    pub sanitizations: u64,
    pub security_threats: u64,
    pub performance_warnings: u64,
}

/// Counters maintained by the health endpoint server.
#[derive(Debug, Default)]
pub struct HttpMetrics {
    requests: AtomicU64,
    success: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    total_duration_micros: AtomicU64,
}

impl HttpMetrics {
    pub fn record(&self, status: u16, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        match status {
            200..=399 => self.success.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.client_errors.fetch_add(1, Ordering::Relaxed),
            _ => self.server_errors.fetch_add(1, Ordering::Relaxed),
        };
        self.total_duration_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_micros = self.total_duration_micros.load(Ordering::Relaxed);
        let avg_latency_ms = if requests == 0 {
            0.0
        } else {
            total_micros as f64 / requests as f64 / 1000.0
        };
        HttpMetricsSnapshot {
            requests,
            success: self.success.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            avg_latency_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HttpMetricsSnapshot {
    pub requests: u64,
    pub success: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub avg_latency_ms: f64,
}

/// All process-wide counters, shared by validator and health server.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    pub validation: ValidationMetrics,
    pub http: HttpMetrics,
}

/// Best-effort resident set size in bytes. Reads `/proc/self/status`; returns
/// `None` on platforms without procfs.
pub fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_counters() {
        let metrics = ValidationMetrics::default();
        metrics.record_validation(true);
        metrics.record_validation(false);
        metrics.record_validation(false);
        metrics.record_security_threats(2);
        metrics.record_security_threats(0);
        metrics.record_sanitization();
        metrics.record_performance_warning();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_validations, 3);
        assert_eq!(snap.failed_validations, 2);
        assert_eq!(snap.security_threats, 2);
        assert_eq!(snap.sanitizations, 1);
        assert_eq!(snap.performance_warnings, 1);
    }

    #[test]
    fn test_http_status_classes() {
        let metrics = HttpMetrics::default();
        metrics.record(200, Duration::from_millis(2));
        metrics.record(404, Duration::from_millis(1));
        metrics.record(503, Duration::from_millis(3));

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 3);
        assert_eq!(snap.success, 1);
        assert_eq!(snap.client_errors, 1);
        assert_eq!(snap.server_errors, 1);
        assert!(snap.avg_latency_ms > 0.0);
    }

    #[test]
    fn test_empty_http_metrics_has_zero_latency() {
        let snap = HttpMetrics::default().snapshot();
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.avg_latency_ms, 0.0);
    }
}
