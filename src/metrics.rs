// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the hybrid engine.
//!
//! Uses the `metrics` crate for backend-agnostic collection; the host
//! application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `hybrid_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `operation`: leaderboard, achievements, challenges, user_stats
//! - `status`: hit, miss, success, error, fallback
//! - `strategy`: cached-data, synthetic-data, default-state, retry-backoff, notify-user

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a facade operation outcome
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "hybrid_engine_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record facade operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "hybrid_engine_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record merged payload size
pub fn record_payload_bytes(operation: &str, bytes: usize) {
    histogram!(
        "hybrid_engine_payload_bytes",
        "operation" => operation.to_string()
    )
    .record(bytes as f64);
}

/// Record a cache lookup outcome (hit, miss, expired)
pub fn record_cache_lookup(outcome: &str) {
    counter!(
        "hybrid_engine_cache_lookups_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a capacity eviction
pub fn record_cache_eviction(policy: &str) {
    counter!(
        "hybrid_engine_cache_evictions_total",
        "policy" => policy.to_string()
    )
    .increment(1);
}

/// Record entries removed by the expiry sweep
pub fn record_expired_removed(count: usize) {
    counter!("hybrid_engine_cache_expired_total").increment(count as u64);
}

/// Set current cache entry count
pub fn set_cache_entries(count: usize) {
    gauge!("hybrid_engine_cache_entries").set(count as f64);
}

/// Set current cache size in bytes
pub fn set_cache_bytes(bytes: usize) {
    gauge!("hybrid_engine_cache_bytes").set(bytes as f64);
}

/// Record a snapshot sink operation
pub fn record_snapshot(operation: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "hybrid_engine_snapshot_total",
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a source error by typed kind
pub fn record_source_error(operation: &str, kind: &str) {
    counter!(
        "hybrid_engine_source_errors_total",
        "operation" => operation.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a fallback strategy attempt outcome
pub fn record_fallback(operation: &str, strategy: &str, outcome: &str) {
    counter!(
        "hybrid_engine_fallback_total",
        "operation" => operation.to_string(),
        "strategy" => strategy.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set throttle in-flight task count
pub fn set_throttle_in_flight(count: usize) {
    gauge!("hybrid_engine_throttle_in_flight").set(count as f64);
}

/// Set throttle wait-queue depth
pub fn set_throttle_queued(count: usize) {
    gauge!("hybrid_engine_throttle_queued").set(count as f64);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($op:expr) => {
        $crate::metrics::LatencyTimer::new($op)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests verify the API compiles and doesn't panic.
    // In production, you'd use metrics-util's Recorder for assertions.

    #[test]
    fn test_record_operation() {
        record_operation("leaderboard", "hit");
        record_operation("achievements", "miss");
        record_operation("user_stats", "error");
    }

    #[test]
    fn test_record_latency() {
        record_latency("leaderboard", Duration::from_micros(100));
        record_latency("challenges", Duration::from_millis(5));
    }

    #[test]
    fn test_cache_metrics() {
        record_cache_lookup("hit");
        record_cache_lookup("miss");
        record_cache_lookup("expired");
        record_cache_eviction("lru");
        record_expired_removed(3);
        set_cache_entries(42);
        set_cache_bytes(1024 * 16);
    }

    #[test]
    fn test_snapshot_metrics() {
        record_snapshot("put", true);
        record_snapshot("remove", false);
    }

    #[test]
    fn test_fallback_metrics() {
        record_source_error("leaderboard", "network");
        record_fallback("leaderboard", "cached-data", "success");
        record_fallback("user_stats", "retry-backoff", "failure");
    }

    #[test]
    fn test_throttle_gauges() {
        set_throttle_in_flight(2);
        set_throttle_queued(7);
    }

    #[test]
    fn test_payload_bytes() {
        record_payload_bytes("leaderboard", 2048);
        record_payload_bytes("achievements", 0);
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("leaderboard");
            // Simulate some work
            std::thread::sleep(Duration::from_micros(10));
        }
        // Timer recorded on drop
    }
}
