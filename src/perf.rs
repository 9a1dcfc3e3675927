// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process performance samples.
//!
//! Every facade call appends one [`PerformanceSample`] to a bounded ring
//! buffer; once the cap is reached the oldest sample is silently dropped.
//! This is the queryable, per-operation view the rendering layer can pull —
//! distinct from the ambient [`crate::metrics`] emitters, which feed
//! whatever exporter the host application installs.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;

use crate::record::epoch_ms;

/// One timed facade call.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSample {
    pub operation: String,
    pub duration_ms: u64,
    pub cache_hit: bool,
    pub payload_bytes: usize,
    pub timestamp_ms: u64,
    pub user_id: Option<String>,
}

impl PerformanceSample {
    #[must_use]
    pub fn new(operation: &str, duration_ms: u64, cache_hit: bool, payload_bytes: usize) -> Self {
        Self {
            operation: operation.to_string(),
            duration_ms,
            cache_hit,
            payload_bytes,
            timestamp_ms: epoch_ms(),
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(String::from);
        self
    }
}

/// Aggregates over one operation's samples.
///
/// All-zero values mean "no samples"; check `call_count` to tell an idle
/// operation apart from a genuinely instant one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationAverages {
    pub mean_duration_ms: f64,
    pub mean_payload_bytes: f64,
    pub call_count: usize,
    pub cache_hit_rate: f64,
}

/// Bounded ring buffer of performance samples.
pub struct PerformanceTracker {
    samples: Mutex<VecDeque<PerformanceSample>>,
    capacity: usize,
}

impl PerformanceTracker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a sample, dropping the oldest once full. O(1) amortized.
    pub fn record(&self, sample: PerformanceSample) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Samples for one operation, or all samples, oldest first.
    #[must_use]
    pub fn query(&self, operation: Option<&str>) -> Vec<PerformanceSample> {
        let samples = self.samples.lock();
        match operation {
            Some(op) => samples.iter().filter(|s| s.operation == op).cloned().collect(),
            None => samples.iter().cloned().collect(),
        }
    }

    /// Aggregates for one operation; zeroed when it has no samples.
    #[must_use]
    pub fn averages(&self, operation: &str) -> OperationAverages {
        let samples = self.samples.lock();
        let matching: Vec<&PerformanceSample> =
            samples.iter().filter(|s| s.operation == operation).collect();

        if matching.is_empty() {
            return OperationAverages::default();
        }

        let count = matching.len();
        let total_duration: u64 = matching.iter().map(|s| s.duration_ms).sum();
        let total_bytes: usize = matching.iter().map(|s| s.payload_bytes).sum();
        let hits = matching.iter().filter(|s| s.cache_hit).count();

        OperationAverages {
            mean_duration_ms: total_duration as f64 / count as f64,
            mean_payload_bytes: total_bytes as f64 / count as f64,
            call_count: count,
            cache_hit_rate: hits as f64 / count as f64,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}
