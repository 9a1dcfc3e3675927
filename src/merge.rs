// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merging real and synthetic record sets.
//!
//! Real records are concatenated ahead of synthetic ones, so on an identity
//! collision the genuine record wins (first-seen dedup). Scores are
//! multiplied by the per-source weight *before* the descending sort; this
//! matches the backing product's ranking even though the weighted value does
//! not correspond to any single raw metric. Ties break by identity ascending
//! so results are deterministic.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::record::{DataSource, MergedRecord};

/// Per-source score multipliers, each in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SourceWeights {
    pub real: f64,
    pub synthetic: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            real: 1.0,
            synthetic: 0.7,
        }
    }
}

impl SourceWeights {
    #[must_use]
    pub fn for_source(&self, source: DataSource) -> f64 {
        match source {
            DataSource::Real => self.real,
            DataSource::Synthetic => self.synthetic,
            DataSource::Merged => 1.0,
        }
    }
}

/// Heuristic share of real-sourced records in a merged result.
///
/// Informational only; exposed to callers, never used internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl DataQuality {
    /// Classify from the real/total ratio.
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 0.7 {
            Self::Excellent
        } else if ratio > 0.4 {
            Self::Good
        } else if ratio > 0.1 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

impl std::fmt::Display for DataQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A merged, ordered, truncated result set.
#[derive(Debug, Clone)]
pub struct MergedSet {
    pub records: Vec<MergedRecord>,
    pub real_count: usize,
    pub synthetic_count: usize,
    pub quality: DataQuality,
}

/// Classify the quality of an already-merged record slice.
#[must_use]
pub fn quality_of(records: &[MergedRecord]) -> DataQuality {
    if records.is_empty() {
        return DataQuality::Poor;
    }
    let real = records
        .iter()
        .filter(|r| r.data_source == DataSource::Real)
        .count();
    DataQuality::from_ratio(real as f64 / records.len() as f64)
}

/// Merge two normalized record lists into one ordered set of at most `limit`.
#[must_use]
pub fn merge(
    real: Vec<MergedRecord>,
    synthetic: Vec<MergedRecord>,
    weights: &SourceWeights,
    limit: usize,
) -> MergedSet {
    let mut seen: HashSet<String> = HashSet::with_capacity(real.len() + synthetic.len());
    let mut records: Vec<MergedRecord> = Vec::with_capacity(real.len() + synthetic.len());

    for mut record in real.into_iter().chain(synthetic) {
        if !seen.insert(record.id.clone()) {
            continue;
        }
        record.score *= weights.for_source(record.data_source);
        records.push(record);
    }

    records.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    records.truncate(limit);

    let real_count = records
        .iter()
        .filter(|r| r.data_source == DataSource::Real)
        .count();
    let synthetic_count = records.len() - real_count;
    let quality = quality_of(&records);

    MergedSet {
        records,
        real_count,
        synthetic_count,
        quality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, score: f64, source: DataSource) -> MergedRecord {
        MergedRecord::new(id.to_string(), format!("name-{}", id), score, source)
    }

    fn ids(set: &MergedSet) -> Vec<&str> {
        set.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_real_wins_identity_collisions() {
        let real = vec![record("u1", 100.0, DataSource::Real)];
        let synthetic = vec![record("u1", 999.0, DataSource::Synthetic)];

        let set = merge(real, synthetic, &SourceWeights { real: 1.0, synthetic: 1.0 }, 10);

        assert_eq!(set.records.len(), 1);
        assert_eq!(set.records[0].data_source, DataSource::Real);
        assert_eq!(set.records[0].score, 100.0);
    }

    #[test]
    fn test_merge_with_itself_is_idempotent() {
        let records: Vec<_> = (0..5)
            .map(|i| record(&format!("u{}", i), i as f64, DataSource::Real))
            .collect();

        let set = merge(records.clone(), records, &SourceWeights::default(), usize::MAX);

        assert_eq!(set.records.len(), 5);
        let mut unique: Vec<_> = set.records.iter().map(|r| &r.id).collect();
        unique.dedup();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_weights_applied_before_sort() {
        let real = vec![record("real-1", 100.0, DataSource::Real)];
        let synthetic = vec![record("synth-1", 150.0, DataSource::Synthetic)];

        // At weight 0.5 the synthetic 150 becomes 75 and loses to the real 100
        let set = merge(
            real,
            synthetic,
            &SourceWeights { real: 1.0, synthetic: 0.5 },
            10,
        );

        assert_eq!(ids(&set), vec!["real-1", "synth-1"]);
        assert_eq!(set.records[1].score, 75.0);
    }

    #[test]
    fn test_ties_break_by_identity_ascending() {
        let real = vec![
            record("b", 50.0, DataSource::Real),
            record("a", 50.0, DataSource::Real),
            record("c", 50.0, DataSource::Real),
        ];

        let set = merge(real, vec![], &SourceWeights::default(), 10);

        assert_eq!(ids(&set), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_truncates_to_limit() {
        let real: Vec<_> = (0..20)
            .map(|i| record(&format!("u{:02}", i), i as f64, DataSource::Real))
            .collect();

        let set = merge(real, vec![], &SourceWeights::default(), 5);

        assert_eq!(set.records.len(), 5);
        // Highest scores survive
        assert_eq!(set.records[0].id, "u19");
    }

    #[test]
    fn test_empty_real_yields_synthetic_only_poor_quality() {
        let synthetic: Vec<_> = (0..8)
            .map(|i| record(&format!("s{}", i), i as f64, DataSource::Synthetic))
            .collect();

        let set = merge(vec![], synthetic, &SourceWeights::default(), 5);

        assert!(set.records.len() <= 5);
        assert!(set.records.iter().all(|r| r.data_source == DataSource::Synthetic));
        assert_eq!(set.real_count, 0);
        assert_eq!(set.quality, DataQuality::Poor);
    }

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(DataQuality::from_ratio(0.9), DataQuality::Excellent);
        assert_eq!(DataQuality::from_ratio(0.7), DataQuality::Good);
        assert_eq!(DataQuality::from_ratio(0.5), DataQuality::Good);
        assert_eq!(DataQuality::from_ratio(0.4), DataQuality::Fair);
        assert_eq!(DataQuality::from_ratio(0.2), DataQuality::Fair);
        assert_eq!(DataQuality::from_ratio(0.1), DataQuality::Poor);
        assert_eq!(DataQuality::from_ratio(0.0), DataQuality::Poor);
    }

    #[test]
    fn test_quality_counts_returned_set_only() {
        // 3 real + 1 synthetic in the top 4 of a larger pool
        let real: Vec<_> = (0..3)
            .map(|i| record(&format!("r{}", i), 100.0 + i as f64, DataSource::Real))
            .collect();
        let synthetic: Vec<_> = (0..10)
            .map(|i| record(&format!("s{}", i), 50.0 + i as f64, DataSource::Synthetic))
            .collect();

        let set = merge(real, synthetic, &SourceWeights { real: 1.0, synthetic: 1.0 }, 4);

        assert_eq!(set.real_count, 3);
        assert_eq!(set.synthetic_count, 1);
        assert_eq!(set.quality, DataQuality::Excellent);
    }

    #[test]
    fn test_empty_inputs_are_poor_and_empty() {
        let set = merge(vec![], vec![], &SourceWeights::default(), 5);

        assert!(set.records.is_empty());
        assert_eq!(set.quality, DataQuality::Poor);
    }
}
