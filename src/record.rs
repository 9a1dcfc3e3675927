//! Canonical record shapes flowing through the hybrid data layer.
//!
//! Raw rows from either source arrive as loosely-shaped JSON and are
//! normalized into [`MergedRecord`] at the source boundary (see
//! [`crate::sources::adapt`]). Everything past that boundary works with this
//! one fixed shape.
//!
//! # Example
//!
//! ```
//! use hybrid_engine::{MergedRecord, DataSource};
//!
//! let record = MergedRecord::new("user-42".into(), "EcoEmma".into(), 4820.0, DataSource::Real);
//!
//! assert_eq!(record.id, "user-42");
//! assert_eq!(record.data_source, DataSource::Real);
//! assert!(record.size_bytes() > 0);
//! ```

use serde::{Deserialize, Serialize};

/// Origin of a record or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// The authoritative backing store
    Real,
    /// The canned/generated stand-in dataset
    Synthetic,
    /// Produced by combining both sources
    Merged,
}

impl DataSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Synthetic => "synthetic",
            Self::Merged => "merged",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Leaderboard aggregation window.
///
/// Mirrors the query vocabulary of the backing API (`1d`, `7d`, `30d`, `all`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    Week,
    Month,
    AllTime,
}

impl Timeframe {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "1d",
            Self::Week => "7d",
            Self::Month => "30d",
            Self::AllTime => "all",
        }
    }

    /// Parse the wire form. Unknown values are `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1d" => Some(Self::Day),
            "7d" => Some(Self::Week),
            "30d" => Some(Self::Month),
            "all" => Some(Self::AllTime),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized record from either source.
///
/// One shape covers leaderboard entries, achievements, and challenges:
/// an identity, a display name, a ranking score, and unlock/progress state.
/// Records are immutable once a merge result has been produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    /// Identity, unique within one merged result set
    pub id: String,
    /// Display name (user, achievement title, challenge title)
    pub name: String,
    /// Ranking score; reweighted by source weight before sorting
    pub score: f64,
    /// Position after ranking (assigned post-sort for leaderboards)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    /// Whether the record is unlocked/active for the requesting user
    pub unlocked: bool,
    /// Completion progress in 0.0..=1.0
    pub progress: f64,
    /// Which source produced this record
    pub data_source: DataSource,
    /// Last update timestamp (epoch millis)
    pub last_updated: i64,
}

impl MergedRecord {
    /// Create a record with neutral unlock/progress state.
    #[must_use]
    pub fn new(id: String, name: String, score: f64, data_source: DataSource) -> Self {
        Self {
            id,
            name,
            score,
            rank: None,
            unlocked: false,
            progress: 0.0,
            data_source,
            last_updated: epoch_ms() as i64,
        }
    }

    /// Approximate in-memory size, used for cache accounting.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.id.len() + self.name.len()
    }
}

/// Aggregate statistics for a single user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStatsSnapshot {
    pub total_items_sorted: u64,
    pub total_co2_saved: f64,
    pub total_points: u64,
    pub rank_position: Option<u32>,
    pub streak_days: u32,
    pub achievement_count: u32,
}

impl UserStatsSnapshot {
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

/// The opaque value stored in the cache.
///
/// Record sets keep their per-record source tags so data quality can be
/// recomputed on a cache hit without refetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedPayload {
    /// A merged, ordered record set (leaderboard, achievements, challenges)
    Records(Vec<MergedRecord>),
    /// A single user's statistics
    Stats {
        snapshot: UserStatsSnapshot,
        is_real_user: bool,
        data_source: DataSource,
    },
}

impl CachedPayload {
    /// Approximate in-memory size, used for cache accounting.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Records(records) => {
                std::mem::size_of::<Self>() + records.iter().map(MergedRecord::size_bytes).sum::<usize>()
            }
            Self::Stats { snapshot, .. } => std::mem::size_of::<Self>() + snapshot.size_bytes(),
        }
    }

    /// Number of records carried (1 for stats payloads).
    #[must_use]
    pub fn record_count(&self) -> usize {
        match self {
            Self::Records(records) => records.len(),
            Self::Stats { .. } => 1,
        }
    }
}

/// Current time as epoch millis.
pub(crate) fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = MergedRecord::new("id-1".into(), "Alice".into(), 100.0, DataSource::Real);

        assert_eq!(record.id, "id-1");
        assert_eq!(record.score, 100.0);
        assert!(record.rank.is_none());
        assert!(!record.unlocked);
        assert_eq!(record.progress, 0.0);
        assert!(record.last_updated > 0);
    }

    #[test]
    fn test_size_bytes_includes_strings() {
        let short = MergedRecord::new("a".into(), "b".into(), 0.0, DataSource::Synthetic);
        let long = MergedRecord::new(
            "a-much-longer-identity-value".into(),
            "a much longer display name".into(),
            0.0,
            DataSource::Synthetic,
        );

        assert!(long.size_bytes() > short.size_bytes());
        assert!(short.size_bytes() > std::mem::size_of::<MergedRecord>());
    }

    #[test]
    fn test_timeframe_round_trip() {
        for tf in [Timeframe::Day, Timeframe::Week, Timeframe::Month, Timeframe::AllTime] {
            assert_eq!(Timeframe::parse(tf.as_str()), Some(tf));
        }
        assert_eq!(Timeframe::parse("2w"), None);
    }

    #[test]
    fn test_data_source_display() {
        assert_eq!(format!("{}", DataSource::Real), "real");
        assert_eq!(format!("{}", DataSource::Synthetic), "synthetic");
        assert_eq!(format!("{}", DataSource::Merged), "merged");
    }

    #[test]
    fn test_payload_serialize_round_trip() {
        let payload = CachedPayload::Records(vec![MergedRecord::new(
            "id-1".into(),
            "Alice".into(),
            42.0,
            DataSource::Merged,
        )]);

        let json = serde_json::to_string(&payload).unwrap();
        let back: CachedPayload = serde_json::from_str(&json).unwrap();

        assert_eq!(back, payload);
    }

    #[test]
    fn test_payload_record_count() {
        let records = CachedPayload::Records(vec![
            MergedRecord::new("a".into(), "A".into(), 1.0, DataSource::Real),
            MergedRecord::new("b".into(), "B".into(), 2.0, DataSource::Real),
        ]);
        assert_eq!(records.record_count(), 2);

        let stats = CachedPayload::Stats {
            snapshot: UserStatsSnapshot::default(),
            is_real_user: false,
            data_source: DataSource::Synthetic,
        };
        assert_eq!(stats.record_count(), 1);
    }

    #[test]
    fn test_stats_snapshot_default_is_zeroed() {
        let stats = UserStatsSnapshot::default();
        assert_eq!(stats.total_points, 0);
        assert_eq!(stats.total_co2_saved, 0.0);
        assert!(stats.rank_position.is_none());
    }
}
