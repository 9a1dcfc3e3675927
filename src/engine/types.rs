//! Public types for the hybrid engine facade.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::merge::DataQuality;
use crate::record::{DataSource, MergedRecord, UserStatsSnapshot};
use crate::resilience::StrategyKind;

/// The logical operations the facade serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Leaderboard,
    Achievements,
    Challenges,
    UserStats,
}

impl Operation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leaderboard => "leaderboard",
            Self::Achievements => "achievements",
            Self::Challenges => "challenges",
            Self::UserStats => "user_stats",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced past the facade boundary.
///
/// Raw source errors never escape; they are either recovered by the
/// fallback chain or collapsed into `Unavailable`, which is explicitly
/// distinct from a successful-but-empty result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("no data available for {operation}")]
    Unavailable { operation: Operation },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// How a response was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    /// Served straight from the cache
    pub cache_hit: bool,
    /// The fallback chain supplied the data
    pub fallback_used: bool,
    /// Which strategy recovered the call, when `fallback_used`
    pub strategy: Option<StrategyKind>,
    /// Share of real-sourced records in the result
    pub quality: DataQuality,
    pub duration_ms: u64,
    pub real_count: usize,
    pub synthetic_count: usize,
}

/// Leaderboard response.
#[derive(Debug, Clone)]
pub struct LeaderboardView {
    pub entries: Vec<MergedRecord>,
    pub meta: ResponseMeta,
}

/// Achievements response.
#[derive(Debug, Clone)]
pub struct AchievementsView {
    pub achievements: Vec<MergedRecord>,
    pub meta: ResponseMeta,
}

/// Challenges response.
#[derive(Debug, Clone)]
pub struct ChallengesView {
    pub challenges: Vec<MergedRecord>,
    pub meta: ResponseMeta,
}

/// User statistics response.
#[derive(Debug, Clone)]
pub struct UserStatsView {
    pub stats: UserStatsSnapshot,
    /// Whether the real source knows this user
    pub is_real_user: bool,
    pub data_source: DataSource,
    pub meta: ResponseMeta,
}
