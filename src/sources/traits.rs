use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::record::Timeframe;

/// Error raised by a data source, typed at the origin so severity
/// classification never has to pattern-match on message text.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("unauthorized")]
    Unauthorized,
    #[error("http status {0}")]
    Http(u16),
    #[error("malformed source records: {0}")]
    Malformed(String),
    #[error("source backend error: {0}")]
    Backend(String),
}

impl SourceError {
    /// Stable label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::Unauthorized => "unauthorized",
            Self::Http(_) => "http",
            Self::Malformed(_) => "malformed",
            Self::Backend(_) => "backend",
        }
    }
}

/// One logical query against either source.
///
/// Carried through the fallback chain so recovery strategies can re-run
/// the same query against the synthetic source.
#[derive(Debug, Clone)]
pub enum SourceQuery {
    Leaderboard {
        limit: usize,
        timeframe: Timeframe,
        user_id: Option<String>,
    },
    Achievements {
        user_id: String,
    },
    Challenges {
        featured_only: bool,
        user_id: Option<String>,
    },
    UserStats {
        user_id: String,
    },
}

/// The authoritative backing store.
///
/// Rows come back as raw JSON in whatever naming convention the backend
/// uses; normalization happens in [`crate::sources::adapt`], never here.
#[async_trait]
pub trait RealSource: Send + Sync {
    async fn leaderboard(
        &self,
        limit: usize,
        timeframe: Timeframe,
        user_id: Option<&str>,
    ) -> Result<Vec<Value>, SourceError>;

    async fn achievements(&self, user_id: &str) -> Result<Vec<Value>, SourceError>;

    async fn challenges(
        &self,
        featured_only: bool,
        user_id: Option<&str>,
    ) -> Result<Vec<Value>, SourceError>;

    /// `None` means the user is unknown to the backend (distinct from an error).
    async fn user_stats(&self, user_id: &str) -> Result<Option<Value>, SourceError>;
}
