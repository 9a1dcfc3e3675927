//! # Hybrid Engine
//!
//! A resilient hybrid data access layer: leaderboard, achievement,
//! challenge, and user-stats queries served by merging an authoritative
//! ("real") source with a synthetic fallback source.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     HybridEngine (facade)                   │
//! │  • leaderboard / achievements / challenges / user_stats     │
//! │  • deterministic cache keys, config updates, diagnostics    │
//! └─────────────────────────────────────────────────────────────┘
//!                │ hit                         │ miss
//!                ▼                             ▼
//! ┌──────────────────────────┐   ┌─────────────────────────────┐
//! │     TtlCache             │   │     RequestThrottle         │
//! │  • TTL expiry            │   │  • bounded concurrency      │
//! │  • LRU/FIFO/TTL eviction │   │  • FIFO wait queue          │
//! │  • snapshot persistence  │   └─────────────────────────────┘
//! └──────────────────────────┘                │
//!                                (real + synthetic, concurrent)
//!                                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Hybrid merge                           │
//! │  • adapters normalize rows at the source boundary           │
//! │  • first-seen dedup (real before synthetic)                 │
//! │  • weighted sort, truncation, data-quality ratio            │
//! └─────────────────────────────────────────────────────────────┘
//!                                             │ on failure
//!                                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     FallbackEngine                          │
//! │  • cached data → synthetic data → retry → default state     │
//! │  • typed severity classification, bounded error ledger      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hybrid_engine::{HybridEngine, HybridConfig, EngineOptions, RealSource, Timeframe};
//!
//! # async fn example(backend: Arc<dyn RealSource>) -> Result<(), hybrid_engine::DataError> {
//! let engine = HybridEngine::new(HybridConfig::default(), backend, EngineOptions::default())?;
//! engine.start(); // snapshot load + background expiry sweep
//!
//! let board = engine.leaderboard(10, Timeframe::Week, None).await?;
//! println!("{} entries, quality {}", board.entries.len(), board.meta.quality);
//!
//! engine.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: the [`HybridEngine`] facade and its response types
//! - [`cache`]: TTL cache, eviction policies, memoizer, snapshot sinks
//! - [`sources`]: the [`RealSource`] trait, synthetic source, row adapters
//! - [`merge`]: deduplicating weighted merge and data quality
//! - [`throttle`]: bounded-concurrency FIFO gate
//! - [`resilience`]: retry with backoff, fallback chains, error ledger
//! - [`perf`]: queryable ring buffer of performance samples
//! - [`metrics`]: ambient `metrics`-crate emitters

pub mod cache;
pub mod config;
pub mod engine;
pub mod merge;
pub mod metrics;
pub mod perf;
pub mod record;
pub mod resilience;
pub mod sources;
pub mod throttle;

pub use cache::memo::Memoizer;
pub use cache::policy::EvictionPolicy;
pub use cache::snapshot::{FileSnapshotSink, MemorySnapshotSink, SnapshotSink};
pub use cache::{CacheStats, TtlCache};
pub use config::{ConfigPatch, HybridConfig};
pub use engine::{
    AchievementsView, ChallengesView, DataError, EngineOptions, HybridEngine, LeaderboardView,
    Operation, ResponseMeta, UserStatsView,
};
pub use merge::{DataQuality, SourceWeights};
pub use perf::{OperationAverages, PerformanceSample, PerformanceTracker};
pub use record::{CachedPayload, DataSource, MergedRecord, Timeframe, UserStatsSnapshot};
pub use resilience::{
    ErrorReport, FallbackChains, FallbackEngine, FallbackStrategy, Notifier, NoopNotifier,
    StrategyKind,
};
pub use sources::{RealSource, SourceError, SourceQuery, SyntheticSource};
pub use throttle::RequestThrottle;
