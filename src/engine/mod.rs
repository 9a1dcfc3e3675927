// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Hybrid engine facade.
//!
//! The [`HybridEngine`] is the only interface the rendering layer consumes.
//! It wires the cache, throttle, merger, fallback chain, and performance
//! tracker together around an injected [`RealSource`].
//!
//! # Flow
//!
//! ```text
//! call → cache lookup ── hit ──→ return (cache-hit sample)
//!          │ miss
//!          ▼
//!   throttle-gated concurrent fetch (real + synthetic, each with timeout)
//!          │
//!          ├─ real ok        → merge (partial if synthetic failed) → cache → return
//!          ├─ real failed    → fallback chain (cached / synthetic / retry / ...)
//!          │                    └─ chain dry → synthetic-only merge if reachable
//!          └─ both failed,
//!             chain dry      → DataError::Unavailable
//! ```
//!
//! The engine is an explicit constructed instance: callers inject the real
//! source and receive the engine by value, there is no global singleton.

pub mod types;

pub use types::{
    AchievementsView, ChallengesView, DataError, LeaderboardView, Operation, ResponseMeta,
    UserStatsView,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::snapshot::SnapshotSink;
use crate::cache::{CacheStats, TtlCache};
use crate::config::{ConfigPatch, HybridConfig};
use crate::merge::{self, DataQuality, MergedSet, SourceWeights};
use crate::perf::{OperationAverages, PerformanceSample, PerformanceTracker};
use crate::record::{CachedPayload, DataSource, MergedRecord, Timeframe, UserStatsSnapshot};
use crate::resilience::{
    ErrorReport, FallbackChains, FallbackEngine, FallbackRequest, Notifier, NoopNotifier,
    StrategyKind,
};
use crate::sources::adapt;
use crate::sources::{RealSource, SourceError, SourceQuery, SyntheticSource};
use crate::throttle::RequestThrottle;

/// Optional collaborators injected at construction.
#[derive(Default)]
pub struct EngineOptions {
    /// Durable sink for cache snapshots (none = non-persistent cache)
    pub snapshot: Option<Arc<dyn SnapshotSink>>,
    /// Notification delivery for the notify-user strategy
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Recovery chains; defaults to [`FallbackChains::defaults`]
    pub chains: Option<FallbackChains>,
    /// Synthetic source override (tests toggle its availability)
    pub synthetic: Option<Arc<SyntheticSource>>,
}

/// Both sides of one throttled concurrent fetch, already normalized.
struct DualFetch {
    real: Result<Vec<MergedRecord>, SourceError>,
    synthetic: Result<Vec<MergedRecord>, SourceError>,
}

/// The per-domain data access facade.
pub struct HybridEngine {
    config: Arc<RwLock<HybridConfig>>,
    cache: Arc<TtlCache>,
    /// Rebuilt when `max_concurrent_requests` changes; queued callers
    /// finish under the gate they joined.
    throttle: RwLock<Arc<RequestThrottle>>,
    fallback: Arc<FallbackEngine>,
    perf: Arc<PerformanceTracker>,
    real: Arc<dyn RealSource>,
    synthetic: Arc<SyntheticSource>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl HybridEngine {
    /// Create an engine. Fails fast on invalid configuration.
    pub fn new(
        config: HybridConfig,
        real: Arc<dyn RealSource>,
        options: EngineOptions,
    ) -> Result<Self, DataError> {
        config.validate()?;

        let cfg = config.clone();
        let config = Arc::new(RwLock::new(config));
        let ttl = Duration::from_millis(cfg.cache_ttl_ms);
        let cache = Arc::new(match options.snapshot {
            Some(sink) => TtlCache::with_snapshot(cfg.cache_max_entries, ttl, cfg.eviction, sink),
            None => TtlCache::new(cfg.cache_max_entries, ttl, cfg.eviction),
        });
        let synthetic = options
            .synthetic
            .unwrap_or_else(|| Arc::new(SyntheticSource::new()));
        let notifier = options
            .notifier
            .unwrap_or_else(|| Arc::new(NoopNotifier) as Arc<dyn Notifier>);
        let chains = options.chains.unwrap_or_else(FallbackChains::defaults);
        let fallback = Arc::new(FallbackEngine::new(
            chains,
            cache.clone(),
            synthetic.clone(),
            notifier,
            config.clone(),
        ));

        Ok(Self {
            cache,
            throttle: RwLock::new(Arc::new(RequestThrottle::new(cfg.max_concurrent_requests))),
            fallback,
            perf: Arc::new(PerformanceTracker::new(cfg.metrics_buffer_size)),
            real,
            synthetic,
            sweeper: Mutex::new(None),
            config,
        })
    }

    /// Load the cache snapshot and start the background expiry sweep.
    ///
    /// Must run inside a tokio runtime.
    pub fn start(&self) {
        self.cache.load_snapshot();

        let cache = self.cache.clone();
        let interval_ms = self.config.read().sweep_interval_ms;

        let mut sweeper = self.sweeper.lock();
        if let Some(handle) = sweeper.take() {
            handle.abort();
        }
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.sweep_expired();
            }
        }));

        info!(sweep_interval_ms = interval_ms, "Hybrid engine started");
    }

    /// Stop the background sweep.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        info!("Hybrid engine stopped");
    }

    // --- Facade operations ---

    /// Leaderboard entries for a timeframe, merged and ranked.
    #[tracing::instrument(skip(self))]
    pub async fn leaderboard(
        &self,
        limit: usize,
        timeframe: Timeframe,
        user_id: Option<&str>,
    ) -> Result<LeaderboardView, DataError> {
        let query = SourceQuery::Leaderboard {
            limit,
            timeframe,
            user_id: user_id.map(String::from),
        };
        let suffix = format!("{}:{}:{}", limit, timeframe, user_id.unwrap_or("-"));

        let (entries, meta) = self
            .fetch_records(
                Operation::Leaderboard,
                &suffix,
                "last-good",
                user_id,
                &query,
                adapt::leaderboard_row,
                limit,
                true,
            )
            .await?;
        Ok(LeaderboardView { entries, meta })
    }

    /// A user's achievements, real and synthetic merged.
    #[tracing::instrument(skip(self))]
    pub async fn achievements(&self, user_id: &str) -> Result<AchievementsView, DataError> {
        let query = SourceQuery::Achievements {
            user_id: user_id.to_string(),
        };
        let recovery = format!("last-good:{}", user_id);

        let (achievements, meta) = self
            .fetch_records(
                Operation::Achievements,
                user_id,
                &recovery,
                Some(user_id),
                &query,
                adapt::achievement_row,
                usize::MAX,
                false,
            )
            .await?;
        Ok(AchievementsView { achievements, meta })
    }

    /// Active challenges, optionally featured only.
    #[tracing::instrument(skip(self))]
    pub async fn challenges(
        &self,
        featured_only: bool,
        user_id: Option<&str>,
    ) -> Result<ChallengesView, DataError> {
        let query = SourceQuery::Challenges {
            featured_only,
            user_id: user_id.map(String::from),
        };
        let suffix = format!("{}:{}", featured_only, user_id.unwrap_or("-"));

        let (challenges, meta) = self
            .fetch_records(
                Operation::Challenges,
                &suffix,
                "last-good",
                user_id,
                &query,
                adapt::challenge_row,
                usize::MAX,
                false,
            )
            .await?;
        Ok(ChallengesView { challenges, meta })
    }

    /// A user's statistics, with rank back-filled from the synthetic roster
    /// when the backend has none.
    #[tracing::instrument(skip(self))]
    pub async fn user_stats(&self, user_id: &str) -> Result<UserStatsView, DataError> {
        let operation = Operation::UserStats;
        let start = Instant::now();
        let query = SourceQuery::UserStats {
            user_id: user_id.to_string(),
        };
        let cache_key = self.cache_key(operation, user_id);
        let recovery_key = self.cache_key(operation, &format!("last-good:{}", user_id));

        if let Some(CachedPayload::Stats {
            snapshot,
            is_real_user,
            data_source,
        }) = self.cache.get(&cache_key)
        {
            debug!(operation = %operation, "Cache hit");
            crate::metrics::record_operation(operation.as_str(), "hit");
            let meta = stats_meta(data_source, true, false, None, start);
            self.sample(operation, start, true, snapshot.size_bytes(), Some(user_id));
            return Ok(UserStatsView {
                stats: snapshot,
                is_real_user,
                data_source,
                meta,
            });
        }

        match self.fetch_stats(user_id).await {
            Ok(payload) => {
                self.cache.set(cache_key, payload.clone());
                self.cache.set(recovery_key, payload.clone());
                crate::metrics::record_operation(operation.as_str(), "miss");

                let CachedPayload::Stats {
                    snapshot,
                    is_real_user,
                    data_source,
                } = payload
                else {
                    // fetch_stats only builds stats payloads
                    return Err(DataError::Unavailable { operation });
                };
                let meta = stats_meta(data_source, false, false, None, start);
                self.sample(operation, start, false, snapshot.size_bytes(), Some(user_id));
                Ok(UserStatsView {
                    stats: snapshot,
                    is_real_user,
                    data_source,
                    meta,
                })
            }
            Err(err) => {
                crate::metrics::record_source_error(operation.as_str(), err.kind());

                if self.config.read().fallback_enabled {
                    let q = &query;
                    let outcome = self
                        .fallback
                        .resolve(
                            FallbackRequest {
                                operation,
                                cache_key: &cache_key,
                                recovery_key: &recovery_key,
                                user_id: Some(user_id),
                                query: q,
                            },
                            &err,
                            || async move { self.fetch_stats(user_id).await },
                        )
                        .await;

                    if let Some(CachedPayload::Stats {
                        snapshot,
                        is_real_user,
                        data_source,
                    }) = outcome.data
                    {
                        crate::metrics::record_operation(operation.as_str(), "fallback");
                        let meta = stats_meta(data_source, false, true, outcome.strategy, start);
                        self.sample(operation, start, false, snapshot.size_bytes(), Some(user_id));
                        return Ok(UserStatsView {
                            stats: snapshot,
                            is_real_user,
                            data_source,
                            meta,
                        });
                    }
                }

                // Partial-failure join: the synthetic side alone still beats failing
                if let Ok(CachedPayload::Stats {
                    snapshot,
                    is_real_user,
                    data_source,
                }) = self.synthetic.payload_for(&query)
                {
                    warn!(operation = %operation, error = %err, "Real source failed, serving synthetic stats");
                    crate::metrics::record_operation(operation.as_str(), "degraded");
                    let meta = stats_meta(data_source, false, false, None, start);
                    self.sample(operation, start, false, snapshot.size_bytes(), Some(user_id));
                    return Ok(UserStatsView {
                        stats: snapshot,
                        is_real_user,
                        data_source,
                        meta,
                    });
                }

                error!(operation = %operation, error = %err, "User stats unavailable");
                crate::metrics::record_operation(operation.as_str(), "error");
                Err(DataError::Unavailable { operation })
            }
        }
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Cache cleared");
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> HybridConfig {
        self.config.read().clone()
    }

    /// Apply a partial configuration update.
    ///
    /// The patched config is validated as a whole before anything changes;
    /// an invalid patch leaves the running configuration untouched. A
    /// concurrency change rebuilds the throttle gate (work already queued
    /// finishes under the old gate).
    pub fn update_config(&self, patch: ConfigPatch) -> Result<(), DataError> {
        let current = self.config.read().clone();
        let next = patch.apply(&current);
        next.validate()?;

        if next.max_concurrent_requests != current.max_concurrent_requests {
            *self.throttle.write() = Arc::new(RequestThrottle::new(next.max_concurrent_requests));
        }
        self.cache.reconfigure(
            next.cache_max_entries,
            Duration::from_millis(next.cache_ttl_ms),
            next.eviction,
        );

        info!(
            cache_max_entries = next.cache_max_entries,
            cache_ttl_ms = next.cache_ttl_ms,
            max_concurrent = next.max_concurrent_requests,
            "Configuration updated"
        );
        *self.config.write() = next;
        Ok(())
    }

    // --- Diagnostics ---

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Recorded performance samples, optionally filtered by operation.
    #[must_use]
    pub fn performance(&self, operation: Option<Operation>) -> Vec<PerformanceSample> {
        self.perf.query(operation.map(|op| op.as_str()))
    }

    /// Aggregate performance for one operation.
    #[must_use]
    pub fn averages(&self, operation: Operation) -> OperationAverages {
        self.perf.averages(operation.as_str())
    }

    /// The diagnostic ledger of failures and their recoveries.
    #[must_use]
    pub fn error_reports(&self) -> Vec<ErrorReport> {
        self.fallback.reports()
    }

    /// The synthetic source backing this engine.
    #[must_use]
    pub fn synthetic_source(&self) -> Arc<SyntheticSource> {
        self.synthetic.clone()
    }

    /// Push current cache gauges to the metrics backend.
    pub fn update_gauge_metrics(&self) {
        let stats = self.cache.stats();
        crate::metrics::set_cache_entries(stats.entry_count);
        crate::metrics::set_cache_bytes(stats.size_bytes);
    }

    // --- Internal ---

    #[allow(clippy::too_many_arguments)]
    async fn fetch_records(
        &self,
        operation: Operation,
        key_suffix: &str,
        recovery_suffix: &str,
        user_id: Option<&str>,
        query: &SourceQuery,
        adapter: adapt::RowAdapter,
        limit: usize,
        assign_ranks: bool,
    ) -> Result<(Vec<MergedRecord>, ResponseMeta), DataError> {
        let start = Instant::now();
        let cache_key = self.cache_key(operation, key_suffix);
        let recovery_key = self.cache_key(operation, recovery_suffix);

        if let Some(CachedPayload::Records(records)) = self.cache.get(&cache_key) {
            debug!(operation = %operation, "Cache hit");
            crate::metrics::record_operation(operation.as_str(), "hit");
            let meta = records_meta(&records, true, false, None, start);
            self.sample(operation, start, true, records_size(&records), user_id);
            return Ok((records, meta));
        }

        let fetched = self.dual_fetch(query, adapter).await;

        match fetched.real {
            Ok(real_records) => {
                let synthetic_records = match fetched.synthetic {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(operation = %operation, error = %e, "Synthetic fetch failed, merging real side only");
                        Vec::new()
                    }
                };
                let set = self.finish_merge(real_records, synthetic_records, limit, assign_ranks);

                let payload = CachedPayload::Records(set.records.clone());
                self.cache.set(cache_key, payload.clone());
                self.cache.set(recovery_key, payload);
                crate::metrics::record_operation(operation.as_str(), "miss");

                let meta = ResponseMeta {
                    cache_hit: false,
                    fallback_used: false,
                    strategy: None,
                    quality: set.quality,
                    duration_ms: start.elapsed().as_millis() as u64,
                    real_count: set.real_count,
                    synthetic_count: set.synthetic_count,
                };
                self.sample(operation, start, false, records_size(&set.records), user_id);
                Ok((set.records, meta))
            }

            Err(real_err) => {
                crate::metrics::record_source_error(operation.as_str(), real_err.kind());

                if self.config.read().fallback_enabled {
                    let q = query;
                    let outcome = self
                        .fallback
                        .resolve(
                            FallbackRequest {
                                operation,
                                cache_key: &cache_key,
                                recovery_key: &recovery_key,
                                user_id,
                                query: q,
                            },
                            &real_err,
                            || async move {
                                let fetched = self.dual_fetch(q, adapter).await;
                                let real = fetched.real?;
                                let synthetic = fetched.synthetic.unwrap_or_default();
                                Ok(CachedPayload::Records(
                                    self.finish_merge(real, synthetic, limit, assign_ranks).records,
                                ))
                            },
                        )
                        .await;

                    if let Some(CachedPayload::Records(records)) = outcome.data {
                        crate::metrics::record_operation(operation.as_str(), "fallback");
                        let meta = records_meta(&records, false, true, outcome.strategy, start);
                        self.sample(operation, start, false, records_size(&records), user_id);
                        return Ok((records, meta));
                    }
                }

                // Partial-failure join: never abort the call while one side answered
                if let Ok(synthetic_records) = fetched.synthetic {
                    warn!(operation = %operation, error = %real_err, "Real source failed, serving synthetic-only merge");
                    crate::metrics::record_operation(operation.as_str(), "degraded");
                    let set = self.finish_merge(Vec::new(), synthetic_records, limit, assign_ranks);
                    let meta = records_meta(&set.records, false, false, None, start);
                    self.sample(operation, start, false, records_size(&set.records), user_id);
                    return Ok((set.records, meta));
                }

                error!(operation = %operation, error = %real_err, "Both sources failed and no fallback recovered");
                crate::metrics::record_operation(operation.as_str(), "error");
                Err(DataError::Unavailable { operation })
            }
        }
    }

    /// Issue both sub-fetches together through the shared throttle.
    async fn dual_fetch(&self, query: &SourceQuery, adapter: adapt::RowAdapter) -> DualFetch {
        let timeout = Duration::from_millis(self.config.read().request_timeout_ms);
        let throttle = { self.throttle.read().clone() };

        let real_fut = throttle.run(|| async move {
            match tokio::time::timeout(timeout, self.real_rows(query)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout),
            }
        });
        let synthetic_fut = throttle.run(|| async move { self.synthetic.rows_for(query) });

        let (real_rows, synthetic_rows) = tokio::join!(real_fut, synthetic_fut);

        DualFetch {
            real: real_rows.and_then(|rows| adapt::adapt_rows(DataSource::Real, &rows, adapter)),
            synthetic: synthetic_rows
                .and_then(|rows| adapt::adapt_rows(DataSource::Synthetic, &rows, adapter)),
        }
    }

    async fn real_rows(&self, query: &SourceQuery) -> Result<Vec<Value>, SourceError> {
        match query {
            SourceQuery::Leaderboard {
                limit,
                timeframe,
                user_id,
            } => {
                self.real
                    .leaderboard(*limit, *timeframe, user_id.as_deref())
                    .await
            }
            SourceQuery::Achievements { user_id } => self.real.achievements(user_id).await,
            SourceQuery::Challenges {
                featured_only,
                user_id,
            } => {
                self.real
                    .challenges(*featured_only, user_id.as_deref())
                    .await
            }
            SourceQuery::UserStats { user_id } => {
                Ok(self.real.user_stats(user_id).await?.into_iter().collect())
            }
        }
    }

    /// Dual fetch for user stats; real failure propagates to the fallback path.
    async fn fetch_stats(&self, user_id: &str) -> Result<CachedPayload, SourceError> {
        let timeout = Duration::from_millis(self.config.read().request_timeout_ms);
        let throttle = { self.throttle.read().clone() };

        let real_fut = throttle.run(|| async move {
            match tokio::time::timeout(timeout, self.real.user_stats(user_id)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout),
            }
        });
        let synthetic_fut = throttle.run(|| async move { self.synthetic.stats_for(user_id) });

        let (real_row, synthetic_row) = tokio::join!(real_fut, synthetic_fut);

        match real_row? {
            Some(value) => {
                let mut snapshot = adapt::stats_row(&value).ok_or_else(|| {
                    SourceError::Malformed("user stats row was unusable".into())
                })?;

                let mut data_source = DataSource::Real;
                if snapshot.rank_position.is_none() {
                    if let Some(rank) = synthetic_row
                        .ok()
                        .and_then(|row| adapt::stats_row(&row))
                        .and_then(|stats| stats.rank_position)
                    {
                        snapshot.rank_position = Some(rank);
                        data_source = DataSource::Merged;
                    }
                }

                Ok(CachedPayload::Stats {
                    snapshot,
                    is_real_user: true,
                    data_source,
                })
            }
            // Unknown user: zeroed stats, mirroring the backend's default
            None => Ok(CachedPayload::Stats {
                snapshot: UserStatsSnapshot::default(),
                is_real_user: false,
                data_source: DataSource::Real,
            }),
        }
    }

    fn finish_merge(
        &self,
        real: Vec<MergedRecord>,
        synthetic: Vec<MergedRecord>,
        limit: usize,
        assign_ranks: bool,
    ) -> MergedSet {
        let weights = {
            let config = self.config.read();
            SourceWeights {
                real: config.real_weight,
                synthetic: config.synthetic_weight,
            }
        };

        let mut set = merge::merge(real, synthetic, &weights, limit);
        if assign_ranks {
            for (i, record) in set.records.iter_mut().enumerate() {
                record.rank = Some((i + 1) as u32);
            }
        }
        set
    }

    fn cache_key(&self, operation: Operation, suffix: &str) -> String {
        format!(
            "{}{}:{}",
            self.config.read().key_prefix,
            operation.as_str(),
            suffix
        )
    }

    fn sample(
        &self,
        operation: Operation,
        start: Instant,
        cache_hit: bool,
        payload_bytes: usize,
        user_id: Option<&str>,
    ) {
        let duration = start.elapsed();
        crate::metrics::record_latency(operation.as_str(), duration);
        crate::metrics::record_payload_bytes(operation.as_str(), payload_bytes);
        self.perf.record(
            PerformanceSample::new(
                operation.as_str(),
                duration.as_millis() as u64,
                cache_hit,
                payload_bytes,
            )
            .with_user(user_id),
        );
    }
}

impl Drop for HybridEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

fn records_size(records: &[MergedRecord]) -> usize {
    records.iter().map(MergedRecord::size_bytes).sum()
}

fn records_meta(
    records: &[MergedRecord],
    cache_hit: bool,
    fallback_used: bool,
    strategy: Option<StrategyKind>,
    start: Instant,
) -> ResponseMeta {
    let real_count = records
        .iter()
        .filter(|r| r.data_source == DataSource::Real)
        .count();
    let synthetic_count = records
        .iter()
        .filter(|r| r.data_source == DataSource::Synthetic)
        .count();

    ResponseMeta {
        cache_hit,
        fallback_used,
        strategy,
        quality: merge::quality_of(records),
        duration_ms: start.elapsed().as_millis() as u64,
        real_count,
        synthetic_count,
    }
}

fn stats_meta(
    data_source: DataSource,
    cache_hit: bool,
    fallback_used: bool,
    strategy: Option<StrategyKind>,
    start: Instant,
) -> ResponseMeta {
    let (quality, real_count, synthetic_count) = match data_source {
        DataSource::Real => (DataQuality::Excellent, 1, 0),
        DataSource::Merged => (DataQuality::Good, 1, 1),
        DataSource::Synthetic => (DataQuality::Poor, 0, 1),
    };

    ResponseMeta {
        cache_hit,
        fallback_used,
        strategy,
        quality,
        duration_ms: start.elapsed().as_millis() as u64,
        real_count,
        synthetic_count,
    }
}
