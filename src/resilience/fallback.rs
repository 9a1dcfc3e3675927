// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Priority-ordered recovery strategies for failed fetches.
//!
//! Each logical operation carries an ordered chain of strategies, configured
//! at startup and read-only afterwards. On failure the chain runs strictly
//! in ascending priority; the first strategy that produces data wins.
//!
//! Every invocation produces an [`ErrorReport`] kept in a bounded in-memory
//! ledger for diagnostics. Severity is classified from the typed
//! [`SourceError`] kind at the error's origin, never inferred from message
//! text, and only feeds notifications and reports; it does not alter chain
//! order.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::HybridConfig;
use crate::engine::types::Operation;
use crate::record::{epoch_ms, CachedPayload, UserStatsSnapshot, DataSource};
use crate::sources::{SourceError, SourceQuery, SyntheticSource};

use super::retry::{retry_with_backoff, RetryConfig};

/// Number of error reports retained before the oldest are dropped.
const REPORT_CAP: usize = 100;

/// A recovery strategy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Serve a non-expired cache entry for the operation
    CachedData,
    /// Re-run the query against the synthetic source
    SyntheticData,
    /// Serve the operation's statically-defined empty value
    DefaultState,
    /// Re-invoke the original operation with exponential backoff
    RetryBackoff,
    /// Surface a notification and give up gracefully (never supplies data)
    NotifyUser,
}

impl StrategyKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CachedData => "cached-data",
            Self::SyntheticData => "synthetic-data",
            Self::DefaultState => "default-state",
            Self::RetryBackoff => "retry-backoff",
            Self::NotifyUser => "notify-user",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in an operation's recovery chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackStrategy {
    pub kind: StrategyKind,
    /// Lower priority runs first
    pub priority: u32,
    /// Attempt budget (retry-backoff only)
    pub max_attempts: u32,
    /// Time budget for the strategy in milliseconds
    pub timeout_ms: u64,
}

impl FallbackStrategy {
    #[must_use]
    pub fn new(kind: StrategyKind, priority: u32) -> Self {
        Self {
            kind,
            priority,
            max_attempts: 3,
            timeout_ms: 5_000,
        }
    }
}

/// Per-operation recovery chains, sorted by priority at construction.
#[derive(Debug, Clone, Default)]
pub struct FallbackChains {
    chains: HashMap<Operation, Vec<FallbackStrategy>>,
}

impl FallbackChains {
    /// An empty configuration: no operation has any recovery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock configuration: cached data, then synthetic data, then an
    /// empty default for the record-shaped operations; user stats also try
    /// a retry and a notification before giving a zeroed default.
    #[must_use]
    pub fn defaults() -> Self {
        let record_chain = || {
            vec![
                FallbackStrategy::new(StrategyKind::CachedData, 1),
                FallbackStrategy::new(StrategyKind::SyntheticData, 2),
                FallbackStrategy::new(StrategyKind::DefaultState, 3),
            ]
        };

        Self::new()
            .with_chain(Operation::Leaderboard, record_chain())
            .with_chain(Operation::Achievements, record_chain())
            .with_chain(Operation::Challenges, record_chain())
            .with_chain(
                Operation::UserStats,
                vec![
                    FallbackStrategy::new(StrategyKind::CachedData, 1),
                    FallbackStrategy::new(StrategyKind::RetryBackoff, 2),
                    FallbackStrategy::new(StrategyKind::SyntheticData, 3),
                    FallbackStrategy::new(StrategyKind::NotifyUser, 4),
                    FallbackStrategy::new(StrategyKind::DefaultState, 5),
                ],
            )
    }

    /// Install a chain for an operation. Strategies are sorted by priority,
    /// so declaration order does not matter.
    #[must_use]
    pub fn with_chain(mut self, operation: Operation, mut strategies: Vec<FallbackStrategy>) -> Self {
        strategies.sort_by_key(|s| s.priority);
        self.chains.insert(operation, strategies);
        self
    }

    #[must_use]
    pub fn get(&self, operation: Operation) -> Option<&[FallbackStrategy]> {
        self.chains.get(&operation).map(Vec::as_slice)
    }
}

/// How bad an error is, for logging and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// How much the failure is likely to affect the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserImpact {
    Minor,
    Moderate,
    Severe,
}

/// Error severity with a suggested recovery action.
#[derive(Debug, Clone, Serialize)]
pub struct Severity {
    pub level: SeverityLevel,
    pub user_impact: UserImpact,
    pub recovery_action: &'static str,
}

/// Classify a source error. Closed over the typed error kind.
#[must_use]
pub fn classify(error: &SourceError) -> Severity {
    match error {
        SourceError::Network(_) | SourceError::Timeout => Severity {
            level: SeverityLevel::Medium,
            user_impact: UserImpact::Moderate,
            recovery_action: "serve cached or synthetic data and retry",
        },
        SourceError::Unauthorized | SourceError::Http(401) | SourceError::Http(403) => Severity {
            level: SeverityLevel::High,
            user_impact: UserImpact::Severe,
            recovery_action: "re-authenticate",
        },
        SourceError::Http(status) if *status >= 500 => Severity {
            level: SeverityLevel::High,
            user_impact: UserImpact::Moderate,
            recovery_action: "fall back to synthetic data",
        },
        SourceError::Backend(_) => Severity {
            level: SeverityLevel::High,
            user_impact: UserImpact::Moderate,
            recovery_action: "fall back to synthetic data",
        },
        SourceError::Malformed(_) => Severity {
            level: SeverityLevel::Medium,
            user_impact: UserImpact::Minor,
            recovery_action: "serve the default state",
        },
        SourceError::Http(_) => Severity {
            level: SeverityLevel::Medium,
            user_impact: UserImpact::Minor,
            recovery_action: "retry later",
        },
    }
}

/// Outbound notification capability (toast delivery lives outside this crate).
pub trait Notifier: Send + Sync {
    fn notify(&self, operation: Operation, severity: &Severity, message: &str);
}

/// Default notifier: logs and does nothing else.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, operation: Operation, severity: &Severity, message: &str) {
        debug!(operation = %operation, level = %severity.level, message, "Notification suppressed (noop notifier)");
    }
}

/// Diagnostic record of one failure and its recovery.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub id: Uuid,
    pub error: String,
    pub component: &'static str,
    pub operation: Operation,
    pub user_id: Option<String>,
    pub timestamp_ms: u64,
    pub severity: Severity,
    pub chosen_strategy: Option<StrategyKind>,
    pub resolved: bool,
    pub resolved_at_ms: Option<u64>,
}

/// Context for one fallback resolution.
pub struct FallbackRequest<'a> {
    pub operation: Operation,
    /// The exact key the failed call would have written
    pub cache_key: &'a str,
    /// The operation-level last-known-good key
    pub recovery_key: &'a str,
    pub user_id: Option<&'a str>,
    pub query: &'a SourceQuery,
}

/// Result of running the chain.
#[derive(Debug)]
pub struct FallbackOutcome {
    pub success: bool,
    pub data: Option<CachedPayload>,
    pub strategy: Option<StrategyKind>,
    pub report_id: Uuid,
}

/// Executes recovery chains and keeps the error ledger.
pub struct FallbackEngine {
    chains: FallbackChains,
    cache: Arc<TtlCache>,
    synthetic: Arc<SyntheticSource>,
    notifier: Arc<dyn Notifier>,
    config: Arc<RwLock<HybridConfig>>,
    ledger: Mutex<VecDeque<ErrorReport>>,
}

impl FallbackEngine {
    pub fn new(
        chains: FallbackChains,
        cache: Arc<TtlCache>,
        synthetic: Arc<SyntheticSource>,
        notifier: Arc<dyn Notifier>,
        config: Arc<RwLock<HybridConfig>>,
    ) -> Self {
        Self {
            chains,
            cache,
            synthetic,
            notifier,
            config,
            ledger: Mutex::new(VecDeque::with_capacity(REPORT_CAP)),
        }
    }

    /// Run the chain for `request.operation` against `error`.
    ///
    /// `retry_op` re-invokes the original failing operation; it is only
    /// called by a `RetryBackoff` strategy.
    pub async fn resolve<F, Fut>(
        &self,
        request: FallbackRequest<'_>,
        error: &SourceError,
        mut retry_op: F,
    ) -> FallbackOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CachedPayload, SourceError>>,
    {
        let severity = classify(error);
        let mut report = ErrorReport {
            id: Uuid::new_v4(),
            error: error.to_string(),
            component: "hybrid-engine",
            operation: request.operation,
            user_id: request.user_id.map(String::from),
            timestamp_ms: epoch_ms(),
            severity,
            chosen_strategy: None,
            resolved: false,
            resolved_at_ms: None,
        };

        warn!(
            operation = %request.operation,
            error = %error,
            level = %report.severity.level,
            "Source fetch failed, running fallback chain"
        );

        let strategies = self.chains.get(request.operation).unwrap_or(&[]);
        if strategies.is_empty() {
            debug!(operation = %request.operation, "No fallback chain configured");
        }

        for strategy in strategies {
            let data = self.attempt(strategy, &request, &report, &mut retry_op).await;

            if let Some(payload) = data {
                report.resolved = true;
                report.chosen_strategy = Some(strategy.kind);
                report.resolved_at_ms = Some(epoch_ms());
                info!(
                    operation = %request.operation,
                    strategy = %strategy.kind,
                    "Fallback strategy recovered the operation"
                );
                crate::metrics::record_fallback(request.operation.as_str(), strategy.kind.as_str(), "success");

                let report_id = report.id;
                self.push_report(report);
                return FallbackOutcome {
                    success: true,
                    data: Some(payload),
                    strategy: Some(strategy.kind),
                    report_id,
                };
            }

            crate::metrics::record_fallback(request.operation.as_str(), strategy.kind.as_str(), "failure");
        }

        error!(operation = %request.operation, "All fallback strategies exhausted");
        let report_id = report.id;
        self.push_report(report);
        FallbackOutcome {
            success: false,
            data: None,
            strategy: None,
            report_id,
        }
    }

    async fn attempt<F, Fut>(
        &self,
        strategy: &FallbackStrategy,
        request: &FallbackRequest<'_>,
        report: &ErrorReport,
        retry_op: &mut F,
    ) -> Option<CachedPayload>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CachedPayload, SourceError>>,
    {
        match strategy.kind {
            StrategyKind::CachedData => self
                .cache
                .get(request.cache_key)
                .or_else(|| self.cache.get(request.recovery_key)),

            StrategyKind::SyntheticData => match self.synthetic.payload_for(request.query) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "Synthetic source unavailable during fallback");
                    None
                }
            },

            StrategyKind::DefaultState => Some(default_payload(request.operation)),

            StrategyKind::RetryBackoff => {
                let retry_config = {
                    let config = self.config.read();
                    RetryConfig {
                        base_delay: Duration::from_millis(config.retry_base_delay_ms),
                        max_delay: Duration::from_secs(30),
                        max_attempts: strategy.max_attempts.max(1),
                    }
                };

                let attempt = retry_with_backoff(
                    request.operation.as_str(),
                    &retry_config,
                    &mut *retry_op,
                );
                match tokio::time::timeout(Duration::from_millis(strategy.timeout_ms), attempt).await
                {
                    Ok(Ok(payload)) => Some(payload),
                    Ok(Err(e)) => {
                        debug!(error = %e, "Retry-backoff strategy exhausted its attempts");
                        None
                    }
                    Err(_) => {
                        debug!(timeout_ms = strategy.timeout_ms, "Retry-backoff strategy timed out");
                        None
                    }
                }
            }

            StrategyKind::NotifyUser => {
                let message = format!(
                    "{} is temporarily unavailable: {}",
                    request.operation, report.error
                );
                self.notifier.notify(request.operation, &report.severity, &message);
                None
            }
        }
    }

    /// Snapshot of the report ledger, oldest first.
    #[must_use]
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.ledger.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn report_count(&self) -> usize {
        self.ledger.lock().len()
    }

    fn push_report(&self, report: ErrorReport) {
        let mut ledger = self.ledger.lock();
        if ledger.len() >= REPORT_CAP {
            ledger.pop_front();
        }
        ledger.push_back(report);
    }
}

/// Statically-defined empty value for an operation.
#[must_use]
pub fn default_payload(operation: Operation) -> CachedPayload {
    match operation {
        Operation::Leaderboard | Operation::Achievements | Operation::Challenges => {
            CachedPayload::Records(Vec::new())
        }
        Operation::UserStats => CachedPayload::Stats {
            snapshot: UserStatsSnapshot::default(),
            is_real_user: false,
            data_source: DataSource::Synthetic,
        },
    }
}
