//! Failure recovery: retry with backoff and the priority-ordered fallback chain.

pub mod fallback;
pub mod retry;

pub use fallback::{
    classify, ErrorReport, FallbackChains, FallbackEngine, FallbackOutcome, FallbackRequest,
    FallbackStrategy, Notifier, NoopNotifier, Severity, SeverityLevel, StrategyKind, UserImpact,
};
pub use retry::RetryConfig;
