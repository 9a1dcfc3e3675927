//! Configuration for the hybrid data engine.
//!
//! # Example
//!
//! ```
//! use hybrid_engine::HybridConfig;
//!
//! // Minimal config (uses defaults)
//! let config = HybridConfig::default();
//! assert_eq!(config.max_concurrent_requests, 5);
//! assert_eq!(config.cache_ttl_ms, 5 * 60 * 1000); // 5 minutes
//!
//! // Full config
//! let config = HybridConfig {
//!     cache_max_entries: 50,
//!     synthetic_weight: 0.5,
//!     request_timeout_ms: 2_000,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use serde::Deserialize;

use crate::cache::policy::EvictionPolicy;
use crate::engine::types::DataError;

/// Configuration for the hybrid data engine.
///
/// All fields have sensible defaults. Invalid values are rejected by
/// [`HybridConfig::validate`] before they ever reach a fetch path.
#[derive(Debug, Clone, Deserialize)]
pub struct HybridConfig {
    /// Maximum number of cached responses (default: 200)
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Default cache TTL in milliseconds (default: 5 minutes)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Eviction policy used when the cache is full
    #[serde(default)]
    pub eviction: EvictionPolicy,

    /// Score weight for real-source records, 0.0..=1.0 (default: 1.0)
    #[serde(default = "default_real_weight")]
    pub real_weight: f64,

    /// Score weight for synthetic-source records, 0.0..=1.0 (default: 0.7)
    #[serde(default = "default_synthetic_weight")]
    pub synthetic_weight: f64,

    /// Whether the fallback chain runs when the real source fails
    #[serde(default = "default_fallback_enabled")]
    pub fallback_enabled: bool,

    /// Maximum concurrent throttled sub-fetches, system-wide (default: 5)
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Per-sub-fetch timeout in milliseconds (default: 10 s)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Base delay for retry backoff in milliseconds (default: 1 s)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Maximum retry attempts for the retry-backoff strategy (default: 3)
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Capacity of the performance sample ring buffer (default: 1000)
    #[serde(default = "default_metrics_buffer_size")]
    pub metrics_buffer_size: usize,

    /// Interval of the background expiry sweep in milliseconds (default: 60 s)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Namespace prefix for cache and snapshot keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_cache_max_entries() -> usize { 200 }
fn default_cache_ttl_ms() -> u64 { 5 * 60 * 1000 }
fn default_real_weight() -> f64 { 1.0 }
fn default_synthetic_weight() -> f64 { 0.7 }
fn default_fallback_enabled() -> bool { true }
fn default_max_concurrent_requests() -> usize { 5 }
fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_retry_base_delay_ms() -> u64 { 1_000 }
fn default_retry_max_attempts() -> u32 { 3 }
fn default_metrics_buffer_size() -> usize { 1000 }
fn default_sweep_interval_ms() -> u64 { 60_000 }
fn default_key_prefix() -> String { "hybrid:".to_string() }

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_ms: default_cache_ttl_ms(),
            eviction: EvictionPolicy::default(),
            real_weight: default_real_weight(),
            synthetic_weight: default_synthetic_weight(),
            fallback_enabled: default_fallback_enabled(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            metrics_buffer_size: default_metrics_buffer_size(),
            sweep_interval_ms: default_sweep_interval_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl HybridConfig {
    /// Validate the configuration, failing fast on values that would
    /// otherwise surface as confusing behavior mid-fetch.
    pub fn validate(&self) -> Result<(), DataError> {
        if !(0.0..=1.0).contains(&self.real_weight) {
            return Err(DataError::InvalidConfig(format!(
                "real_weight must be within 0.0..=1.0, got {}",
                self.real_weight
            )));
        }
        if !(0.0..=1.0).contains(&self.synthetic_weight) {
            return Err(DataError::InvalidConfig(format!(
                "synthetic_weight must be within 0.0..=1.0, got {}",
                self.synthetic_weight
            )));
        }
        if self.cache_ttl_ms == 0 {
            return Err(DataError::InvalidConfig("cache_ttl_ms must be positive".into()));
        }
        if self.cache_max_entries == 0 {
            return Err(DataError::InvalidConfig("cache_max_entries must be positive".into()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(DataError::InvalidConfig(
                "max_concurrent_requests must be positive".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(DataError::InvalidConfig("request_timeout_ms must be positive".into()));
        }
        if self.retry_max_attempts == 0 {
            return Err(DataError::InvalidConfig("retry_max_attempts must be positive".into()));
        }
        if self.metrics_buffer_size == 0 {
            return Err(DataError::InvalidConfig("metrics_buffer_size must be positive".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(DataError::InvalidConfig("sweep_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

/// A partial configuration update.
///
/// Unset fields keep the running value. The patched result is validated
/// as a whole before it is applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigPatch {
    pub cache_max_entries: Option<usize>,
    pub cache_ttl_ms: Option<u64>,
    pub eviction: Option<EvictionPolicy>,
    pub real_weight: Option<f64>,
    pub synthetic_weight: Option<f64>,
    pub fallback_enabled: Option<bool>,
    pub max_concurrent_requests: Option<usize>,
    pub request_timeout_ms: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub metrics_buffer_size: Option<usize>,
    pub sweep_interval_ms: Option<u64>,
    pub key_prefix: Option<String>,
}

impl ConfigPatch {
    /// Apply this patch on top of `base`, producing the candidate config.
    #[must_use]
    pub fn apply(&self, base: &HybridConfig) -> HybridConfig {
        HybridConfig {
            cache_max_entries: self.cache_max_entries.unwrap_or(base.cache_max_entries),
            cache_ttl_ms: self.cache_ttl_ms.unwrap_or(base.cache_ttl_ms),
            eviction: self.eviction.unwrap_or(base.eviction),
            real_weight: self.real_weight.unwrap_or(base.real_weight),
            synthetic_weight: self.synthetic_weight.unwrap_or(base.synthetic_weight),
            fallback_enabled: self.fallback_enabled.unwrap_or(base.fallback_enabled),
            max_concurrent_requests: self
                .max_concurrent_requests
                .unwrap_or(base.max_concurrent_requests),
            request_timeout_ms: self.request_timeout_ms.unwrap_or(base.request_timeout_ms),
            retry_base_delay_ms: self.retry_base_delay_ms.unwrap_or(base.retry_base_delay_ms),
            retry_max_attempts: self.retry_max_attempts.unwrap_or(base.retry_max_attempts),
            metrics_buffer_size: self.metrics_buffer_size.unwrap_or(base.metrics_buffer_size),
            sweep_interval_ms: self.sweep_interval_ms.unwrap_or(base.sweep_interval_ms),
            key_prefix: self.key_prefix.clone().unwrap_or_else(|| base.key_prefix.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(HybridConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_weights() {
        let config = HybridConfig {
            synthetic_weight: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HybridConfig {
            real_weight: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_ttl_and_capacity() {
        let config = HybridConfig {
            cache_ttl_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HybridConfig {
            cache_max_entries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency_and_timeout() {
        let config = HybridConfig {
            max_concurrent_requests: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HybridConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_patch_keeps_unset_fields() {
        let base = HybridConfig::default();
        let patch = ConfigPatch {
            cache_max_entries: Some(10),
            synthetic_weight: Some(0.3),
            ..Default::default()
        };

        let next = patch.apply(&base);

        assert_eq!(next.cache_max_entries, 10);
        assert_eq!(next.synthetic_weight, 0.3);
        assert_eq!(next.cache_ttl_ms, base.cache_ttl_ms);
        assert_eq!(next.key_prefix, base.key_prefix);
    }

    #[test]
    fn test_patched_config_still_validated() {
        let base = HybridConfig::default();
        let patch = ConfigPatch {
            real_weight: Some(2.0),
            ..Default::default()
        };

        assert!(patch.apply(&base).validate().is_err());
    }

    #[test]
    fn test_deserialize_with_partial_fields() {
        let config: HybridConfig =
            serde_json::from_str(r#"{"cache_max_entries": 42, "eviction": "fifo"}"#).unwrap();

        assert_eq!(config.cache_max_entries, 42);
        assert_eq!(config.eviction, EvictionPolicy::Fifo);
        assert_eq!(config.request_timeout_ms, 10_000);
    }
}
