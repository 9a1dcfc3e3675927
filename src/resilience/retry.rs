// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! The delay for attempt `n` (counting from zero) is `base_delay * 2^n`,
//! capped at `max_delay`.
//!
//! # Example
//!
//! ```
//! use hybrid_engine::resilience::retry::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::from_settings(500, 4);
//! assert_eq!(config.base_delay, Duration::from_millis(500));
//! assert_eq!(config.max_attempts, 4);
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl RetryConfig {
    /// Build from the engine's configuration surface (base delay + attempts).
    #[must_use]
    pub fn from_settings(base_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_secs(30),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            max_attempts: 3,
        }
    }
}

/// Retry `operation` until it succeeds or attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, attempts);
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                if attempts >= config.max_attempts {
                    return Err(err);
                }

                let delay = config
                    .base_delay
                    .saturating_mul(2u32.saturating_pow(attempts - 1))
                    .min(config.max_delay);

                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name, attempts, config.max_attempts, err, delay
                );
                sleep(delay).await;
            }
        }
    }
}
