//! Retry decisions with exponential backoff
//!
//! A runner asks [`RetryPolicy::decide`] after every failed attempt. The policy
//! only classifies and computes delays; sleeping and cancellation checks are
//! the runner's job (see [`wait_backoff`]).
//!
//! # Example
//!
//! ```
//! use scrape_engine::config::RetryConfig;
//! use scrape_engine::error::FetchError;
//! use scrape_engine::retry::{RetryDecision, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(RetryConfig::default());
//! let decision = policy.decide(1, 2, FetchError::ConnectFailed("refused".into()));
//! assert_eq!(decision, RetryDecision::RetryAfter(Duration::from_millis(500)));
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused connections, broken responses) return `true`.
/// Cancellation and unclassified failures return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the attempt should be repeated
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::ConnectFailed(_) | FetchError::Protocol(_) => true,
            // A stop request is never retried
            FetchError::Cancelled => false,
            FetchError::Other(_) => false,
        }
    }
}

/// What to do after a failed attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then make another attempt
    RetryAfter(Duration),
    /// Stop trying; the error is final
    GiveUp(FetchError),
}

/// Retry policy shared by all runners of an engine
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from its configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The configuration this policy was built from
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decide whether `attempt` (1-based) should be followed by another one
    ///
    /// A task with `max_retries = N` gets at most `N + 1` attempts.
    pub fn decide(&self, attempt: u32, max_retries: u32, error: FetchError) -> RetryDecision {
        if !error.is_retryable() {
            tracing::debug!(error = %error, attempt, "error is not retryable");
            return RetryDecision::GiveUp(error);
        }
        if attempt > max_retries {
            tracing::debug!(
                error = %error,
                attempts = attempt,
                "retries exhausted"
            );
            return RetryDecision::GiveUp(error);
        }

        let delay = self.delay_for(attempt);
        let delay = if self.config.jitter {
            add_jitter(delay)
        } else {
            delay
        };
        RetryDecision::RetryAfter(delay)
    }

    /// Backoff after `attempt` (1-based), before jitter
    ///
    /// `base_delay × multiplier^(attempt - 1)`, clamped to `max_delay`. The delay
    /// depends on the attempt number only, so jitter never compounds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.config.backoff_multiplier.max(1.0).powi(exponent);
        let secs = self.config.base_delay.as_secs_f64() * factor;
        let max = self.config.max_delay;
        if !secs.is_finite() || secs >= max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first
///
/// Returns `true` when the full delay elapsed and `false` when it was cut short
/// by cancellation.
pub async fn wait_backoff(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => !cancel.is_cancelled(),
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
