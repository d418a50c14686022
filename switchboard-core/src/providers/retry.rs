//! Retry policy with exponential backoff
//!
//! Only connect and timeout failures are retried, and only before any output
//! reached the client. `max_attempts` counts every try including the first.

use crate::config::ValidationError;
use crate::providers::error::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total tries, the initial attempt included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Jitter factor (0.0 to 1.0) added on top of the computed delay.
    /// Jitter only ever lengthens a delay, so the sequence stays monotonic.
    #[serde(default)]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_initial_delay_ms() -> u64 { 500 }
fn default_max_delay_ms() -> u64 { 8_000 }
fn default_exponential_base() -> f64 { 2.0 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A single attempt, never retried
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    pub fn with_delays(mut self, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.initial_delay_ms = initial_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Backoff before the attempt following `attempt` (1-based).
    ///
    /// `initial_delay_ms * base^(attempt-1)`, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let base_delay = self.initial_delay_ms as f64 * self.exponential_base.powi(exponent);
        let capped = base_delay.min(self.max_delay_ms as f64);

        let delay = if self.jitter_factor > 0.0 {
            let jitter = rand::thread_rng().gen_range(0.0..=capped * self.jitter_factor);
            (capped + jitter).min(self.max_delay_ms as f64)
        } else {
            capped
        };

        Duration::from_millis(delay.max(0.0) as u64)
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }

    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::out_of_range(
                format!("{path}.max_attempts"),
                "must be at least 1",
            ));
        }

        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::out_of_range(
                format!("{path}.max_delay_ms"),
                "must be >= initial_delay_ms",
            ));
        }

        if self.exponential_base < 1.0 {
            return Err(ValidationError::out_of_range(
                format!("{path}.exponential_base"),
                "must be >= 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{path}.jitter_factor"),
                "must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}
