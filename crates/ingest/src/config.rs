//! Ingestion writer configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the ledger ingestion writer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestConfig {
    /// Retry policy applied by `write_ledger_with_retry`.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Exponential backoff policy for replaying failed commits.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Ceiling on the delay between retries, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Backoff growth factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,
}

impl RetryPolicy {
    /// Delay before the first retry.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Ceiling on the delay between retries.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f32 {
    2.0
}
