//! Connection handler configuration.

use serde::Deserialize;

use crate::handler::ProcessingPolicy;

/// Configuration for the connection handler.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Request dispatch policy per connection.
    #[serde(default)]
    pub processing_policy: ProcessingPolicy,
    /// Bound on concurrent requests per connection under the parallel
    /// policy; unbounded when unset.
    #[serde(default)]
    pub max_parallel_requests: Option<usize>,
    /// How long in-flight handlers may run after `stop()` or connection
    /// teardown before being abandoned.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            processing_policy: ProcessingPolicy::default(),
            max_parallel_requests: None,
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

fn default_grace_period_ms() -> u64 {
    500
}
