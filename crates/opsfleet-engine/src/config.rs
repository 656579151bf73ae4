//! Engine configuration.

use std::time::Duration;

/// Engine configuration.
///
/// Every concurrency bound is explicit; nothing in the engine is
/// unbounded.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-call timeout for one push to an agent endpoint.
    pub push_timeout: Duration,

    /// Upper bound on one blocking result-stream read; also the
    /// backoff applied after a transient read error.
    pub poll_interval: Duration,

    /// Maximum records fetched per stream read.
    pub read_batch: usize,

    /// Process-wide cap on concurrent pushes across all strategy
    /// invocations (back-pressure for large fan-outs).
    pub dispatch_permits: usize,

    /// Cap on concurrently running/pending retryable executions.
    pub max_concurrent_retries: u32,

    /// Default per-task timeout when the caller does not set one.
    pub default_task_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            read_batch: 100,
            dispatch_permits: 32,
            max_concurrent_retries: 10,
            default_task_timeout: Duration::from_secs(300),
        }
    }
}
