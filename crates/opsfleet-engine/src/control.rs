//! Cancellation flags, the retry concurrency counter, and the
//! cancellation controller.
//!
//! Shared control state sits behind the injectable [`ControlStore`]
//! seam so deployments can back it with any shared store; the engine
//! ships an in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use opsfleet_core::{ExecutionId, ExecutionStep};

use crate::dispatch::Dispatcher;
use crate::registry::AgentRegistry;
use crate::store::ExecutionStore;

/// Shared control state: cancellation flags keyed by execution id and
/// named bounded counters.
#[async_trait]
pub trait ControlStore: Send + Sync {
    /// Set the cancellation flag for an execution.
    async fn set_cancel_flag(&self, execution_id: ExecutionId);

    /// Check the cancellation flag.
    async fn is_cancelled(&self, execution_id: ExecutionId) -> bool;

    /// Clear the cancellation flag. Safe to call when never set.
    async fn clear_cancel_flag(&self, execution_id: ExecutionId);

    /// Atomically increment `key` if its value is below `cap`.
    /// Returns false (without incrementing) at or above the cap.
    async fn incr_if_below(&self, key: &str, cap: u32) -> bool;

    /// Decrement `key`, saturating at zero.
    async fn decr(&self, key: &str);
}

/// In-memory control store for embedding and tests.
#[derive(Default)]
pub struct MemoryControlStore {
    flags: Mutex<HashSet<ExecutionId>>,
    counters: Mutex<HashMap<String, u32>>,
}

impl MemoryControlStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ControlStore for MemoryControlStore {
    async fn set_cancel_flag(&self, execution_id: ExecutionId) {
        self.flags.lock().await.insert(execution_id);
    }

    async fn is_cancelled(&self, execution_id: ExecutionId) -> bool {
        self.flags.lock().await.contains(&execution_id)
    }

    async fn clear_cancel_flag(&self, execution_id: ExecutionId) {
        self.flags.lock().await.remove(&execution_id);
    }

    async fn incr_if_below(&self, key: &str, cap: u32) -> bool {
        let mut counters = self.counters.lock().await;
        let count = counters.entry(key.to_string()).or_insert(0);
        if *count >= cap {
            return false;
        }
        *count += 1;
        true
    }

    async fn decr(&self, key: &str) {
        let mut counters = self.counters.lock().await;
        if let Some(count) = counters.get_mut(key) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Live cancellation tokens for in-flight strategy invocations,
/// keyed by execution id. The token is the best-effort hard-interrupt
/// channel; the [`ControlStore`] flag is the cooperative one.
#[derive(Default)]
pub struct RunRegistry {
    tokens: Mutex<HashMap<ExecutionId, CancellationToken>>,
}

impl RunRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run, returning its interrupt token.
    pub async fn register(&self, execution_id: ExecutionId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().await.insert(execution_id, token.clone());
        token
    }

    /// Fire the interrupt token for a run, if it is still registered.
    pub async fn interrupt(&self, execution_id: ExecutionId) -> bool {
        match self.tokens.lock().await.get(&execution_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a finished run's token.
    pub async fn deregister(&self, execution_id: ExecutionId) {
        self.tokens.lock().await.remove(&execution_id);
    }
}

/// Outcome of one cancel request.
#[derive(Debug, Clone, Default)]
pub struct CancelReport {
    /// Whether a live run was interrupted.
    pub interrupted: bool,

    /// Dispatched tasks for which an agent-side cancel was delivered.
    pub tasks_cancelled: usize,

    /// Agent-side cancel failures (best-effort, informational).
    pub errors: Vec<String>,
}

/// Drives the dual-channel cancellation protocol.
pub struct CancelController {
    control: Arc<dyn ControlStore>,
    runs: Arc<RunRegistry>,
    store: Arc<dyn ExecutionStore>,
    registry: Arc<dyn AgentRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl CancelController {
    /// Wire a controller over the engine's shared collaborators.
    pub fn new(
        control: Arc<dyn ControlStore>,
        runs: Arc<RunRegistry>,
        store: Arc<dyn ExecutionStore>,
        registry: Arc<dyn AgentRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            control,
            runs,
            store,
            registry,
            dispatcher,
        }
    }

    /// Cancel an execution: set the cooperative flag, fire the hard
    /// interrupt, and best-effort cancel every dispatched task on its
    /// agent. Idempotent.
    pub async fn cancel(&self, execution_id: ExecutionId) -> CancelReport {
        info!(execution_id = %execution_id, "cancelling execution");
        self.control.set_cancel_flag(execution_id).await;
        let interrupted = self.runs.interrupt(execution_id).await;

        let steps = self
            .store
            .list_steps(execution_id)
            .await
            .unwrap_or_default();
        let mut report = CancelReport {
            interrupted,
            ..Default::default()
        };
        for step in &steps {
            self.cancel_step_tasks(step, &mut report).await;
        }
        report
    }

    async fn cancel_step_tasks(&self, step: &ExecutionStep, report: &mut CancelReport) {
        for host_result in &step.host_results {
            let Some(task_id) = &host_result.task_id else {
                continue;
            };
            let Some(agent) = self.registry.resolve(host_result.host_id).await else {
                continue;
            };
            match self.dispatcher.cancel(&agent, task_id).await {
                Ok(()) => {
                    debug!(task_id = %task_id, agent_id = %agent.agent_id, "agent-side cancel delivered");
                    report.tasks_cancelled += 1;
                }
                Err(e) => {
                    warn!(task_id = %task_id, agent_id = %agent.agent_id, error = %e, "agent-side cancel failed");
                    report.errors.push(format!("{task_id}: {e}"));
                }
            }
        }
    }

    /// Clear cancellation state when an execution reaches any terminal
    /// state. Idempotent; safe when the flag was never set.
    pub async fn finish(&self, execution_id: ExecutionId) {
        self.control.clear_cancel_flag(execution_id).await;
        self.runs.deregister(execution_id).await;
    }
}
