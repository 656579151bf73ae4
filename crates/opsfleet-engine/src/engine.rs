//! Engine assembly: shared collaborators behind one handle.

use std::sync::Arc;
use std::time::Duration;

use opsfleet_core::{ExecutionId, TaskId, TaskResultRecord};

use crate::config::EngineConfig;
use crate::control::{ControlStore, RunRegistry};
use crate::correlator::ResultCorrelator;
use crate::dispatch::Dispatcher;
use crate::pool::DispatchPool;
use crate::registry::AgentRegistry;
use crate::strategy::ExecuteOptions;
use crate::stream::ResultStream;

/// The dispatch engine.
///
/// One instance per process; cheap to share behind an `Arc`. Strategy
/// entry points live in [`crate::strategy`].
pub struct DispatchEngine {
    pub(crate) config: EngineConfig,
    pub(crate) registry: Arc<dyn AgentRegistry>,
    pub(crate) dispatcher: Arc<dyn Dispatcher>,
    pub(crate) correlator: ResultCorrelator,
    pub(crate) stream: Arc<dyn ResultStream>,
    pub(crate) pool: DispatchPool,
    pub(crate) control: Arc<dyn ControlStore>,
    pub(crate) runs: Arc<RunRegistry>,
}

impl DispatchEngine {
    /// Assemble an engine over the given collaborators.
    pub fn new(
        config: EngineConfig,
        registry: Arc<dyn AgentRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
        stream: Arc<dyn ResultStream>,
        control: Arc<dyn ControlStore>,
    ) -> Self {
        let correlator = ResultCorrelator::new(Arc::clone(&stream), &config);
        let pool = DispatchPool::new(config.dispatch_permits);
        Self {
            config,
            registry,
            dispatcher,
            correlator,
            stream,
            pool,
            control,
            runs: Arc::new(RunRegistry::new()),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Strict options carrying the configured default task timeout.
    pub fn execute_options(&self, execution_id: ExecutionId) -> ExecuteOptions {
        ExecuteOptions::new(execution_id, self.config.default_task_timeout)
    }

    /// Live-run registry, shared with the cancel controller.
    pub fn runs(&self) -> Arc<RunRegistry> {
        Arc::clone(&self.runs)
    }

    /// The result correlator, for callers that wait on individual
    /// tasks outside a strategy invocation.
    pub fn correlator(&self) -> &ResultCorrelator {
        &self.correlator
    }

    /// Wait for a single task's result.
    pub async fn wait_for(&self, task_id: &TaskId, timeout: Duration) -> TaskResultRecord {
        self.correlator.wait_for(task_id, timeout).await
    }
}
