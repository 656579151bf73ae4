//! Execution strategies: parallel, serial and rolling dispatch of one
//! task template across a host set.
//!
//! All three share the same per-host pipeline (resolve agent, build
//! spec, push, correlate result) and differ only in ordering and
//! stop-on-failure behavior. Per-host failures are folded into the
//! aggregate result; only cancellation and pre-dispatch rejections
//! surface as errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use opsfleet_core::{
    Agent, ExecutionId, ExecutionResult, Host, HostExecutionResult, TaskId,
};

use crate::builder::TaskBuilder;
use crate::engine::DispatchEngine;
use crate::error::EngineError;

/// How a strategy walks the host set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// All hosts at once, one shared result wait.
    Parallel,

    /// One host at a time, stopping at the first failure unless the
    /// run is tolerant.
    Serial,

    /// Fixed-size batches, each batch parallel internally, stopping
    /// after a failed batch unless tolerant. A `batch_size` of zero is
    /// treated as one.
    Rolling {
        batch_size: usize,
        batch_delay: Duration,
    },
}

/// Per-invocation knobs shared by all strategies.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Execution this invocation belongs to; keys cancellation.
    pub execution_id: ExecutionId,

    /// Push-and-wait deadline per wave.
    pub timeout: Duration,

    /// When true, per-host failures do not stop the run and do not
    /// fail the aggregate.
    pub tolerant: bool,
}

impl ExecuteOptions {
    /// Strict options with the given wave timeout. Callers without an
    /// explicit deadline use
    /// [`DispatchEngine::execute_options`](crate::DispatchEngine::execute_options).
    pub fn new(execution_id: ExecutionId, timeout: Duration) -> Self {
        Self {
            execution_id,
            timeout,
            tolerant: false,
        }
    }

    /// Builder method to make the run failure-tolerant.
    pub fn tolerant(mut self) -> Self {
        self.tolerant = true;
        self
    }
}

impl DispatchEngine {
    /// Run `builder`'s task across `hosts` under the given mode.
    ///
    /// Returns the aggregate result, or [`EngineError::Cancelled`]
    /// when the run was cancelled at a safe point or interrupted
    /// mid-wait. An empty host set succeeds without dispatching.
    pub async fn execute(
        &self,
        hosts: &[Host],
        builder: &dyn TaskBuilder,
        mode: ExecutionMode,
        options: &ExecuteOptions,
    ) -> Result<ExecutionResult, EngineError> {
        if hosts.is_empty() {
            debug!(execution_id = %options.execution_id, "empty host set, nothing to dispatch");
            return Ok(ExecutionResult::empty());
        }

        info!(
            execution_id = %options.execution_id,
            hosts = hosts.len(),
            mode = ?mode,
            "starting execution"
        );
        let token = self.runs.register(options.execution_id).await;

        let outcome = match mode {
            ExecutionMode::Parallel => self.run_parallel(hosts, builder, options, &token).await,
            ExecutionMode::Serial => self.run_serial(hosts, builder, options, &token).await,
            ExecutionMode::Rolling {
                batch_size,
                batch_delay,
            } => {
                self.run_rolling(hosts, builder, options, &token, batch_size, batch_delay)
                    .await
            }
        };

        self.runs.deregister(options.execution_id).await;
        match &outcome {
            Ok(result) => info!(
                execution_id = %options.execution_id,
                success = result.success,
                success_count = result.success_count,
                failed_count = result.failed_count,
                stopped_early = result.stopped_early,
                "execution finished"
            ),
            Err(e) => info!(execution_id = %options.execution_id, error = %e, "execution aborted"),
        }
        outcome
    }

    async fn run_parallel(
        &self,
        hosts: &[Host],
        builder: &dyn TaskBuilder,
        options: &ExecuteOptions,
        token: &CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let results = self.dispatch_wave(hosts, builder, options, token).await?;
        Ok(ExecutionResult::aggregate(
            hosts.len(),
            results,
            false,
            options.tolerant,
        ))
    }

    async fn run_serial(
        &self,
        hosts: &[Host],
        builder: &dyn TaskBuilder,
        options: &ExecuteOptions,
        token: &CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let mut results = Vec::with_capacity(hosts.len());
        let mut stopped_early = false;

        for host in hosts {
            self.check_cancelled(options.execution_id, token).await?;

            let result = self.dispatch_one(host, builder, options, token).await?;
            let ok = result.success;
            results.push(result);
            if !ok && !options.tolerant {
                warn!(
                    execution_id = %options.execution_id,
                    host = %host.name,
                    "serial execution stopping at failed host"
                );
                stopped_early = results.len() < hosts.len();
                break;
            }
        }

        Ok(ExecutionResult::aggregate(
            hosts.len(),
            results,
            stopped_early,
            options.tolerant,
        ))
    }

    async fn run_rolling(
        &self,
        hosts: &[Host],
        builder: &dyn TaskBuilder,
        options: &ExecuteOptions,
        token: &CancellationToken,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Result<ExecutionResult, EngineError> {
        let batch_size = batch_size.max(1);
        let batches: Vec<&[Host]> = hosts.chunks(batch_size).collect();
        let mut results = Vec::with_capacity(hosts.len());
        let mut stopped_early = false;

        for (i, batch) in batches.iter().enumerate() {
            self.check_cancelled(options.execution_id, token).await?;

            debug!(
                execution_id = %options.execution_id,
                batch = i + 1,
                batches = batches.len(),
                hosts = batch.len(),
                "dispatching batch"
            );
            let batch_results = self.dispatch_wave(batch, builder, options, token).await?;
            let batch_failed = batch_results.iter().any(|r| !r.success);
            results.extend(batch_results);

            if batch_failed && !options.tolerant {
                warn!(
                    execution_id = %options.execution_id,
                    batch = i + 1,
                    "rolling execution stopping after failed batch"
                );
                stopped_early = i + 1 < batches.len();
                break;
            }
            if i + 1 < batches.len() && !batch_delay.is_zero() {
                tokio::time::sleep(batch_delay).await;
            }
        }

        Ok(ExecutionResult::aggregate(
            hosts.len(),
            results,
            stopped_early,
            options.tolerant,
        ))
    }

    /// Push to every host in the wave, then wait for all results under
    /// one shared deadline. The stream cursor is captured before the
    /// first push so no record can slip between push and wait.
    async fn dispatch_wave(
        &self,
        hosts: &[Host],
        builder: &dyn TaskBuilder,
        options: &ExecuteOptions,
        token: &CancellationToken,
    ) -> Result<Vec<HostExecutionResult>, EngineError> {
        self.check_cancelled(options.execution_id, token).await?;
        let from = self.stream.tail().await;

        let mut results = Vec::with_capacity(hosts.len());
        let mut pushes = Vec::new();
        for host in hosts {
            let agent = match self.resolve_online_agent(host).await {
                Ok(agent) => agent,
                Err(error) => {
                    warn!(host = %host.name, error = %error, "host skipped");
                    results.push(HostExecutionResult::dispatch_failed(
                        host.id, &host.name, None, error,
                    ));
                    continue;
                }
            };
            let spec = match builder.build(host) {
                Ok(spec) => spec,
                Err(e) => {
                    results.push(HostExecutionResult::dispatch_failed(
                        host.id,
                        &host.name,
                        None,
                        format!("task build failed: {e}"),
                    ));
                    continue;
                }
            };

            let task_id = spec.id.clone();
            let permit = self.pool.acquire().await;
            let dispatcher = Arc::clone(&self.dispatcher);
            let handle = tokio::spawn(async move {
                let _permit = permit;
                dispatcher.push(&agent, &spec).await
            });
            pushes.push((host.clone(), task_id, handle));
        }

        let mut host_by_task: HashMap<TaskId, Host> = HashMap::new();
        for (host, task_id, handle) in pushes {
            let push = match handle.await {
                Ok(push) => push,
                Err(e) => {
                    results.push(HostExecutionResult::dispatch_failed(
                        host.id,
                        &host.name,
                        Some(task_id),
                        format!("push task failed: {e}"),
                    ));
                    continue;
                }
            };
            if push.success {
                host_by_task.insert(task_id, host);
            } else {
                let error = push.error.unwrap_or_else(|| "push rejected".into());
                results.push(HostExecutionResult::dispatch_failed(
                    host.id,
                    &host.name,
                    Some(task_id),
                    error,
                ));
            }
        }

        if host_by_task.is_empty() {
            return Ok(results);
        }

        let pending: Vec<TaskId> = host_by_task.keys().cloned().collect();
        let wait = self
            .correlator
            .wait_for_all_from(from, &pending, options.timeout);
        tokio::pin!(wait);
        // The flag is re-read every poll tick so a cancel issued by
        // another process through the shared control store interrupts
        // the wait, not just the in-process token.
        let records = loop {
            tokio::select! {
                records = &mut wait => break records,
                _ = token.cancelled() => {
                    return Err(EngineError::Cancelled {
                        execution_id: options.execution_id,
                    });
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if self.control.is_cancelled(options.execution_id).await {
                        return Err(EngineError::Cancelled {
                            execution_id: options.execution_id,
                        });
                    }
                }
            }
        };

        for (task_id, record) in records {
            if let Some(host) = host_by_task.remove(&task_id) {
                results.push(HostExecutionResult::from_record(host.id, host.name, &record));
            }
        }
        Ok(results)
    }

    /// Serial single-host pipeline: one push, one result wait.
    async fn dispatch_one(
        &self,
        host: &Host,
        builder: &dyn TaskBuilder,
        options: &ExecuteOptions,
        token: &CancellationToken,
    ) -> Result<HostExecutionResult, EngineError> {
        let mut wave = self
            .dispatch_wave(std::slice::from_ref(host), builder, options, token)
            .await?;
        wave.pop().ok_or_else(|| {
            EngineError::Launch(format!("no result produced for host {}", host.name))
        })
    }

    async fn resolve_online_agent(&self, host: &Host) -> Result<Agent, String> {
        match self.registry.resolve(host.id).await {
            None => Err(format!("no agent registered for host {}", host.name)),
            Some(agent) if !agent.status.is_online() => Err(format!(
                "agent {} is {:?}",
                agent.agent_id, agent.status
            )),
            Some(agent) => Ok(agent),
        }
    }

    async fn check_cancelled(
        &self,
        execution_id: ExecutionId,
        token: &CancellationToken,
    ) -> Result<(), EngineError> {
        if token.is_cancelled() || self.control.is_cancelled(execution_id).await {
            return Err(EngineError::Cancelled { execution_id });
        }
        Ok(())
    }
}
