//! Retry orchestration: full re-run chains and in-place step retries.
//!
//! A full retry creates a fresh execution record linked to the root of
//! its chain and replays the original parameters through an
//! [`ExecutionLauncher`]. An in-place retry resets one failed step and
//! re-dispatches it, optionally only to the hosts that failed. Both
//! paths validate state and capacity before any side effect.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use opsfleet_core::{
    ExecutionId, ExecutionIdGenerator, ExecutionRecord, ExecutionResult, ExecutionStatus,
    ExecutionStep, Host, HostExecutionResult, StepId, StepStatus,
};

use crate::config::EngineConfig;
use crate::control::ControlStore;
use crate::error::EngineError;
use crate::store::ExecutionStore;

/// Counter key for the global retry concurrency cap.
const RETRY_SLOTS_KEY: &str = "retry_slots";

/// Host selection for an in-place step retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Re-dispatch only to the hosts that failed last time.
    FailedOnly,

    /// Re-dispatch to every host the step ran on.
    All,
}

/// Turns an execution record back into running work.
///
/// The engine does not know how to interpret a record's parameters;
/// the embedding application does, and implements this seam by picking
/// hosts, a task builder and a mode, then calling
/// [`DispatchEngine::execute`](crate::DispatchEngine::execute).
#[async_trait]
pub trait ExecutionLauncher: Send + Sync {
    /// Launch a full execution from its record.
    async fn launch(&self, record: &ExecutionRecord) -> Result<ExecutionResult, EngineError>;

    /// Re-dispatch one step of an execution to the given hosts.
    async fn launch_step(
        &self,
        record: &ExecutionRecord,
        step: &ExecutionStep,
        hosts: &[Host],
    ) -> Result<ExecutionResult, EngineError>;
}

/// Drives retry chains under a bounded concurrency cap.
pub struct RetryController {
    store: Arc<dyn ExecutionStore>,
    control: Arc<dyn ControlStore>,
    launcher: Arc<dyn ExecutionLauncher>,
    ids: Arc<ExecutionIdGenerator>,
    max_concurrent: u32,
}

impl RetryController {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        control: Arc<dyn ControlStore>,
        launcher: Arc<dyn ExecutionLauncher>,
        ids: Arc<ExecutionIdGenerator>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            control,
            launcher,
            ids,
            max_concurrent: config.max_concurrent_retries,
        }
    }

    /// Retry a whole execution.
    ///
    /// Walks the retry chain to its root, checks the chain's retry
    /// budget, claims a concurrency slot, then creates and launches a
    /// fresh record marked as the latest member of the chain. Returns
    /// the new execution id with its result. Rejections happen before
    /// any record is written.
    pub async fn retry_full(
        &self,
        execution_id: ExecutionId,
    ) -> Result<(ExecutionId, ExecutionResult), EngineError> {
        let record = self.store.get(execution_id).await?;
        let root = self.chain_root(&record).await?;

        if root.retry_count >= root.max_retries {
            return Err(EngineError::RetryBudgetExhausted {
                max_retries: root.max_retries,
            });
        }
        if !self
            .control
            .incr_if_below(RETRY_SLOTS_KEY, self.max_concurrent)
            .await
        {
            warn!(execution_id = %execution_id, limit = self.max_concurrent, "retry rejected at capacity");
            return Err(EngineError::Capacity {
                limit: self.max_concurrent,
            });
        }

        let outcome = self.run_full_retry(&root).await;
        self.control.decr(RETRY_SLOTS_KEY).await;
        outcome
    }

    async fn run_full_retry(
        &self,
        root: &ExecutionRecord,
    ) -> Result<(ExecutionId, ExecutionResult), EngineError> {
        let new_id = self.ids.generate()?;
        let attempt = root.retry_count + 1;

        let mut retry = ExecutionRecord::new(new_id, root.name.clone(), root.kind)
            .with_max_retries(root.max_retries)
            .with_parameters(root.parameters.clone());
        retry.parent_execution = Some(root.execution_id);
        retry.retry_count = attempt;
        retry.status = ExecutionStatus::Running;

        // Insert before demoting the chain: a store failure part-way
        // through must never leave the chain without a latest member.
        self.store.insert(retry.clone()).await?;
        self.store.promote_latest(root.execution_id, new_id).await?;
        self.store.bump_retry_count(root.execution_id).await?;

        info!(
            execution_id = %new_id,
            root = %root.execution_id,
            attempt,
            "launching retry execution"
        );
        let result = self.launcher.launch(&retry).await;
        let status = match &result {
            Ok(r) if r.success => ExecutionStatus::Success,
            Ok(_) => ExecutionStatus::Failed,
            Err(EngineError::Cancelled { .. }) => ExecutionStatus::Cancelled,
            Err(_) => ExecutionStatus::Failed,
        };
        self.store.update_status(new_id, status).await?;
        result.map(|r| (new_id, r))
    }

    /// Retry one step of an execution in place.
    ///
    /// Allowed only while the execution is failed or running and the
    /// step is in a retryable state. The step is reset, re-dispatched
    /// to the selected hosts, and its results merged over the previous
    /// run (hosts not re-dispatched keep their old outcome).
    pub async fn retry_step_inplace(
        &self,
        execution_id: ExecutionId,
        step_id: &StepId,
        policy: RetryPolicy,
    ) -> Result<ExecutionResult, EngineError> {
        let record = self.store.get(execution_id).await?;
        if !matches!(
            record.status,
            ExecutionStatus::Failed | ExecutionStatus::Running
        ) {
            return Err(EngineError::InvalidState {
                expected: "failed or running execution".into(),
                actual: format!("{:?}", record.status),
            });
        }

        let mut step = self.store.get_step(execution_id, step_id).await?;
        if !step.status.is_retryable() {
            return Err(EngineError::InvalidState {
                expected: "failed, skipped or timed out step".into(),
                actual: format!("{:?}", step.status),
            });
        }

        let previous = step.host_results.clone();
        let hosts: Vec<Host> = previous
            .iter()
            .filter(|r| policy == RetryPolicy::All || !r.success)
            .map(|r| Host::new(r.host_id, r.host_name.clone()))
            .collect();
        if hosts.is_empty() {
            return Ok(ExecutionResult::empty());
        }

        info!(
            execution_id = %execution_id,
            step_id = %step_id,
            hosts = hosts.len(),
            policy = ?policy,
            "retrying step in place"
        );
        step.reset();
        step.start();
        self.store.put_step(execution_id, step.clone()).await?;
        self.store
            .update_status(execution_id, ExecutionStatus::Running)
            .await?;

        let result = self.launcher.launch_step(&record, &step, &hosts).await?;
        let merged = merge_host_results(previous, &result.results);
        let step_status = if merged.iter().all(|r| r.success) {
            StepStatus::Success
        } else {
            StepStatus::Failed
        };
        step.finish(step_status, merged);
        self.store.put_step(execution_id, step).await?;

        // The execution status reflects every step, not just the one
        // retried here; a failed sibling keeps the execution failed.
        let steps = self.store.list_steps(execution_id).await?;
        self.store
            .update_status(execution_id, derive_execution_status(&steps))
            .await?;
        Ok(result)
    }

    async fn chain_root(&self, record: &ExecutionRecord) -> Result<ExecutionRecord, EngineError> {
        match record.parent_execution {
            Some(root) => Ok(self.store.get(root).await?),
            None => Ok(record.clone()),
        }
    }
}

/// Execution status implied by the full step set.
fn derive_execution_status(steps: &[ExecutionStep]) -> ExecutionStatus {
    if steps.iter().any(|s| s.status.is_retryable()) {
        ExecutionStatus::Failed
    } else if steps.iter().all(|s| s.status == StepStatus::Success) {
        ExecutionStatus::Success
    } else {
        ExecutionStatus::Running
    }
}

/// Overlay retried hosts' new results on the previous run's.
fn merge_host_results(
    previous: Vec<HostExecutionResult>,
    fresh: &[HostExecutionResult],
) -> Vec<HostExecutionResult> {
    previous
        .into_iter()
        .map(|old| {
            fresh
                .iter()
                .find(|new| new.host_id == old.host_id)
                .cloned()
                .unwrap_or(old)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MemoryControlStore;
    use crate::store::MemoryExecutionStore;
    use opsfleet_core::{ExecutionKind, HostId};
    use tokio::sync::Mutex;

    struct FakeLauncher {
        launches: Mutex<Vec<ExecutionId>>,
        step_hosts: Mutex<Vec<Vec<HostId>>>,
        succeed: bool,
    }

    impl FakeLauncher {
        fn new(succeed: bool) -> Self {
            Self {
                launches: Mutex::new(Vec::new()),
                step_hosts: Mutex::new(Vec::new()),
                succeed,
            }
        }

        fn results_for(&self, hosts: &[Host]) -> ExecutionResult {
            let results = hosts
                .iter()
                .map(|h| {
                    if self.succeed {
                        HostExecutionResult {
                            host_id: h.id,
                            host_name: h.name.clone(),
                            task_id: None,
                            success: true,
                            exit_code: Some(0),
                            error: None,
                            started_at: None,
                            finished_at: None,
                        }
                    } else {
                        HostExecutionResult::dispatch_failed(h.id, &h.name, None, "boom")
                    }
                })
                .collect();
            ExecutionResult::aggregate(hosts.len(), results, false, false)
        }
    }

    #[async_trait]
    impl ExecutionLauncher for FakeLauncher {
        async fn launch(&self, record: &ExecutionRecord) -> Result<ExecutionResult, EngineError> {
            self.launches.lock().await.push(record.execution_id);
            Ok(self.results_for(&[Host::new(1u64, "h1")]))
        }

        async fn launch_step(
            &self,
            _record: &ExecutionRecord,
            _step: &ExecutionStep,
            hosts: &[Host],
        ) -> Result<ExecutionResult, EngineError> {
            self.step_hosts
                .lock()
                .await
                .push(hosts.iter().map(|h| h.id).collect());
            Ok(self.results_for(hosts))
        }
    }

    fn controller(
        launcher: Arc<FakeLauncher>,
        max_concurrent: u32,
    ) -> (RetryController, Arc<MemoryExecutionStore>, Arc<MemoryControlStore>) {
        let store = Arc::new(MemoryExecutionStore::new());
        let control = Arc::new(MemoryControlStore::new());
        let config = EngineConfig {
            max_concurrent_retries: max_concurrent,
            ..Default::default()
        };
        let ctl = RetryController::new(
            store.clone(),
            control.clone(),
            launcher,
            Arc::new(ExecutionIdGenerator::new(1).unwrap()),
            &config,
        );
        (ctl, store, control)
    }

    fn failed_record(id: u64) -> ExecutionRecord {
        let mut rec = ExecutionRecord::new(
            ExecutionId::from_raw(id),
            "deploy",
            ExecutionKind::JobWorkflow,
        );
        rec.status = ExecutionStatus::Failed;
        rec
    }

    #[tokio::test]
    async fn test_capacity_rejection_launches_nothing() {
        let launcher = Arc::new(FakeLauncher::new(true));
        let (ctl, store, control) = controller(launcher.clone(), 1);
        store.insert(failed_record(1)).await.unwrap();
        control.incr_if_below(RETRY_SLOTS_KEY, 1).await;

        let err = ctl.retry_full(ExecutionId::from_raw(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Capacity { limit: 1 }));
        assert!(launcher.launches.lock().await.is_empty());
        // The original record is untouched.
        let rec = store.get(ExecutionId::from_raw(1)).await.unwrap();
        assert_eq!(rec.retry_count, 0);
        assert!(rec.is_latest);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let launcher = Arc::new(FakeLauncher::new(true));
        let (ctl, store, _) = controller(launcher.clone(), 10);
        let mut rec = failed_record(1);
        rec.retry_count = rec.max_retries;
        store.insert(rec).await.unwrap();

        let err = ctl.retry_full(ExecutionId::from_raw(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::RetryBudgetExhausted { .. }));
        assert!(launcher.launches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_retry_chain_links_to_root() {
        let launcher = Arc::new(FakeLauncher::new(false));
        let (ctl, store, control) = controller(launcher.clone(), 10);
        store.insert(failed_record(1)).await.unwrap();

        let (first_retry, result) = ctl.retry_full(ExecutionId::from_raw(1)).await.unwrap();
        assert!(!result.success);

        // Retrying the retry still links to the original root.
        let (second_retry, _) = ctl.retry_full(first_retry).await.unwrap();
        let second = store.get(second_retry).await.unwrap();
        assert_eq!(second.parent_execution, Some(ExecutionId::from_raw(1)));
        assert_eq!(second.retry_count, 2);
        assert!(second.is_latest);

        let first = store.get(first_retry).await.unwrap();
        assert!(!first.is_latest);
        let root = store.get(ExecutionId::from_raw(1)).await.unwrap();
        assert!(!root.is_latest);
        assert_eq!(root.retry_count, 2);

        // Slots are released once the launches finish.
        assert!(control.incr_if_below(RETRY_SLOTS_KEY, 1).await);
    }

    #[tokio::test]
    async fn test_step_retry_rejects_wrong_states() {
        let launcher = Arc::new(FakeLauncher::new(true));
        let (ctl, store, _) = controller(launcher.clone(), 10);
        let mut rec = failed_record(1);
        rec.status = ExecutionStatus::Success;
        store.insert(rec).await.unwrap();

        let err = ctl
            .retry_step_inplace(ExecutionId::from_raw(1), &StepId::main(), RetryPolicy::All)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));

        // Right execution state, wrong step state.
        store
            .update_status(ExecutionId::from_raw(1), ExecutionStatus::Failed)
            .await
            .unwrap();
        let mut step = ExecutionStep::new(StepId::main(), "run", 0);
        step.status = StepStatus::Success;
        store
            .put_step(ExecutionId::from_raw(1), step)
            .await
            .unwrap();
        let err = ctl
            .retry_step_inplace(ExecutionId::from_raw(1), &StepId::main(), RetryPolicy::All)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
        assert!(launcher.step_hosts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_step_retry_failed_only_selection_and_merge() {
        let launcher = Arc::new(FakeLauncher::new(true));
        let (ctl, store, _) = controller(launcher.clone(), 10);
        store.insert(failed_record(1)).await.unwrap();

        let mut step = ExecutionStep::new(StepId::main(), "run", 0);
        let ok_host = HostExecutionResult {
            host_id: HostId::new(1),
            host_name: "h1".into(),
            task_id: None,
            success: true,
            exit_code: Some(0),
            error: None,
            started_at: None,
            finished_at: None,
        };
        let bad_host = HostExecutionResult::dispatch_failed(HostId::new(2), "h2", None, "boom");
        step.finish(StepStatus::Failed, vec![ok_host, bad_host]);
        store
            .put_step(ExecutionId::from_raw(1), step)
            .await
            .unwrap();

        ctl.retry_step_inplace(ExecutionId::from_raw(1), &StepId::main(), RetryPolicy::FailedOnly)
            .await
            .unwrap();

        // Only the failed host was re-dispatched.
        let dispatched = launcher.step_hosts.lock().await;
        assert_eq!(dispatched.as_slice(), &[vec![HostId::new(2)]]);

        // Merged results keep the old success and pick up the new one.
        let step = store
            .get_step(ExecutionId::from_raw(1), &StepId::main())
            .await
            .unwrap();
        assert_eq!(step.status, StepStatus::Success);
        assert_eq!(step.host_results.len(), 2);
        assert!(step.host_results.iter().all(|r| r.success));
        let rec = store.get(ExecutionId::from_raw(1)).await.unwrap();
        assert_eq!(rec.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_step_retry_keeps_execution_failed_while_sibling_failed() {
        let launcher = Arc::new(FakeLauncher::new(true));
        let (ctl, store, _) = controller(launcher.clone(), 10);
        store.insert(failed_record(1)).await.unwrap();

        let failed_host = |id: u64| {
            HostExecutionResult::dispatch_failed(HostId::new(id), format!("h{id}"), None, "boom")
        };
        let mut retried = ExecutionStep::new(StepId::main(), "deploy", 0);
        retried.finish(StepStatus::Failed, vec![failed_host(1)]);
        let mut sibling = ExecutionStep::new(StepId::new("verify"), "verify", 1);
        sibling.finish(StepStatus::Failed, vec![failed_host(2)]);
        store.put_step(ExecutionId::from_raw(1), retried).await.unwrap();
        store.put_step(ExecutionId::from_raw(1), sibling).await.unwrap();

        ctl.retry_step_inplace(ExecutionId::from_raw(1), &StepId::main(), RetryPolicy::All)
            .await
            .unwrap();

        let retried = store
            .get_step(ExecutionId::from_raw(1), &StepId::main())
            .await
            .unwrap();
        assert_eq!(retried.status, StepStatus::Success);

        // The untouched failed sibling keeps the execution failed.
        let rec = store.get(ExecutionId::from_raw(1)).await.unwrap();
        assert_eq!(rec.status, ExecutionStatus::Failed);
    }

    /// Store whose chain promotion always fails, standing in for a
    /// backend dropping out mid-sequence.
    struct PromotionFailsStore {
        inner: Arc<MemoryExecutionStore>,
    }

    #[async_trait]
    impl ExecutionStore for PromotionFailsStore {
        async fn get(&self, id: ExecutionId) -> Result<ExecutionRecord, crate::StoreError> {
            self.inner.get(id).await
        }
        async fn insert(&self, record: ExecutionRecord) -> Result<(), crate::StoreError> {
            self.inner.insert(record).await
        }
        async fn update_status(
            &self,
            id: ExecutionId,
            status: ExecutionStatus,
        ) -> Result<(), crate::StoreError> {
            self.inner.update_status(id, status).await
        }
        async fn bump_retry_count(&self, id: ExecutionId) -> Result<u32, crate::StoreError> {
            self.inner.bump_retry_count(id).await
        }
        async fn promote_latest(
            &self,
            _root: ExecutionId,
            _latest: ExecutionId,
        ) -> Result<(), crate::StoreError> {
            Err(crate::StoreError::Backend("connection reset".into()))
        }
        async fn list_steps(
            &self,
            id: ExecutionId,
        ) -> Result<Vec<ExecutionStep>, crate::StoreError> {
            self.inner.list_steps(id).await
        }
        async fn get_step(
            &self,
            id: ExecutionId,
            step_id: &StepId,
        ) -> Result<ExecutionStep, crate::StoreError> {
            self.inner.get_step(id, step_id).await
        }
        async fn put_step(
            &self,
            id: ExecutionId,
            step: ExecutionStep,
        ) -> Result<(), crate::StoreError> {
            self.inner.put_step(id, step).await
        }
    }

    #[tokio::test]
    async fn test_chain_keeps_a_latest_member_when_promotion_fails() {
        let launcher = Arc::new(FakeLauncher::new(true));
        let inner = Arc::new(MemoryExecutionStore::new());
        inner.insert(failed_record(1)).await.unwrap();
        let ctl = RetryController::new(
            Arc::new(PromotionFailsStore {
                inner: inner.clone(),
            }),
            Arc::new(MemoryControlStore::new()),
            launcher,
            Arc::new(ExecutionIdGenerator::new(1).unwrap()),
            &EngineConfig::default(),
        );

        let err = ctl.retry_full(ExecutionId::from_raw(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));

        // The failed promotion never demoted the root, so the chain
        // still has a latest member.
        let root = inner.get(ExecutionId::from_raw(1)).await.unwrap();
        assert!(root.is_latest);
        assert_eq!(root.retry_count, 0);
    }
}
