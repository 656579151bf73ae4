//! Persistence seam for execution records and their steps.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use opsfleet_core::{ExecutionId, ExecutionRecord, ExecutionStatus, ExecutionStep, StepId};

/// Errors surfaced by an [`ExecutionStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("step not found: {0}")]
    StepNotFound(StepId),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Durable view of executions and steps as the engine needs them.
///
/// Reads return owned snapshots; writers replace whole records so the
/// trait stays implementable over document and relational backends
/// alike.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn get(&self, execution_id: ExecutionId) -> Result<ExecutionRecord, StoreError>;

    async fn insert(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
    ) -> Result<(), StoreError>;

    /// Increment the root record's retry counter.
    async fn bump_retry_count(&self, execution_id: ExecutionId) -> Result<u32, StoreError>;

    /// Make `latest` the sole `is_latest` member of the retry chain
    /// rooted at `root`. Idempotent.
    async fn promote_latest(
        &self,
        root: ExecutionId,
        latest: ExecutionId,
    ) -> Result<(), StoreError>;

    async fn list_steps(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionStep>, StoreError>;

    async fn get_step(
        &self,
        execution_id: ExecutionId,
        step_id: &StepId,
    ) -> Result<ExecutionStep, StoreError>;

    /// Insert or replace a step under an execution.
    async fn put_step(
        &self,
        execution_id: ExecutionId,
        step: ExecutionStep,
    ) -> Result<(), StoreError>;
}

/// In-memory store for embedding and tests.
#[derive(Default)]
pub struct MemoryExecutionStore {
    records: Mutex<HashMap<ExecutionId, ExecutionRecord>>,
    steps: Mutex<HashMap<ExecutionId, Vec<ExecutionStep>>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn get(&self, execution_id: ExecutionId) -> Result<ExecutionRecord, StoreError> {
        self.records
            .lock()
            .await
            .get(&execution_id)
            .cloned()
            .ok_or(StoreError::ExecutionNotFound(execution_id))
    }

    async fn insert(&self, record: ExecutionRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(record.execution_id, record);
        Ok(())
    }

    async fn update_status(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;
        record.status = status;
        Ok(())
    }

    async fn bump_retry_count(&self, execution_id: ExecutionId) -> Result<u32, StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;
        record.retry_count += 1;
        Ok(record.retry_count)
    }

    async fn promote_latest(
        &self,
        root: ExecutionId,
        latest: ExecutionId,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        if !records.contains_key(&root) {
            return Err(StoreError::ExecutionNotFound(root));
        }
        for record in records.values_mut() {
            if record.execution_id == root || record.parent_execution == Some(root) {
                record.is_latest = record.execution_id == latest;
            }
        }
        Ok(())
    }

    async fn list_steps(&self, execution_id: ExecutionId) -> Result<Vec<ExecutionStep>, StoreError> {
        Ok(self
            .steps
            .lock()
            .await
            .get(&execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_step(
        &self,
        execution_id: ExecutionId,
        step_id: &StepId,
    ) -> Result<ExecutionStep, StoreError> {
        self.steps
            .lock()
            .await
            .get(&execution_id)
            .and_then(|steps| steps.iter().find(|s| &s.id == step_id))
            .cloned()
            .ok_or_else(|| StoreError::StepNotFound(step_id.clone()))
    }

    async fn put_step(
        &self,
        execution_id: ExecutionId,
        step: ExecutionStep,
    ) -> Result<(), StoreError> {
        let mut steps = self.steps.lock().await;
        let entries = steps.entry(execution_id).or_default();
        match entries.iter_mut().find(|s| s.id == step.id) {
            Some(existing) => *existing = step,
            None => entries.push(step),
        }
        Ok(())
    }
}
