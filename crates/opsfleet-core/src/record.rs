//! Logical execution and step entities.
//!
//! The engine never persists these; an external record store owns them
//! and hands copies across the `ExecutionStore` seam. Only the fields
//! the retry/cancel controller needs are modeled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ExecutionId, StepId};
use crate::result::HostExecutionResult;
use crate::status::{ExecutionStatus, StepStatus};

/// Kind of execution; only these kinds count toward the retry
/// concurrency cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    JobWorkflow,
    QuickScript,
    QuickFileTransfer,
}

/// One execution of a script, transfer or workflow across a host set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique execution identifier.
    pub execution_id: ExecutionId,

    /// Human-readable name.
    pub name: String,

    /// Kind of execution.
    pub kind: ExecutionKind,

    /// Current status.
    pub status: ExecutionStatus,

    /// Retries performed on this chain so far.
    pub retry_count: u32,

    /// Retry budget for the chain.
    pub max_retries: u32,

    /// Root of the retry chain this record belongs to, if any.
    pub parent_execution: Option<ExecutionId>,

    /// True only on the newest member of the retry chain.
    pub is_latest: bool,

    /// Caller-supplied parameters, replayed verbatim on full retry.
    pub parameters: serde_json::Value,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Create a new pending record.
    pub fn new(execution_id: ExecutionId, name: impl Into<String>, kind: ExecutionKind) -> Self {
        Self {
            execution_id,
            name: name.into(),
            kind,
            status: ExecutionStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            parent_execution: None,
            is_latest: true,
            parameters: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Builder method to set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder method to set the replayable parameters.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Check if the execution is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One step of an execution (a workflow stage, or the sole `main` step
/// of a quick script/transfer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Step identifier, unique within the execution.
    pub id: StepId,

    /// Human-readable name.
    pub name: String,

    /// Position within the execution.
    pub order: u32,

    /// Current status.
    pub status: StepStatus,

    /// Failure description when the step failed.
    pub error_message: String,

    /// Per-host outcomes from the last run of this step.
    pub host_results: Vec<HostExecutionResult>,

    /// When the step started.
    pub started_at: Option<DateTime<Utc>>,

    /// When the step reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionStep {
    /// Create a new pending step.
    pub fn new(id: StepId, name: impl Into<String>, order: u32) -> Self {
        Self {
            id,
            name: name.into(),
            order,
            status: StepStatus::Pending,
            error_message: String::new(),
            host_results: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark the step as running.
    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record a terminal status with the step's host results.
    pub fn finish(&mut self, status: StepStatus, host_results: Vec<HostExecutionResult>) {
        self.status = status;
        self.host_results = host_results;
        self.finished_at = Some(Utc::now());
    }

    /// Reset for an in-place retry: pending status, cleared results.
    pub fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.error_message.clear();
        self.host_results.clear();
        self.started_at = None;
        self.finished_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_reset_clears_results() {
        let mut step = ExecutionStep::new(StepId::main(), "run script", 0);
        step.start();
        step.finish(StepStatus::Failed, Vec::new());
        step.error_message = "boom".into();

        step.reset();
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.error_message.is_empty());
        assert!(step.host_results.is_empty());
        assert!(step.finished_at.is_none());
    }

    #[test]
    fn test_new_record_is_latest_root() {
        let rec = ExecutionRecord::new(
            ExecutionId::from_raw(7),
            "quick script",
            ExecutionKind::QuickScript,
        );
        assert!(rec.is_latest);
        assert!(rec.parent_execution.is_none());
        assert!(!rec.is_terminal());
    }
}
