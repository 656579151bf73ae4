//! Engine-level errors.
//!
//! Only a handful of conditions abort a whole operation: capacity and
//! state errors (rejected before any dispatch) and cancellation.
//! Per-host push/execution failures are folded into the aggregate
//! [`opsfleet_core::ExecutionResult`] instead.

use thiserror::Error;

use opsfleet_core::{CoreError, ExecutionId, StepId};

use crate::store::StoreError;

/// Hard call-level errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Retry concurrency cap reached; nothing was dispatched.
    #[error("concurrent retry limit reached ({limit})")]
    Capacity { limit: u32 },

    /// Retry budget for the chain is exhausted.
    #[error("max retries reached ({max_retries})")]
    RetryBudgetExhausted { max_retries: u32 },

    /// Retry/cancel requested against an execution or step in the
    /// wrong state; rejected before any side effect.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The execution was cancelled at a cooperative safe point.
    #[error("execution {execution_id} cancelled")]
    Cancelled { execution_id: ExecutionId },

    /// Unknown execution id.
    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// Unknown step id.
    #[error("step not found: {0}")]
    StepNotFound(StepId),

    /// Record store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Re-dispatch of a retried execution failed to start.
    #[error("launch failed: {0}")]
    Launch(String),

    /// Domain-level error (id construction, validation).
    #[error(transparent)]
    Core(#[from] CoreError),
}
