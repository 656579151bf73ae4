//! Core domain errors.

use thiserror::Error;

/// Core domain errors for opsfleet.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required task-spec field was missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A task id could not be decoded back into its parts.
    #[error("malformed task id: {0}")]
    MalformedTaskId(String),

    /// Step ids may not contain the task-id delimiter.
    #[error("step id must not contain '_': {0}")]
    InvalidStepId(String),

    /// Worker id outside the 10-bit range the id layout supports.
    #[error("worker id out of range: {got} (max {max})")]
    WorkerIdOutOfRange { got: u16, max: u16 },

    /// System clock moved backwards while generating an execution id.
    #[error("system clock moved backwards; refusing to generate execution id")]
    ClockRollback,

    /// Invalid state transition.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}
