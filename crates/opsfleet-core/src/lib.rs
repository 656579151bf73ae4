//! Opsfleet Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Database
//! - Runtime specifics
//!
//! All types here represent the core business domain of opsfleet:
//! identifiers, task specifications, execution results, result-stream
//! records and the logical execution/step entities the engine needs.

pub mod agent;
pub mod error;
pub mod host;
pub mod ids;
pub mod record;
pub mod result;
pub mod status;
pub mod stream;
pub mod task;

// Re-export commonly used types
pub use agent::Agent;
pub use error::CoreError;
pub use host::Host;
pub use ids::{AgentId, ExecutionId, ExecutionIdGenerator, HostId, StepId, TaskId, TaskIdParts};
pub use record::{ExecutionKind, ExecutionRecord, ExecutionStep};
pub use result::{ExecutionResult, HostExecutionResult};
pub use status::{AgentStatus, ExecutionStatus, StepStatus, TaskResultStatus};
pub use stream::TaskResultRecord;
pub use task::{FileSource, FileTransferSpec, OverwritePolicy, ScriptType, TaskKind, TaskSpec};
