//! Task specifications pushed to agents.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ExecutionId, HostId, StepId, TaskId};

/// Kind of work a task spec describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Run a script on the host.
    Script,
    /// Transfer files to the host.
    FileTransfer,
}

/// Interpreter used for script tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    #[default]
    Shell,
    Python,
    Powershell,
}

/// Policy when a transferred file already exists on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    #[default]
    Overwrite,
    Skip,
    Fail,
}

/// One file to transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSource {
    /// Name of the file as it lands on the host.
    pub file_name: String,

    /// Opaque pointer to the file content (artifact URL or path).
    pub source: String,

    /// Content size in bytes, when known.
    pub size: Option<u64>,
}

/// File-transfer parameters attached to a [`TaskKind::FileTransfer`] spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransferSpec {
    /// Files to transfer.
    pub sources: Vec<FileSource>,

    /// Destination directory on the host.
    pub remote_path: String,

    /// What to do when the destination file exists.
    pub overwrite_policy: OverwritePolicy,

    /// Transfer rate cap in KiB/s; 0 means unlimited.
    pub bandwidth_limit_kbps: u64,
}

/// An immutable unit of work dispatched to exactly one agent.
///
/// A spec is never mutated after dispatch; a retry produces a new spec
/// with a fresh id and `parent_task_id` pointing at the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Composite task identifier (decodes to execution/step/host).
    pub id: TaskId,

    /// Human-readable task name.
    pub name: String,

    /// Kind of work.
    pub kind: TaskKind,

    /// Script content or command line (script tasks).
    pub command: String,

    /// Interpreter for script tasks.
    pub script_type: ScriptType,

    /// Positional arguments.
    pub args: Vec<String>,

    /// Environment variables for the task process.
    pub env: HashMap<String, String>,

    /// Per-task execution timeout in seconds.
    pub timeout_secs: u64,

    /// Working directory on the host; empty means agent default.
    pub work_dir: String,

    /// User to run as; `None` means the agent's own user.
    pub run_as: Option<String>,

    /// Target host.
    pub host_id: HostId,

    /// Originating execution.
    pub execution_id: ExecutionId,

    /// Originating step.
    pub step_id: StepId,

    /// How many times this work item has been retried.
    pub retry_count: u32,

    /// Original task id when this spec is a retry.
    pub parent_task_id: Option<TaskId>,

    /// File-transfer parameters, for [`TaskKind::FileTransfer`] only.
    pub file_transfer: Option<FileTransferSpec>,
}

impl TaskSpec {
    /// Returns true if this spec is a retry of an earlier dispatch.
    pub fn is_retry(&self) -> bool {
        self.retry_count > 0 || self.parent_task_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_serde() {
        let json = serde_json::to_string(&TaskKind::FileTransfer).unwrap();
        assert_eq!(json, "\"file_transfer\"");
        let kind: TaskKind = serde_json::from_str("\"script\"").unwrap();
        assert_eq!(kind, TaskKind::Script);
    }
}
