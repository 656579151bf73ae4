//! Result-stream record shape.
//!
//! Agents (via their relay server) append one record per terminal task
//! to a well-known, ordered, append-only stream. The engine's
//! correlator matches records to outstanding task ids; readers never
//! consume, so any number of independent waiters may cover overlapping
//! ranges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, HostId, TaskId};
use crate::status::TaskResultStatus;

/// One completion record appended by an agent relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultRecord {
    /// Task this record resolves.
    pub task_id: TaskId,

    /// Agent that executed the task.
    pub agent_id: Option<AgentId>,

    /// Host the task ran on (relays decode it from the task id).
    pub host_id: Option<HostId>,

    /// Terminal status reported by the agent.
    pub status: TaskResultStatus,

    /// Process exit code; -1 for synthetic records.
    pub exit_code: Option<i32>,

    /// Failure description; empty on success.
    #[serde(default)]
    pub error_msg: String,

    /// When the agent started the task.
    pub started_at: Option<DateTime<Utc>>,

    /// When the agent finished the task.
    pub finished_at: Option<DateTime<Utc>>,

    /// Pointer to the task's output log (e.g. `redis:job_logs/<id>`).
    #[serde(default)]
    pub log_pointer: String,

    /// Size of the captured log in bytes.
    #[serde(default)]
    pub log_size: u64,
}

impl TaskResultRecord {
    /// A record is a success only when the agent completed the task
    /// with a zero exit code.
    pub fn succeeded(&self) -> bool {
        self.status == TaskResultStatus::Completed && self.exit_code == Some(0)
    }

    /// Synthetic record for a task id whose real record never arrived
    /// before the wait deadline.
    pub fn timed_out(task_id: TaskId, wait_secs: u64) -> Self {
        Self {
            task_id,
            agent_id: None,
            host_id: None,
            status: TaskResultStatus::Timeout,
            exit_code: Some(-1),
            error_msg: format!("no result within {wait_secs}s"),
            started_at: None,
            finished_at: None,
            log_pointer: String::new(),
            log_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(exit_code: i32) -> TaskResultRecord {
        TaskResultRecord {
            task_id: TaskId::from("1_main_2_abcd1234"),
            agent_id: Some(AgentId::new("agent-1")),
            host_id: Some(HostId::new(2)),
            status: TaskResultStatus::Completed,
            exit_code: Some(exit_code),
            error_msg: String::new(),
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
            log_pointer: String::new(),
            log_size: 0,
        }
    }

    #[test]
    fn test_succeeded_requires_zero_exit() {
        assert!(completed(0).succeeded());
        assert!(!completed(1).succeeded());
    }

    #[test]
    fn test_failed_status_never_succeeds() {
        let mut rec = completed(0);
        rec.status = TaskResultStatus::Failed;
        assert!(!rec.succeeded());
    }

    #[test]
    fn test_timed_out_record() {
        let rec = TaskResultRecord::timed_out(TaskId::from("1_main_2_abcd1234"), 300);
        assert_eq!(rec.status, TaskResultStatus::Timeout);
        assert!(!rec.succeeded());
        assert_eq!(rec.exit_code, Some(-1));
        assert!(rec.error_msg.contains("300"));
    }
}
