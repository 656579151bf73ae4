//! Per-host and aggregate execution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{HostId, TaskId};
use crate::stream::TaskResultRecord;

/// Terminal outcome for one dispatched task on one host.
///
/// Produced exactly once per host that was attempted: either from the
/// agent's result record, from a push failure, or as a synthetic
/// timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostExecutionResult {
    /// Target host.
    pub host_id: HostId,

    /// Host display name.
    pub host_name: String,

    /// Task id, when a spec was actually built for this host.
    pub task_id: Option<TaskId>,

    /// Whether the task succeeded.
    pub success: bool,

    /// Process exit code, when the task ran.
    pub exit_code: Option<i32>,

    /// Human-readable failure description.
    pub error: Option<String>,

    /// When the agent started the task.
    pub started_at: Option<DateTime<Utc>>,

    /// When the agent finished the task.
    pub finished_at: Option<DateTime<Utc>>,
}

impl HostExecutionResult {
    /// A host that failed before its task reached an agent
    /// (no agent resolvable, build error, push failure).
    pub fn dispatch_failed(
        host_id: HostId,
        host_name: impl Into<String>,
        task_id: Option<TaskId>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            host_id,
            host_name: host_name.into(),
            task_id,
            success: false,
            exit_code: None,
            error: Some(error.into()),
            started_at: None,
            finished_at: None,
        }
    }

    /// Fold a result-stream record into a host result.
    pub fn from_record(
        host_id: HostId,
        host_name: impl Into<String>,
        record: &TaskResultRecord,
    ) -> Self {
        Self {
            host_id,
            host_name: host_name.into(),
            task_id: Some(record.task_id.clone()),
            success: record.succeeded(),
            exit_code: record.exit_code,
            error: if record.error_msg.is_empty() {
                None
            } else {
                Some(record.error_msg.clone())
            },
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

/// Aggregate outcome of one execution-strategy invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Overall success per the strategy's success law.
    pub success: bool,

    /// Number of hosts the caller asked for.
    pub total: usize,

    /// Hosts that succeeded.
    pub success_count: usize,

    /// Hosts that failed (including skipped and timed-out hosts).
    pub failed_count: usize,

    /// One entry per attempted host.
    pub results: Vec<HostExecutionResult>,

    /// True when a non-tolerant strategy aborted the remaining hosts.
    pub stopped_early: bool,
}

impl ExecutionResult {
    /// Result for an empty host list: trivially successful.
    pub fn empty() -> Self {
        Self {
            success: true,
            total: 0,
            success_count: 0,
            failed_count: 0,
            results: Vec::new(),
            stopped_early: false,
        }
    }

    /// Aggregate per-host results.
    ///
    /// `success` is `failed_count == 0` unless `tolerant`, and never
    /// true for a run that stopped early.
    pub fn aggregate(
        total: usize,
        results: Vec<HostExecutionResult>,
        stopped_early: bool,
        tolerant: bool,
    ) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let failed_count = results.len() - success_count;
        Self {
            success: (failed_count == 0 || tolerant) && !stopped_early,
            total,
            success_count,
            failed_count,
            results,
            stopped_early,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(host: u64) -> HostExecutionResult {
        HostExecutionResult {
            host_id: HostId::new(host),
            host_name: format!("host-{host}"),
            task_id: None,
            success: true,
            exit_code: Some(0),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_empty_is_success() {
        let r = ExecutionResult::empty();
        assert!(r.success);
        assert_eq!(r.total, 0);
        assert!(!r.stopped_early);
    }

    #[test]
    fn test_aggregate_counts() {
        let failed = HostExecutionResult::dispatch_failed(HostId::new(3), "h3", None, "no agent");
        let r = ExecutionResult::aggregate(3, vec![ok(1), ok(2), failed], false, false);
        assert!(!r.success);
        assert_eq!(r.total, 3);
        assert_eq!(r.success_count, 2);
        assert_eq!(r.failed_count, 1);
    }

    #[test]
    fn test_aggregate_tolerant() {
        let failed = HostExecutionResult::dispatch_failed(HostId::new(2), "h2", None, "push failed");
        let r = ExecutionResult::aggregate(2, vec![ok(1), failed], false, true);
        assert!(r.success);
        assert_eq!(r.failed_count, 1);
    }

    #[test]
    fn test_aggregate_stopped_early_never_success() {
        let failed = HostExecutionResult::dispatch_failed(HostId::new(2), "h2", None, "boom");
        let r = ExecutionResult::aggregate(3, vec![ok(1), failed], true, false);
        assert!(!r.success);
        assert!(r.stopped_early);
    }
}
