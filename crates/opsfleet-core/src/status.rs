//! Status enums for agents, executions, steps and result records.

use serde::{Deserialize, Serialize};

/// Connection status of an agent as reported by the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Agent is connected and can accept tasks.
    Online,
    /// Agent is disconnected.
    #[default]
    Offline,
    /// Agent has registered but not yet completed enrollment.
    Pending,
    /// Agent has been administratively disabled.
    Disabled,
}

impl AgentStatus {
    /// Returns true if tasks can be pushed to this agent.
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Status of an execution record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Execution created but not yet dispatched.
    #[default]
    Pending,
    /// Execution actively dispatching or waiting on results.
    Running,
    /// All hosts completed successfully.
    Success,
    /// At least one host failed (or the run was aborted).
    Failed,
    /// Cancelled by user or system.
    Cancelled,
    /// Deadline elapsed before all results arrived.
    Timeout,
}

impl ExecutionStatus {
    /// Returns true if the execution is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }
}

/// Status of one step within an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step created but not yet started.
    #[default]
    Pending,
    /// Step actively executing.
    Running,
    /// Step completed on every selected host.
    Success,
    /// Step failed on at least one host.
    Failed,
    /// Step skipped (no eligible hosts, or an earlier step aborted).
    Skipped,
    /// Step deadline elapsed.
    Timeout,
}

impl StepStatus {
    /// Returns true if the step is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true if an in-place retry may target this step.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed | Self::Skipped | Self::Timeout)
    }
}

/// Terminal status carried by one result-stream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    /// Agent ran the task to completion (exit code may still be nonzero).
    Completed,
    /// Agent reported a failure before or during execution.
    Failed,
    /// Synthesized by the correlator when no record arrived in time.
    Timeout,
    /// Task was cancelled on the agent.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_online() {
        assert!(AgentStatus::Online.is_online());
        assert!(!AgentStatus::Pending.is_online());
        assert!(!AgentStatus::Disabled.is_online());
    }

    #[test]
    fn test_step_retryable() {
        assert!(StepStatus::Failed.is_retryable());
        assert!(StepStatus::Timeout.is_retryable());
        assert!(StepStatus::Skipped.is_retryable());
        assert!(!StepStatus::Success.is_retryable());
        assert!(!StepStatus::Running.is_retryable());
    }

    #[test]
    fn test_execution_terminal() {
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }
}
