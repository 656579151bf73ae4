//! Task builders: pure construction of immutable task specs.

use std::collections::HashMap;
use std::time::Duration;

use opsfleet_core::{
    CoreError, ExecutionId, FileTransferSpec, Host, ScriptType, StepId, TaskId, TaskKind, TaskSpec,
};

/// Builds one task spec per target host.
///
/// Pure: no I/O, no shared-state mutation. A builder must reject specs
/// whose required payload is missing rather than dispatch them.
pub trait TaskBuilder: Send + Sync {
    /// Build a spec targeting `host`.
    fn build(&self, host: &Host) -> Result<TaskSpec, CoreError>;
}

/// Correlation identity and common knobs shared by every spec one
/// strategy invocation produces.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Originating execution.
    pub execution_id: ExecutionId,

    /// Originating step.
    pub step_id: StepId,

    /// Task display name.
    pub name: String,

    /// Per-task execution timeout.
    pub timeout: Duration,

    /// How many times this work item has been retried.
    pub retry_count: u32,

    /// Original task id when re-dispatching a retry.
    pub parent_task_id: Option<TaskId>,
}

impl ExecutionContext {
    /// Create a context for one execution step.
    pub fn new(execution_id: ExecutionId, step_id: StepId) -> Self {
        Self {
            execution_id,
            step_id,
            name: String::new(),
            timeout: Duration::from_secs(300),
            retry_count: 0,
            parent_task_id: None,
        }
    }

    /// Builder method to set the task display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method to set the per-task timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder method to mark a retry of an earlier dispatch.
    pub fn with_retry(mut self, retry_count: u32, parent_task_id: Option<TaskId>) -> Self {
        self.retry_count = retry_count;
        self.parent_task_id = parent_task_id;
        self
    }
}

/// Builds script tasks.
pub struct ScriptTaskBuilder {
    ctx: ExecutionContext,
    content: String,
    script_type: ScriptType,
    args: Vec<String>,
    env: HashMap<String, String>,
    work_dir: String,
    run_as: Option<String>,
}

impl ScriptTaskBuilder {
    /// Create a builder for the given script content.
    pub fn new(ctx: ExecutionContext, content: impl Into<String>) -> Self {
        Self {
            ctx,
            content: content.into(),
            script_type: ScriptType::default(),
            args: Vec::new(),
            env: HashMap::new(),
            work_dir: String::new(),
            run_as: None,
        }
    }

    /// Builder method to set the interpreter.
    pub fn with_script_type(mut self, script_type: ScriptType) -> Self {
        self.script_type = script_type;
        self
    }

    /// Builder method to set positional arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Builder method to set environment variables.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Builder method to set the working directory.
    pub fn with_work_dir(mut self, work_dir: impl Into<String>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Builder method to set the user the script runs as.
    pub fn with_run_as(mut self, run_as: impl Into<String>) -> Self {
        self.run_as = Some(run_as.into());
        self
    }
}

impl TaskBuilder for ScriptTaskBuilder {
    fn build(&self, host: &Host) -> Result<TaskSpec, CoreError> {
        if self.content.trim().is_empty() {
            return Err(CoreError::MissingField("script content"));
        }
        let id = TaskId::compose(self.ctx.execution_id, &self.ctx.step_id, host.id)?;
        Ok(TaskSpec {
            id,
            name: self.ctx.name.clone(),
            kind: TaskKind::Script,
            command: self.content.clone(),
            script_type: self.script_type,
            args: self.args.clone(),
            env: self.env.clone(),
            timeout_secs: self.ctx.timeout.as_secs(),
            work_dir: self.work_dir.clone(),
            run_as: self.run_as.clone(),
            host_id: host.id,
            execution_id: self.ctx.execution_id,
            step_id: self.ctx.step_id.clone(),
            retry_count: self.ctx.retry_count,
            parent_task_id: self.ctx.parent_task_id.clone(),
            file_transfer: None,
        })
    }
}

/// Builds file-transfer tasks.
pub struct FileTransferTaskBuilder {
    ctx: ExecutionContext,
    transfer: FileTransferSpec,
}

impl FileTransferTaskBuilder {
    /// Create a builder for the given transfer parameters.
    pub fn new(ctx: ExecutionContext, transfer: FileTransferSpec) -> Self {
        Self { ctx, transfer }
    }
}

impl TaskBuilder for FileTransferTaskBuilder {
    fn build(&self, host: &Host) -> Result<TaskSpec, CoreError> {
        if self.transfer.remote_path.trim().is_empty() {
            return Err(CoreError::MissingField("remote_path"));
        }
        let id = TaskId::compose(self.ctx.execution_id, &self.ctx.step_id, host.id)?;
        Ok(TaskSpec {
            id,
            name: self.ctx.name.clone(),
            kind: TaskKind::FileTransfer,
            command: String::new(),
            script_type: ScriptType::default(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: self.ctx.timeout.as_secs(),
            work_dir: String::new(),
            run_as: None,
            host_id: host.id,
            execution_id: self.ctx.execution_id,
            step_id: self.ctx.step_id.clone(),
            retry_count: self.ctx.retry_count,
            parent_task_id: self.ctx.parent_task_id.clone(),
            file_transfer: Some(self.transfer.clone()),
        })
    }
}
