//! Identifiers: numeric execution ids and the composite task id.
//!
//! A [`TaskId`] embeds its origin (`execution_id`, `step_id`, `host_id`)
//! so any process holding only the id string can correlate a result
//! record back to the request that caused it, without a lookup table.

use std::fmt;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Delimiter between task-id fields. Step ids may not contain it.
const TASK_ID_DELIM: char = '_';

/// Unique identifier for an execution (one strategy invocation chain).
///
/// Snowflake-style composite: 41 bits of millisecond timestamp (epoch
/// 2024-01-01), 10 bits of worker id, 12 bits of sequence. Numeric so it
/// sorts by creation time and fits the task-id encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(u64);

impl ExecutionId {
    /// Wrap a raw id value.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Decode the id back into its timestamp/worker/sequence parts.
    pub fn parse(&self) -> ExecutionIdParts {
        ExecutionIdParts {
            timestamp_ms: (self.0 >> ExecutionIdGenerator::TIMESTAMP_SHIFT)
                + ExecutionIdGenerator::EPOCH_MS,
            worker_id: ((self.0 >> ExecutionIdGenerator::WORKER_SHIFT)
                & ExecutionIdGenerator::MAX_WORKER_ID as u64) as u16,
            sequence: (self.0 & ExecutionIdGenerator::MAX_SEQUENCE as u64) as u16,
        }
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ExecutionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Decoded parts of an [`ExecutionId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionIdParts {
    /// Milliseconds since the unix epoch.
    pub timestamp_ms: u64,
    /// Generating worker node.
    pub worker_id: u16,
    /// Per-millisecond sequence number.
    pub sequence: u16,
}

/// Generates globally unique [`ExecutionId`]s for one worker node.
///
/// Thread-safe; callers share one instance per process.
pub struct ExecutionIdGenerator {
    worker_id: u16,
    state: Mutex<GeneratorState>,
}

struct GeneratorState {
    last_timestamp: u64,
    sequence: u16,
}

impl ExecutionIdGenerator {
    const TIMESTAMP_BITS: u32 = 41;
    const WORKER_BITS: u32 = 10;
    const SEQUENCE_BITS: u32 = 12;

    const WORKER_SHIFT: u32 = Self::SEQUENCE_BITS;
    const TIMESTAMP_SHIFT: u32 = Self::SEQUENCE_BITS + Self::WORKER_BITS;

    const MAX_WORKER_ID: u16 = (1 << Self::WORKER_BITS) - 1;
    const MAX_SEQUENCE: u16 = (1 << Self::SEQUENCE_BITS) - 1;

    /// 2024-01-01T00:00:00Z in unix milliseconds.
    const EPOCH_MS: u64 = 1_704_067_200_000;

    /// Create a generator for the given worker node.
    pub fn new(worker_id: u16) -> Result<Self, CoreError> {
        if worker_id > Self::MAX_WORKER_ID {
            return Err(CoreError::WorkerIdOutOfRange {
                got: worker_id,
                max: Self::MAX_WORKER_ID,
            });
        }
        Ok(Self {
            worker_id,
            state: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        })
    }

    /// Generate the next execution id.
    ///
    /// If the sequence overflows within one millisecond the call spins
    /// until the next millisecond. Fails if the clock moved backwards
    /// (including behind the generator epoch).
    pub fn generate(&self) -> Result<ExecutionId, CoreError> {
        self.generate_at(Self::now_ms())
    }

    fn generate_at(&self, mut timestamp: u64) -> Result<ExecutionId, CoreError> {
        let mut state = self.state.lock().expect("id generator lock poisoned");

        if timestamp < state.last_timestamp {
            return Err(CoreError::ClockRollback);
        }

        if timestamp == state.last_timestamp {
            state.sequence = state.sequence.wrapping_add(1) & Self::MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond.
                while timestamp <= state.last_timestamp {
                    timestamp = Self::now_ms();
                }
            }
        } else {
            state.sequence = 0;
        }

        let offset = timestamp
            .checked_sub(Self::EPOCH_MS)
            .ok_or(CoreError::ClockRollback)?;
        state.last_timestamp = timestamp;

        let id = (offset << Self::TIMESTAMP_SHIFT)
            | ((self.worker_id as u64) << Self::WORKER_SHIFT)
            | state.sequence as u64;

        Ok(ExecutionId(id))
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Identifier of one step within an execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(String);

impl StepId {
    /// Create a new StepId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The implicit step id for single-step executions.
    pub fn main() -> Self {
        Self("main".to_string())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Numeric identifier for a managed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(u64);

impl HostId {
    /// Wrap a raw id value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for HostId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Unique identifier for an agent process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new AgentId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random AgentId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Composite task identifier: `{execution_id}_{step_id}_{host_id}_{suffix}`.
///
/// The random 8-hex-char suffix keeps retried dispatches to the same
/// host distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

/// The origin fields decoded from a [`TaskId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIdParts {
    pub execution_id: ExecutionId,
    pub step_id: StepId,
    pub host_id: HostId,
}

impl TaskId {
    /// Compose a task id from its origin fields plus a random suffix.
    pub fn compose(
        execution_id: ExecutionId,
        step_id: &StepId,
        host_id: HostId,
    ) -> Result<Self, CoreError> {
        if step_id.as_str().is_empty() || step_id.as_str().contains(TASK_ID_DELIM) {
            return Err(CoreError::InvalidStepId(step_id.as_str().to_string()));
        }
        let suffix = Uuid::new_v4().simple().to_string();
        Ok(Self(format!(
            "{execution_id}{TASK_ID_DELIM}{step_id}{TASK_ID_DELIM}{host_id}{TASK_ID_DELIM}{}",
            &suffix[..8]
        )))
    }

    /// Decode the id back into `{execution_id, step_id, host_id}`.
    ///
    /// Requires exactly four delimiter-separated fields with numeric
    /// execution and host ids; anything else is malformed.
    pub fn decode(&self) -> Result<TaskIdParts, CoreError> {
        let parts: Vec<&str> = self.0.split(TASK_ID_DELIM).collect();
        if parts.len() != 4 {
            return Err(CoreError::MalformedTaskId(self.0.clone()));
        }
        let execution_id: u64 = parts[0]
            .parse()
            .map_err(|_| CoreError::MalformedTaskId(self.0.clone()))?;
        let host_id: u64 = parts[2]
            .parse()
            .map_err(|_| CoreError::MalformedTaskId(self.0.clone()))?;
        if parts[1].is_empty() || parts[3].is_empty() {
            return Err(CoreError::MalformedTaskId(self.0.clone()));
        }
        Ok(TaskIdParts {
            execution_id: ExecutionId(execution_id),
            step_id: StepId::new(parts[1]),
            host_id: HostId(host_id),
        })
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_id_generate_unique() {
        let gen = ExecutionIdGenerator::new(1).unwrap();
        let a = gen.generate().unwrap();
        let b = gen.generate().unwrap();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_execution_id_parse_round_trip() {
        let gen = ExecutionIdGenerator::new(42).unwrap();
        let id = gen.generate().unwrap();
        let parts = id.parse();
        assert_eq!(parts.worker_id, 42);
        assert!(parts.timestamp_ms >= ExecutionIdGenerator::EPOCH_MS);
    }

    #[test]
    fn test_worker_id_out_of_range() {
        assert!(ExecutionIdGenerator::new(1024).is_err());
        assert!(ExecutionIdGenerator::new(1023).is_ok());
    }

    #[test]
    fn test_pre_epoch_clock_is_a_rollback() {
        let gen = ExecutionIdGenerator::new(1).unwrap();
        // A clock answering before the generator epoch must not wrap.
        assert!(matches!(
            gen.generate_at(ExecutionIdGenerator::EPOCH_MS - 1),
            Err(CoreError::ClockRollback)
        ));
        assert!(matches!(gen.generate_at(0), Err(CoreError::ClockRollback)));
    }

    #[test]
    fn test_clock_rollback_between_calls() {
        let gen = ExecutionIdGenerator::new(1).unwrap();
        gen.generate_at(ExecutionIdGenerator::EPOCH_MS + 10).unwrap();
        assert!(matches!(
            gen.generate_at(ExecutionIdGenerator::EPOCH_MS + 5),
            Err(CoreError::ClockRollback)
        ));
    }

    #[test]
    fn test_task_id_round_trip() {
        let execution_id = ExecutionId::from_raw(123456789);
        let step_id = StepId::new("step-1");
        let host_id = HostId::new(42);

        let task_id = TaskId::compose(execution_id, &step_id, host_id).unwrap();
        let parts = task_id.decode().unwrap();

        assert_eq!(parts.execution_id, execution_id);
        assert_eq!(parts.step_id, step_id);
        assert_eq!(parts.host_id, host_id);
    }

    #[test]
    fn test_task_id_suffix_unique() {
        let execution_id = ExecutionId::from_raw(1);
        let step_id = StepId::main();
        let a = TaskId::compose(execution_id, &step_id, HostId::new(1)).unwrap();
        let b = TaskId::compose(execution_id, &step_id, HostId::new(1)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_task_id_rejects_delimiter_in_step() {
        let err = TaskId::compose(ExecutionId::from_raw(1), &StepId::new("a_b"), HostId::new(1));
        assert!(matches!(err, Err(CoreError::InvalidStepId(_))));
    }

    #[test]
    fn test_task_id_decode_rejects_wrong_field_count() {
        assert!(TaskId::from("1_main_2").decode().is_err());
        assert!(TaskId::from("1_main_2_ab_cd").decode().is_err());
        assert!(TaskId::from("x_main_2_abcd1234").decode().is_err());
        assert!(TaskId::from("1_main_y_abcd1234").decode().is_err());
    }
}
