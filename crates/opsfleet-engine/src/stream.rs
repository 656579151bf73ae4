//! Result stream seam.
//!
//! The result stream is an external, ordered, append-only log keyed by
//! a well-known stream name. Reads take an explicit cursor ("records
//! after X") and a bounded block duration; they never consume, so any
//! number of independent waiters can cover overlapping ranges.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

use opsfleet_core::TaskResultRecord;

/// Stream read errors. Transient by design: waiters back off and
/// retry rather than failing a whole wait.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream read failed: {0}")]
    Read(String),
}

/// Position in the result stream. `Default` is the stream start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct StreamCursor(u64);

impl StreamCursor {
    /// Cursor at the start of the stream.
    pub fn start() -> Self {
        Self(0)
    }

    /// Raw offset: the number of records before this cursor.
    pub fn offset(&self) -> u64 {
        self.0
    }
}

impl From<u64> for StreamCursor {
    fn from(offset: u64) -> Self {
        Self(offset)
    }
}

/// Reader over the external result stream.
#[async_trait]
pub trait ResultStream: Send + Sync {
    /// Cursor positioned after the newest record currently appended.
    async fn tail(&self) -> StreamCursor;

    /// Read up to `max` records after `after`, blocking up to `block`
    /// when none are available yet. Each returned pair carries the
    /// cursor positioned after that record.
    async fn read(
        &self,
        after: StreamCursor,
        max: usize,
        block: Duration,
    ) -> Result<Vec<(StreamCursor, TaskResultRecord)>, StreamError>;
}

/// In-memory result stream for embedding and tests. Agents (or a test
/// harness standing in for them) append; waiters are woken via
/// [`Notify`].
#[derive(Default)]
pub struct MemoryResultStream {
    records: Mutex<Vec<TaskResultRecord>>,
    appended: Notify,
}

impl MemoryResultStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record, waking any blocked readers.
    pub fn append(&self, record: TaskResultRecord) -> StreamCursor {
        let cursor = {
            let mut records = self.records.lock().expect("stream lock poisoned");
            records.push(record);
            StreamCursor(records.len() as u64)
        };
        self.appended.notify_waiters();
        cursor
    }

    fn read_available(
        &self,
        after: StreamCursor,
        max: usize,
    ) -> Vec<(StreamCursor, TaskResultRecord)> {
        let records = self.records.lock().expect("stream lock poisoned");
        let start = after.0 as usize;
        records
            .iter()
            .enumerate()
            .skip(start)
            .take(max)
            .map(|(i, record)| (StreamCursor(i as u64 + 1), record.clone()))
            .collect()
    }
}

#[async_trait]
impl ResultStream for MemoryResultStream {
    async fn tail(&self) -> StreamCursor {
        let records = self.records.lock().expect("stream lock poisoned");
        StreamCursor(records.len() as u64)
    }

    async fn read(
        &self,
        after: StreamCursor,
        max: usize,
        block: Duration,
    ) -> Result<Vec<(StreamCursor, TaskResultRecord)>, StreamError> {
        let deadline = Instant::now() + block;
        loop {
            // Register interest before checking, so an append between
            // the check and the await cannot be missed.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.read_available(after, max);
            if !batch.is_empty() {
                return Ok(batch);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsfleet_core::{TaskId, TaskResultStatus};

    fn record(task: &str) -> TaskResultRecord {
        TaskResultRecord {
            task_id: TaskId::from(task),
            agent_id: None,
            host_id: None,
            status: TaskResultStatus::Completed,
            exit_code: Some(0),
            error_msg: String::new(),
            started_at: None,
            finished_at: None,
            log_pointer: String::new(),
            log_size: 0,
        }
    }

    #[tokio::test]
    async fn test_read_after_cursor() {
        let stream = MemoryResultStream::new();
        stream.append(record("1_main_1_aaaaaaaa"));
        let mid = stream.tail().await;
        stream.append(record("1_main_2_bbbbbbbb"));

        let batch = stream
            .read(mid, 10, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].1.task_id.as_str(), "1_main_2_bbbbbbbb");
    }

    #[tokio::test]
    async fn test_read_does_not_consume() {
        let stream = MemoryResultStream::new();
        stream.append(record("1_main_1_aaaaaaaa"));

        let a = stream
            .read(StreamCursor::start(), 10, Duration::from_millis(1))
            .await
            .unwrap();
        let b = stream
            .read(StreamCursor::start(), 10, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_blocking_read_woken_by_append() {
        let stream = std::sync::Arc::new(MemoryResultStream::new());

        let reader = {
            let stream = stream.clone();
            tokio::spawn(async move {
                stream
                    .read(StreamCursor::start(), 10, Duration::from_secs(5))
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.append(record("1_main_1_aaaaaaaa"));

        let batch = reader.await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_blocking_read_times_out_empty() {
        let stream = MemoryResultStream::new();
        let batch = stream
            .read(StreamCursor::start(), 10, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }
}
