//! Result-stream correlator.
//!
//! Matches asynchronous completion records against outstanding task
//! ids. The pending set is local to each wait call; nothing is shared
//! across invocations, so concurrent waits never contend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use opsfleet_core::{TaskId, TaskResultRecord};

use crate::config::EngineConfig;
use crate::stream::{ResultStream, StreamCursor};

/// Correlates result-stream records with waiting callers.
#[derive(Clone)]
pub struct ResultCorrelator {
    stream: Arc<dyn ResultStream>,
    poll_interval: Duration,
    read_batch: usize,
}

impl ResultCorrelator {
    /// Create a correlator over the given stream.
    pub fn new(stream: Arc<dyn ResultStream>, config: &EngineConfig) -> Self {
        Self {
            stream,
            poll_interval: config.poll_interval,
            read_batch: config.read_batch,
        }
    }

    /// Wait for a single task's result. Synthesizes a timeout record
    /// when nothing arrives in time; never blocks past `timeout`.
    pub async fn wait_for(&self, task_id: &TaskId, timeout: Duration) -> TaskResultRecord {
        let from = self.stream.tail().await;
        self.wait_for_from(from, task_id, timeout).await
    }

    /// [`wait_for`](Self::wait_for) reading from an explicit cursor.
    pub async fn wait_for_from(
        &self,
        from: StreamCursor,
        task_id: &TaskId,
        timeout: Duration,
    ) -> TaskResultRecord {
        let mut results = self
            .wait_for_all_from(from, std::slice::from_ref(task_id), timeout)
            .await;
        results
            .remove(task_id)
            .unwrap_or_else(|| TaskResultRecord::timed_out(task_id.clone(), timeout.as_secs()))
    }

    /// Wait for every id in `task_ids`, with one shared deadline.
    ///
    /// Always returns an entry per requested id: real records where
    /// they arrived, synthetic timeout records for the rest. An empty
    /// id set returns immediately.
    pub async fn wait_for_all(
        &self,
        task_ids: &[TaskId],
        timeout: Duration,
    ) -> HashMap<TaskId, TaskResultRecord> {
        let from = self.stream.tail().await;
        self.wait_for_all_from(from, task_ids, timeout).await
    }

    /// [`wait_for_all`](Self::wait_for_all) reading from an explicit
    /// cursor. Callers that push before waiting capture the cursor
    /// first so no record can slip between push and wait.
    pub async fn wait_for_all_from(
        &self,
        from: StreamCursor,
        task_ids: &[TaskId],
        timeout: Duration,
    ) -> HashMap<TaskId, TaskResultRecord> {
        let mut pending: HashSet<TaskId> = task_ids.iter().cloned().collect();
        let mut results = HashMap::with_capacity(pending.len());
        if pending.is_empty() {
            return results;
        }

        info!(tasks = pending.len(), timeout_secs = timeout.as_secs(), "waiting for task results");

        let deadline = Instant::now() + timeout;
        let mut cursor = from;

        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let block = remaining.min(self.poll_interval);

            match self.stream.read(cursor, self.read_batch, block).await {
                Ok(batch) => {
                    for (position, record) in batch {
                        cursor = position;
                        if pending.remove(&record.task_id) {
                            debug!(
                                task_id = %record.task_id,
                                status = ?record.status,
                                pending = pending.len(),
                                "task result resolved"
                            );
                            results.insert(record.task_id.clone(), record);
                        }
                    }
                }
                Err(e) => {
                    // Transient read errors never fail the wait.
                    warn!(error = %e, "result stream read failed, backing off");
                    let backoff = deadline
                        .saturating_duration_since(Instant::now())
                        .min(self.poll_interval);
                    if backoff.is_zero() {
                        break;
                    }
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        for task_id in pending {
            warn!(task_id = %task_id, timeout_secs = timeout.as_secs(), "task result wait timed out");
            results.insert(
                task_id.clone(),
                TaskResultRecord::timed_out(task_id, timeout.as_secs()),
            );
        }

        results
    }
}
