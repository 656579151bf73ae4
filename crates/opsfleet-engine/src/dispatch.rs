//! Task dispatch: push one spec to one agent endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use opsfleet_core::{Agent, TaskId, TaskSpec};

use crate::config::EngineConfig;
use crate::signing::{RequestSigner, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The HTTP client could not be constructed.
    #[error("http client: {0}")]
    Client(String),

    /// Network-level failure talking to the agent endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("agent endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outcome of one push attempt.
///
/// Push-level only: a successful push says the agent accepted the spec,
/// not that the task ran. Failures carry a human-readable `error` and
/// are never raised as faults.
#[derive(Debug, Clone)]
pub struct PushResult {
    /// Whether the agent accepted the spec.
    pub success: bool,

    /// Id of the pushed task.
    pub task_id: Option<TaskId>,

    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl PushResult {
    /// A successful push.
    pub fn accepted(task_id: TaskId) -> Self {
        Self {
            success: true,
            task_id: Some(task_id),
            error: None,
        }
    }

    /// A failed push.
    pub fn failed(task_id: Option<TaskId>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            task_id,
            error: Some(error.into()),
        }
    }
}

/// Pushes task specs to agents. No internal retry; retrying a failed
/// push is a caller concern.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Push one spec to one agent.
    async fn push(&self, agent: &Agent, spec: &TaskSpec) -> PushResult;

    /// Best-effort cancel of a previously dispatched task.
    async fn cancel(&self, agent: &Agent, task_id: &TaskId) -> Result<(), DispatchError>;
}

/// Success body of the push endpoint.
#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    task_id: String,
}

/// Dispatcher backed by the agent-server HTTP API with HMAC-signed
/// requests.
pub struct HttpDispatcher {
    http: reqwest::Client,
    signer: RequestSigner,
}

impl HttpDispatcher {
    /// Build a dispatcher with the engine's configured push timeout.
    pub fn from_config(
        signer: RequestSigner,
        config: &EngineConfig,
    ) -> Result<Self, DispatchError> {
        Self::new(signer, config.push_timeout)
    }

    /// Build a dispatcher with the given signer and per-push timeout.
    pub fn new(signer: RequestSigner, push_timeout: Duration) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(push_timeout)
            .build()
            .map_err(|e| DispatchError::Client(e.to_string()))?;
        Ok(Self { http, signer })
    }

    fn tasks_path(agent: &Agent) -> String {
        format!("/api/agents/{}/tasks", agent.agent_id)
    }

    fn base_url(agent: &Agent) -> &str {
        agent.endpoint.trim_end_matches('/')
    }

    async fn signed_post(
        &self,
        base: &str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, DispatchError> {
        let (timestamp, signature) = self.signer.headers("POST", path, &body);
        self.http
            .post(format!("{base}{path}"))
            .header("Content-Type", "application/json")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn push(&self, agent: &Agent, spec: &TaskSpec) -> PushResult {
        // Fail fast without a network call when the agent is not
        // reachable per the registry.
        if !agent.status.is_online() {
            return PushResult::failed(
                Some(spec.id.clone()),
                format!("agent {} is {:?}", agent.agent_id, agent.status),
            );
        }

        let body = match serde_json::to_vec(spec) {
            Ok(body) => body,
            Err(e) => {
                return PushResult::failed(
                    Some(spec.id.clone()),
                    format!("task spec serialization failed: {e}"),
                )
            }
        };

        let path = Self::tasks_path(agent);
        let response = match self.signed_post(Self::base_url(agent), &path, body).await {
            Ok(response) => response,
            Err(e) => {
                error!(task_id = %spec.id, agent_id = %agent.agent_id, error = %e, "task push failed");
                return PushResult::failed(Some(spec.id.clone()), format!("push failed: {e}"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = if body.is_empty() {
                format!("push rejected: HTTP {status}")
            } else {
                format!("push rejected: HTTP {status}: {body}")
            };
            error!(task_id = %spec.id, agent_id = %agent.agent_id, %error, "task push rejected");
            return PushResult::failed(Some(spec.id.clone()), error);
        }

        match response.json::<PushResponse>().await {
            Ok(accepted) => {
                debug!(
                    task_id = %spec.id,
                    agent_id = %agent.agent_id,
                    status = %accepted.status,
                    response_task_id = %accepted.task_id,
                    "task pushed to agent"
                );
                PushResult::accepted(spec.id.clone())
            }
            Err(e) => PushResult::failed(
                Some(spec.id.clone()),
                format!("malformed push response: {e}"),
            ),
        }
    }

    async fn cancel(&self, agent: &Agent, task_id: &TaskId) -> Result<(), DispatchError> {
        let path = format!("{}/{}/cancel", Self::tasks_path(agent), task_id);
        let response = self.signed_post(Self::base_url(agent), &path, Vec::new()).await?;

        let status = response.status();
        if status.is_success() {
            debug!(task_id = %task_id, agent_id = %agent.agent_id, "task cancel requested");
            Ok(())
        } else {
            Err(DispatchError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsfleet_core::{AgentStatus, ExecutionId, HostId, StepId, TaskKind};

    fn spec() -> TaskSpec {
        let step = StepId::main();
        TaskSpec {
            id: TaskId::compose(ExecutionId::from_raw(1), &step, HostId::new(2)).unwrap(),
            name: "t".into(),
            kind: TaskKind::Script,
            command: "echo hi".into(),
            script_type: Default::default(),
            args: Vec::new(),
            env: Default::default(),
            timeout_secs: 60,
            work_dir: String::new(),
            run_as: None,
            host_id: HostId::new(2),
            execution_id: ExecutionId::from_raw(1),
            step_id: step,
            retry_count: 0,
            parent_task_id: None,
            file_transfer: None,
        }
    }

    #[tokio::test]
    async fn test_push_offline_agent_fails_fast() {
        // Endpoint is unroutable; an offline agent must fail before
        // any network call, well inside the push timeout.
        let dispatcher = HttpDispatcher::new(
            RequestSigner::new("secret"),
            Duration::from_secs(30),
        )
        .unwrap();
        let agent = Agent::new("a1", 2u64, "http://192.0.2.1:9").with_status(AgentStatus::Offline);

        let started = std::time::Instant::now();
        let result = dispatcher.push(&agent, &spec()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Offline"));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
