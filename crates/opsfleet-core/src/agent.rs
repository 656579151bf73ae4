//! Agent endpoint descriptor.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, HostId};
use crate::status::AgentStatus;

/// A remote agent capable of executing task specs for one host.
///
/// Owned by the agent registry; the engine treats it as read-only for
/// the duration of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier.
    pub agent_id: AgentId,

    /// Host this agent runs on.
    pub host_id: HostId,

    /// Base URL of the agent-server relaying to this agent.
    pub endpoint: String,

    /// Current connection status.
    pub status: AgentStatus,
}

impl Agent {
    /// Create a new Agent.
    pub fn new(
        agent_id: impl Into<AgentId>,
        host_id: impl Into<HostId>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            host_id: host_id.into(),
            endpoint: endpoint.into(),
            status: AgentStatus::Offline,
        }
    }

    /// Builder method to set the status.
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }
}
