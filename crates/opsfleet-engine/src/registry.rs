//! Agent registry seam.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use opsfleet_core::{Agent, HostId};

/// Resolves a logical host to its reachable agent, if any.
///
/// Inventory management owns the data; the engine only reads one
/// `Agent` per dispatch.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Look up the agent registered for a host.
    async fn resolve(&self, host_id: HostId) -> Option<Agent>;
}

/// In-memory registry for embedding and tests.
#[derive(Default)]
pub struct StaticRegistry {
    agents: RwLock<HashMap<HostId, Agent>>,
}

impl StaticRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the agent for its host.
    pub async fn insert(&self, agent: Agent) {
        self.agents.write().await.insert(agent.host_id, agent);
    }

    /// Remove the agent for a host.
    pub async fn remove(&self, host_id: HostId) -> Option<Agent> {
        self.agents.write().await.remove(&host_id)
    }
}

#[async_trait]
impl AgentRegistry for StaticRegistry {
    async fn resolve(&self, host_id: HostId) -> Option<Agent> {
        self.agents.read().await.get(&host_id).cloned()
    }
}
