//! Managed host reference.

use serde::{Deserialize, Serialize};

use crate::ids::HostId;

/// A managed host targeted by an execution.
///
/// Inventory (addresses, credentials, groups) lives outside the engine;
/// strategies only need the identity and a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Unique host identifier.
    pub id: HostId,

    /// Human-readable host name.
    pub name: String,
}

impl Host {
    /// Create a new Host.
    pub fn new(id: impl Into<HostId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
