//! Instance entity.

use super::{generate_id, unix_timestamp, Entity, EntityKind};
use serde::{Deserialize, Serialize};

/// One running copy of a service on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub service_id: String,
    pub node_id: String,
    /// Dialable `host:port` of the instance.
    pub address: String,
    pub version: String,
    pub is_attached: bool,
    /// Set by the health checker.
    pub is_alive: bool,
    pub created_at: u64,
    pub attached_since: Option<u64>,
}

impl Instance {
    /// Create a detached, not yet probed instance. The name defaults to the ID.
    pub fn new(
        service_id: impl Into<String>,
        node_id: impl Into<String>,
        address: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let id = generate_id();
        Self {
            name: id.clone(),
            id,
            service_id: service_id.into(),
            node_id: node_id.into(),
            address: address.into(),
            version: version.into(),
            is_attached: false,
            is_alive: false,
            created_at: unix_timestamp(),
            attached_since: None,
        }
    }

    /// Make the instance eligible for selection.
    pub fn attach(&mut self) {
        if !self.is_attached {
            self.is_attached = true;
            self.attached_since = Some(unix_timestamp());
        }
    }

    /// Make the instance ineligible for selection.
    pub fn detach(&mut self) {
        self.is_attached = false;
        self.attached_since = None;
    }

    /// Whether a scheduler may pick this instance.
    pub fn is_eligible(&self) -> bool {
        self.is_attached && self.is_alive
    }
}

impl Entity for Instance {
    const KIND: EntityKind = EntityKind::Instance;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}
