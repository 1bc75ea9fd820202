//! Node entity.

use super::{generate_id, unix_timestamp, Endpoint, Entity, EntityError, EntityKind};
use serde::{Deserialize, Serialize};

/// A physical or virtual host that runs instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    /// Host name or URL of the machine.
    pub url: String,
    /// Capacity proxy. A weight of 0 excludes the node from selection.
    pub weight: u8,
    pub is_attached: bool,
    pub is_alive: bool,
    /// Creation time in Unix seconds.
    pub created_at: u64,
    /// Time of the last attach in Unix seconds.
    pub attached_since: Option<u64>,
}

impl Node {
    /// Create a detached node with a fresh ID. The name defaults to the ID.
    pub fn new(url: impl Into<String>, weight: u8) -> Self {
        let id = generate_id();
        Self {
            name: id.clone(),
            id,
            url: url.into(),
            weight,
            is_attached: false,
            is_alive: false,
            created_at: unix_timestamp(),
            attached_since: None,
        }
    }

    /// Mark the node as a load balancing target.
    pub fn attach(&mut self) {
        if !self.is_attached {
            self.is_attached = true;
            self.attached_since = Some(unix_timestamp());
        }
    }

    /// Remove the node as a load balancing target.
    pub fn detach(&mut self) {
        self.is_attached = false;
        self.attached_since = None;
    }

    /// The host name instances on this node inherit for bare-port addresses.
    pub fn host(&self) -> Result<String, EntityError> {
        Endpoint::parse(&self.url).map(|ep| ep.host().to_string())
    }
}

impl Entity for Node {
    const KIND: EntityKind = EntityKind::Node;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_defaults() {
        let node = Node::new("10.0.0.1", 3);
        assert_eq!(node.name, node.id);
        assert_eq!(node.weight, 3);
        assert!(!node.is_attached);
        assert!(!node.is_alive);
        assert!(node.attached_since.is_none());
    }

    #[test]
    fn test_attach_detach() {
        let mut node = Node::new("10.0.0.1", 1);
        node.attach();
        assert!(node.is_attached);
        let since = node.attached_since;
        assert!(since.is_some());

        // Attaching again keeps the original timestamp.
        node.attach();
        assert_eq!(node.attached_since, since);

        node.detach();
        assert!(!node.is_attached);
        assert!(node.attached_since.is_none());
    }

    #[test]
    fn test_node_host() {
        let node = Node::new("http://node-1.internal:2375", 1);
        assert_eq!(node.host().unwrap(), "node-1.internal");
    }
}
