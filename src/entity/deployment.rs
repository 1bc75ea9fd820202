//! Deployment: the (node, instance) pair schedulers select over.

use super::{Instance, Node};

/// One instance together with the node hosting it.
///
/// Equality only considers the node ID and instance ID.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub node: Node,
    pub instance: Instance,
}

impl Deployment {
    pub fn new(node: Node, instance: Instance) -> Self {
        Self { node, instance }
    }

    /// Whether this deployment pairs the given node and instance.
    pub fn matches(&self, node_id: &str, instance_id: &str) -> bool {
        self.node.id == node_id && self.instance.id == instance_id
    }

    /// A deployment may be dropped unless it is live on both ends.
    pub fn is_removable(&self) -> bool {
        !self.node.is_attached || !self.instance.is_attached
    }
}

impl PartialEq for Deployment {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.node.id, &other.instance.id)
    }
}

impl Eq for Deployment {}
