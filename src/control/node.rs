//! Node operations.

use super::{resolve, validate_name, ControlError, Controller, NodeInfo};
use crate::entity::{Endpoint, EntityKind, Instance, Node};
use tracing::info;

/// Options for `Controller::create_node`.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Unique name; the generated ID is used when absent
    pub name: Option<String>,
    /// Weight for weighted round robin
    pub weight: u8,
    /// Attach the node right away
    pub attach: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            name: None,
            weight: 1,
            attach: false,
        }
    }
}

impl Controller {
    /// Register a new node.
    ///
    /// # Arguments
    ///
    /// * `url` - Host name or URL; it must contain a host
    /// * `options` - Name, weight and attach flag
    pub fn create_node(&self, url: &str, options: NodeOptions) -> Result<NodeInfo, ControlError> {
        let _guard = self.write_lock.lock();

        let url = url.trim();
        if Endpoint::parse(url)?.host().is_empty() {
            return Err(ControlError::InvalidArgument(format!(
                "node URL '{}' has no host",
                url
            )));
        }

        let mut node = Node::new(url, options.weight);
        if let Some(name) = options.name.filter(|n| !n.is_empty()) {
            validate_name(EntityKind::Node, &name)?;
            node.name = name;
        }

        let nodes = self.store.nodes();
        let clash = nodes.find_one(&|n: &Node| {
            n.id == node.id || n.name == node.name || n.url == node.url
        })?;
        if let Some(existing) = clash {
            let (field, value) = if existing.id == node.id {
                ("id", &node.id)
            } else if existing.name == node.name {
                ("name", &node.name)
            } else {
                ("url", &node.url)
            };
            return Err(ControlError::already_exists(EntityKind::Node, field, value));
        }

        if options.attach {
            node.attach();
        }
        nodes.create(node.clone())?;

        info!(
            node = %node.name,
            id = %node.id,
            url = %node.url,
            weight = node.weight,
            attached = node.is_attached,
            "node created"
        );
        Ok(NodeInfo::new(&node, false))
    }

    /// Attach a node so its deployments count as attached.
    pub fn attach_node(&self, reference: &str) -> Result<NodeInfo, ControlError> {
        self.set_node_attached(reference, true)
    }

    /// Detach a node. Its deployments become removable.
    pub fn detach_node(&self, reference: &str) -> Result<NodeInfo, ControlError> {
        self.set_node_attached(reference, false)
    }

    pub fn node_info(&self, reference: &str) -> Result<NodeInfo, ControlError> {
        let node = self.find_node(reference)?;
        Ok(NodeInfo::new(&node, self.node_is_alive(&node.id)))
    }

    /// List nodes; only attached ones unless `all` is set.
    pub fn list_nodes(&self, all: bool) -> Result<Vec<NodeInfo>, ControlError> {
        let nodes = self.store.nodes().find(&|n: &Node| all || n.is_attached)?;
        Ok(nodes
            .iter()
            .map(|n| NodeInfo::new(n, self.node_is_alive(&n.id)))
            .collect())
    }

    /// Remove a node.
    ///
    /// Fails with `NotRemovable` while instances are deployed on the node.
    /// A forced removal deletes those instances and their deployments first.
    pub fn remove_node(&self, reference: &str, force: bool) -> Result<(), ControlError> {
        let _guard = self.write_lock.lock();

        let node = self.find_node(reference)?;
        let instances = self
            .store
            .instances()
            .find(&|i: &Instance| i.node_id == node.id)?;

        if !instances.is_empty() && !force {
            return Err(ControlError::NotRemovable {
                kind: EntityKind::Node,
                reference: reference.to_string(),
                reason: format!("{} instance(s) are deployed on it", instances.len()),
            });
        }

        for instance in &instances {
            self.remove_deployed_instance(instance, true)?;
        }
        self.store.nodes().delete(&node.id)?;

        info!(node = %node.name, id = %node.id, instances = instances.len(), "node removed");
        Ok(())
    }

    fn set_node_attached(&self, reference: &str, attached: bool) -> Result<NodeInfo, ControlError> {
        let _guard = self.write_lock.lock();

        let mut node = self.find_node(reference)?;
        if attached {
            node.attach();
        } else {
            node.detach();
        }
        self.store.nodes().update(&node)?;

        self.registry.update_nodes::<ControlError, _>(|n| {
            if n.id == node.id {
                n.is_attached = node.is_attached;
                n.attached_since = node.attached_since;
            }
            Ok(())
        })?;

        info!(node = %node.name, id = %node.id, attached, "node attachment changed");
        Ok(NodeInfo::new(&node, self.node_is_alive(&node.id)))
    }

    pub(super) fn find_node(&self, reference: &str) -> Result<Node, ControlError> {
        resolve(self.store.nodes(), reference, &|n: &Node| n.url == reference)
    }

    /// A node counts as alive while any instance deployed on it is.
    fn node_is_alive(&self, node_id: &str) -> bool {
        self.registry.services().iter().any(|entry| {
            entry
                .read()
                .deployments()
                .iter()
                .any(|d| d.node.id == node_id && d.instance.is_alive)
        })
    }
}
