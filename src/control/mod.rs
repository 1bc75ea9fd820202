//! Control plane: validated operations over nodes, services and instances.
//!
//! Every mutation is checked before anything is written, then applied to the
//! entity store and finally mirrored into the live service registry. Mutations
//! are serialized; reads go straight to the store and registry.

mod error;
mod info;
mod instance;
mod node;
mod service;

pub use error::ControlError;
pub use info::{InstanceInfo, NodeInfo, ServiceInfo};
pub use instance::InstanceOptions;
pub use node::NodeOptions;
pub use service::ServiceOptions;

use crate::config::Config;
use crate::entity::{is_url_safe, Deployment, Entity, EntityKind, Instance, Node, Service};
use crate::registry::{RegisteredService, ServiceRegistry};
use crate::store::{all, EntityStore, MemoryStore, Store};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Entry point for all topology changes.
pub struct Controller {
    store: Arc<dyn EntityStore>,
    registry: Arc<ServiceRegistry>,
    write_lock: Mutex<()>,
}

impl Controller {
    /// Create a controller over an empty in-memory store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            registry: Arc::new(ServiceRegistry::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a controller over an existing store, rebuilding the registry
    /// from its contents.
    ///
    /// Every stored service is registered with a fresh scheduler. Instances
    /// whose node is missing from the store are skipped.
    pub fn with_store(store: Arc<dyn EntityStore>) -> Result<Self, ControlError> {
        let registry = ServiceRegistry::new();
        let nodes = store.nodes().find(&all::<Node>)?;
        let instances = store.instances().find(&all::<Instance>)?;

        for service in store.services().find(&all::<Service>)? {
            let deployments: Vec<Deployment> = instances
                .iter()
                .filter(|i| i.service_id == service.id)
                .filter_map(|i| {
                    nodes
                        .iter()
                        .find(|n| n.id == i.node_id)
                        .map(|n| Deployment::new(n.clone(), i.clone()))
                })
                .collect();

            let registered = RegisteredService::build(service, deployments)?;
            registry.register_service(registered, false)?;
        }

        Ok(Self {
            store,
            registry: Arc::new(registry),
            write_lock: Mutex::new(()),
        })
    }

    /// Build the topology declared in a configuration file.
    ///
    /// Nodes, services and instances are created in that order through the
    /// regular operations, so the same validation applies.
    pub fn from_config(config: &Config) -> Result<Self, ControlError> {
        let controller = Self::new();

        for node in &config.nodes {
            controller.create_node(
                &node.url,
                NodeOptions {
                    name: node.name.clone(),
                    weight: node.weight,
                    attach: node.attach,
                },
            )?;
        }

        for service in &config.services {
            controller.create_service(
                &service.name,
                ServiceOptions {
                    routes: service.routes.clone(),
                    balancing_method: service.balancing_method,
                    target_version: service.target_version.clone(),
                    enable: service.enable,
                },
            )?;
        }

        for instance in &config.instances {
            controller.create_instance(
                &instance.service,
                &instance.node,
                &instance.address,
                InstanceOptions {
                    name: instance.name.clone(),
                    version: instance.version.clone(),
                    attach: instance.attach,
                },
            )?;
        }

        info!(
            nodes = config.nodes.len(),
            services = config.services.len(),
            instances = config.instances.len(),
            "topology bootstrapped"
        );
        Ok(controller)
    }

    /// The live registry the dispatcher and health checker read.
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// The backing entity store.
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a reference by ID, then by name, then by `fallback`.
fn resolve<E: Entity>(
    store: &dyn Store<E>,
    reference: &str,
    fallback: &dyn Fn(&E) -> bool,
) -> Result<E, ControlError> {
    if let Some(entity) = store.find_one(&|e: &E| e.id() == reference)? {
        return Ok(entity);
    }
    if let Some(entity) = store.find_one(&|e: &E| e.name() == reference)? {
        return Ok(entity);
    }
    store
        .find_one(fallback)?
        .ok_or_else(|| ControlError::not_found(E::KIND, reference))
}

/// Reject names containing anything but `[A-Za-z0-9_-]`.
fn validate_name(kind: EntityKind, name: &str) -> Result<(), ControlError> {
    if !is_url_safe(name) {
        return Err(ControlError::InvalidArgument(format!(
            "{} name '{}' may only contain letters, digits, '_' and '-'",
            kind, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstanceConfig, NodeConfig, ServiceConfig};
    use crate::error::ErrorKind;
    use crate::scheduler::BalancingMethod;

    fn topology() -> Config {
        let mut config = Config::default();
        config.nodes.push(NodeConfig {
            url: "10.0.0.1".to_string(),
            name: Some("node-1".to_string()),
            weight: 2,
            attach: true,
        });
        config.services.push(ServiceConfig {
            name: "api".to_string(),
            routes: vec!["api.example.com".to_string()],
            balancing_method: BalancingMethod::WeightedRoundRobin,
            target_version: None,
            enable: true,
        });
        config.instances.push(InstanceConfig {
            service: "api".to_string(),
            node: "node-1".to_string(),
            address: "8080".to_string(),
            name: Some("api-1".to_string()),
            version: "1.0".to_string(),
            attach: true,
        });
        config
    }

    #[test]
    fn test_from_config() {
        let controller = Controller::from_config(&topology()).unwrap();

        let entry = controller.registry().lookup_service("api.example.com").unwrap();
        let service = entry.read();
        assert!(service.entity().is_enabled);
        assert_eq!(service.deployments().len(), 1);

        let deployment = &service.deployments()[0];
        assert_eq!(deployment.node.name, "node-1");
        assert!(deployment.node.is_attached);
        assert_eq!(deployment.instance.address, "10.0.0.1:8080");
        assert!(deployment.instance.is_attached);
    }

    #[test]
    fn test_from_config_unknown_node() {
        let mut config = topology();
        config.instances[0].node = "node-2".to_string();

        let err = Controller::from_config(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_from_config_unsupported_method() {
        let mut config = topology();
        config.services[0].balancing_method = BalancingMethod::RoundRobin;

        let err = Controller::from_config(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnsupportedBalancingMethod);
    }

    #[test]
    fn test_with_store_rebuilds_registry() {
        let original = Controller::from_config(&topology()).unwrap();
        let rebuilt = Controller::with_store(Arc::clone(original.store())).unwrap();

        let entry = rebuilt.registry().lookup_service("api.example.com").unwrap();
        assert_eq!(entry.read().deployments().len(), 1);
        assert!(entry.read().scheduler().is_some());
    }

    #[test]
    fn test_resolve_order() {
        let controller = Controller::from_config(&topology()).unwrap();
        let by_name = controller.node_info("node-1").unwrap();
        let by_id = controller.node_info(&by_name.id).unwrap();
        let by_url = controller.node_info("10.0.0.1").unwrap();
        assert_eq!(by_name, by_id);
        assert_eq!(by_name, by_url);
    }
}
