//! Instance operations.

use super::{resolve, validate_name, ControlError, Controller, InstanceInfo};
use crate::entity::{Deployment, Endpoint, EntityKind, Instance, Node};
use tracing::info;

/// Options for `Controller::create_instance`.
#[derive(Debug, Clone, Default)]
pub struct InstanceOptions {
    /// Name, unique within the service; the generated ID is used when absent
    pub name: Option<String>,
    /// Version tag of the deployed code
    pub version: String,
    /// Attach the instance right away
    pub attach: bool,
}

impl Controller {
    /// Register an instance of a service on a node and deploy it.
    ///
    /// # Arguments
    ///
    /// * `service_ref` - ID, name or route of the service
    /// * `node_ref` - ID, name or URL of the node
    /// * `address` - `host:port`, a URL, or a bare port on the node's host
    /// * `options` - Name, version and attach flag
    pub fn create_instance(
        &self,
        service_ref: &str,
        node_ref: &str,
        address: &str,
        options: InstanceOptions,
    ) -> Result<InstanceInfo, ControlError> {
        let _guard = self.write_lock.lock();

        let service = self.find_service(service_ref)?;
        let node = self.find_node(node_ref)?;
        let address = instance_address(&node, address)?;

        let mut instance = Instance::new(&service.id, &node.id, address, options.version.trim());
        if let Some(name) = options.name.filter(|n| !n.is_empty()) {
            validate_name(EntityKind::Instance, &name)?;
            instance.name = name;
        }

        let instances = self.store.instances();
        let clash = instances.find_one(&|i: &Instance| {
            i.id == instance.id
                || (i.service_id == instance.service_id && i.name == instance.name)
                || (i.node_id == instance.node_id && i.address == instance.address)
        })?;
        if let Some(existing) = clash {
            let (field, value) = if existing.id == instance.id {
                ("id", &instance.id)
            } else if existing.address == instance.address && existing.node_id == instance.node_id {
                ("address", &instance.address)
            } else {
                ("name", &instance.name)
            };
            return Err(ControlError::already_exists(EntityKind::Instance, field, value));
        }

        if options.attach {
            instance.attach();
        }
        instances.create(instance.clone())?;
        self.registry
            .register_deployment(Deployment::new(node, instance.clone()))?;

        info!(
            instance = %instance.name,
            id = %instance.id,
            service = %service.name,
            address = %instance.address,
            version = %instance.version,
            attached = instance.is_attached,
            "instance created"
        );
        Ok(InstanceInfo::new(&instance, false))
    }

    /// Attach an instance so the scheduler may select it.
    pub fn attach_instance(&self, reference: &str) -> Result<InstanceInfo, ControlError> {
        self.set_instance_attached(reference, true)
    }

    /// Detach an instance; it receives no new requests.
    pub fn detach_instance(&self, reference: &str) -> Result<InstanceInfo, ControlError> {
        self.set_instance_attached(reference, false)
    }

    pub fn instance_info(&self, reference: &str) -> Result<InstanceInfo, ControlError> {
        let instance = self.find_instance(reference)?;
        Ok(self.instance_info_of(&instance))
    }

    /// List instances; only attached ones unless `all` is set.
    pub fn list_instances(&self, all: bool) -> Result<Vec<InstanceInfo>, ControlError> {
        let instances = self
            .store
            .instances()
            .find(&|i: &Instance| all || i.is_attached)?;
        Ok(instances.iter().map(|i| self.instance_info_of(i)).collect())
    }

    /// Remove an instance and its deployment.
    ///
    /// Without `force`, fails while both the instance and its node are
    /// attached.
    pub fn remove_instance(&self, reference: &str, force: bool) -> Result<(), ControlError> {
        let _guard = self.write_lock.lock();

        let instance = self.find_instance(reference)?;
        self.remove_deployed_instance(&instance, force)?;

        info!(instance = %instance.name, id = %instance.id, force, "instance removed");
        Ok(())
    }

    /// Drop the deployment of an instance, then the instance itself.
    pub(super) fn remove_deployed_instance(
        &self,
        instance: &Instance,
        force: bool,
    ) -> Result<(), ControlError> {
        let node = self
            .store
            .nodes()
            .find_one(&|n: &Node| n.id == instance.node_id)?
            .ok_or_else(|| ControlError::not_found(EntityKind::Node, &instance.node_id))?;

        self.registry
            .unregister_deployment(&Deployment::new(node, instance.clone()), force)?;
        self.store.instances().delete(&instance.id)?;
        Ok(())
    }

    /// Copy attach state of a stored instance into its deployment.
    pub(super) fn mirror_instance(&self, instance: &Instance) -> Result<(), ControlError> {
        self.registry.update_instances::<ControlError, _>(|i| {
            if i.id == instance.id {
                i.is_attached = instance.is_attached;
                i.attached_since = instance.attached_since;
            }
            Ok(())
        })
    }

    fn set_instance_attached(
        &self,
        reference: &str,
        attached: bool,
    ) -> Result<InstanceInfo, ControlError> {
        let _guard = self.write_lock.lock();

        let mut instance = self.find_instance(reference)?;
        if attached {
            instance.attach();
        } else {
            instance.detach();
        }
        self.store.instances().update(&instance)?;
        self.mirror_instance(&instance)?;

        info!(instance = %instance.name, id = %instance.id, attached, "instance attachment changed");
        Ok(self.instance_info_of(&instance))
    }

    fn find_instance(&self, reference: &str) -> Result<Instance, ControlError> {
        resolve(self.store.instances(), reference, &|i: &Instance| {
            i.address == reference
        })
    }

    fn instance_info_of(&self, instance: &Instance) -> InstanceInfo {
        let alive = self
            .registry
            .instance_liveness(&instance.service_id, &instance.id)
            .unwrap_or(instance.is_alive);
        InstanceInfo::new(instance, alive)
    }
}

/// Normalise an instance address to `host:port`, taking the host from the
/// node when only a port is given.
fn instance_address(node: &Node, raw: &str) -> Result<String, ControlError> {
    let endpoint = Endpoint::parse(raw)?;
    let endpoint = if endpoint.host().is_empty() {
        endpoint.or_host(&node.host()?)
    } else {
        endpoint
    };

    endpoint.authority().ok_or_else(|| {
        ControlError::InvalidArgument(format!("instance address '{}' has no port", raw.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{NodeOptions, ServiceOptions};
    use crate::error::ErrorKind;

    fn controller() -> Controller {
        let controller = Controller::new();
        controller
            .create_node(
                "http://10.0.0.1:2375",
                NodeOptions {
                    name: Some("node-1".to_string()),
                    attach: true,
                    ..NodeOptions::default()
                },
            )
            .unwrap();
        controller
            .create_service(
                "api",
                ServiceOptions {
                    routes: vec!["api.example.com".to_string()],
                    enable: true,
                    ..ServiceOptions::default()
                },
            )
            .unwrap();
        controller
    }

    fn named(name: &str) -> InstanceOptions {
        InstanceOptions {
            name: Some(name.to_string()),
            ..InstanceOptions::default()
        }
    }

    #[test]
    fn test_create_instance_address_forms() {
        let controller = controller();
        let a = controller.create_instance("api", "node-1", "8080", named("a")).unwrap();
        let b = controller.create_instance("api", "node-1", ":8081", named("b")).unwrap();
        let c = controller
            .create_instance("api", "node-1", "http://10.0.0.2:9000/", named("c"))
            .unwrap();

        assert_eq!(a.address, "10.0.0.1:8080");
        assert_eq!(b.address, "10.0.0.1:8081");
        assert_eq!(c.address, "10.0.0.2:9000");
    }

    #[test]
    fn test_create_instance_registers_deployment() {
        let controller = controller();
        let info = controller
            .create_instance("api.example.com", "http://10.0.0.1:2375", "8080", InstanceOptions::default())
            .unwrap();
        assert_eq!(info.name, info.id);

        let entry = controller.registry().lookup_service("api.example.com").unwrap();
        let service = entry.read();
        assert_eq!(service.deployments().len(), 1);
        assert_eq!(service.deployments()[0].instance.id, info.id);
        assert_eq!(service.deployments()[0].node.name, "node-1");
    }

    #[test]
    fn test_create_instance_duplicates() {
        let controller = controller();
        controller.create_instance("api", "node-1", "8080", named("a")).unwrap();

        let err = controller
            .create_instance("api", "node-1", "10.0.0.1:8080", named("b"))
            .unwrap_err();
        assert!(matches!(err, ControlError::AlreadyExists { field: "address", .. }));

        let err = controller.create_instance("api", "node-1", "8081", named("a")).unwrap_err();
        assert!(matches!(err, ControlError::AlreadyExists { field: "name", .. }));

        // Same name in another service is fine.
        controller.create_service("web", ServiceOptions::default()).unwrap();
        controller.create_instance("web", "node-1", "8082", named("a")).unwrap();
    }

    #[test]
    fn test_create_instance_bad_references() {
        let controller = controller();
        let err = controller
            .create_instance("ghost", "node-1", "8080", InstanceOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = controller
            .create_instance("api", "ghost", "8080", InstanceOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = controller
            .create_instance("api", "node-1", "", InstanceOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_attach_detach_instance() {
        let controller = controller();
        controller.create_instance("api", "node-1", "8080", named("a")).unwrap();
        assert!(controller.list_instances(false).unwrap().is_empty());

        let info = controller.attach_instance("a").unwrap();
        assert!(info.is_attached);
        assert_eq!(controller.list_instances(false).unwrap().len(), 1);

        let entry = controller.registry().lookup_service("api.example.com").unwrap();
        assert!(entry.read().deployments()[0].instance.is_attached);

        controller.detach_instance("10.0.0.1:8080").unwrap();
        assert!(!entry.read().deployments()[0].instance.is_attached);
    }

    #[test]
    fn test_instance_info_reads_live_liveness() {
        let controller = controller();
        let info = controller.create_instance("api", "node-1", "8080", named("a")).unwrap();
        assert!(!controller.instance_info("a").unwrap().is_alive);

        let entry = controller.registry().lookup_service("api.example.com").unwrap();
        entry.write().apply_liveness([(info.id.as_str(), true)]);

        assert!(controller.instance_info("a").unwrap().is_alive);
        assert!(controller.node_info("node-1").unwrap().is_alive);
    }

    #[test]
    fn test_remove_instance() {
        let controller = controller();
        controller
            .create_instance("api", "node-1", "8080", InstanceOptions { attach: true, ..named("a") })
            .unwrap();

        let err = controller.remove_instance("a", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotRemovable);

        controller.detach_instance("a").unwrap();
        controller.remove_instance("a", false).unwrap();
        assert!(controller.list_instances(true).unwrap().is_empty());

        let entry = controller.registry().lookup_service("api.example.com").unwrap();
        assert!(entry.read().deployments().is_empty());
    }
}
