//! Service operations.

use super::{resolve, validate_name, ControlError, Controller, ServiceInfo};
use crate::entity::{EntityKind, Instance, Service};
use crate::registry::RegisteredService;
use crate::scheduler::BalancingMethod;
use tracing::{info, warn};

/// Options for `Controller::create_service`.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    /// Public routes served by the service
    pub routes: Vec<String>,
    /// Scheduling algorithm
    pub balancing_method: BalancingMethod,
    /// Version a rollout attaches instances for
    pub target_version: Option<String>,
    /// Enable the service right away
    pub enable: bool,
}

impl Controller {
    /// Register a new service and its routes.
    ///
    /// The balancing method is checked before anything is written, so an
    /// unsupported method leaves no trace.
    pub fn create_service(
        &self,
        name: &str,
        options: ServiceOptions,
    ) -> Result<ServiceInfo, ControlError> {
        let _guard = self.write_lock.lock();

        let name = name.trim();
        if name.is_empty() {
            return Err(ControlError::InvalidArgument(
                "service name must not be empty".to_string(),
            ));
        }
        validate_name(EntityKind::Service, name)?;

        let mut service = Service::new(name, options.balancing_method);
        for route in &options.routes {
            service.add_route(check_route(route)?)?;
        }
        service.target_version = options
            .target_version
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        service.is_enabled = options.enable;

        let services = self.store.services();
        let clash = services.find_one(&|s: &Service| s.id == service.id || s.name == service.name)?;
        if let Some(existing) = clash {
            let (field, value) = if existing.id == service.id {
                ("id", &service.id)
            } else {
                ("name", &service.name)
            };
            return Err(ControlError::already_exists(EntityKind::Service, field, value));
        }

        let owner = services.find_one(&|s: &Service| s.routes.iter().any(|r| service.has_route(r)))?;
        if let Some(owner) = owner {
            let taken = owner
                .routes
                .iter()
                .find(|r| service.has_route(r))
                .cloned()
                .unwrap_or_default();
            return Err(ControlError::already_exists(EntityKind::Service, "route", &taken));
        }

        let registered = RegisteredService::build(service.clone(), Vec::new())?;
        services.create(service.clone())?;

        if let Err(e) = self.registry.register_service(registered, false) {
            if let Err(rollback) = services.delete(&service.id) {
                warn!(service = %service.name, error = %rollback, "failed to roll back service");
            }
            return Err(e.into());
        }

        info!(
            service = %service.name,
            id = %service.id,
            routes = ?service.routes,
            method = %service.balancing_method,
            enabled = service.is_enabled,
            "service created"
        );
        Ok(ServiceInfo::from(&service))
    }

    /// Enable a service so its routes are served and its instances probed.
    pub fn enable_service(&self, reference: &str) -> Result<ServiceInfo, ControlError> {
        self.set_service_enabled(reference, true)
    }

    /// Disable a service. Requests to its routes get 503 and probing stops.
    pub fn disable_service(&self, reference: &str) -> Result<ServiceInfo, ControlError> {
        self.set_service_enabled(reference, false)
    }

    /// Roll a service to a target version.
    ///
    /// Instances of this service running `target_version` are attached, all
    /// other instances of it are detached. Versions compare after trimming.
    pub fn update_service(
        &self,
        reference: &str,
        target_version: &str,
    ) -> Result<ServiceInfo, ControlError> {
        let _guard = self.write_lock.lock();

        let target = target_version.trim().to_string();
        let mut service = self.find_service(reference)?;
        service.target_version = target.clone();
        self.store.services().update(&service)?;
        self.registry.update_services::<ControlError, _>(|s| {
            if s.id == service.id {
                s.target_version = target.clone();
            }
            Ok(())
        })?;

        let instances = self
            .store
            .instances()
            .find(&|i: &Instance| i.service_id == service.id)?;

        let mut changed = 0;
        for mut instance in instances {
            let attach = instance.version.trim() == target;
            if attach == instance.is_attached {
                continue;
            }
            if attach {
                instance.attach();
            } else {
                instance.detach();
            }
            self.store.instances().update(&instance)?;
            self.mirror_instance(&instance)?;
            changed += 1;
        }

        info!(service = %service.name, target_version = %target, changed, "service updated");
        Ok(ServiceInfo::from(&service))
    }

    /// Add a public route to a service.
    pub fn add_service_route(
        &self,
        reference: &str,
        route: &str,
    ) -> Result<ServiceInfo, ControlError> {
        let _guard = self.write_lock.lock();

        let route = check_route(route)?;
        let mut service = self.find_service(reference)?;
        service.add_route(route)?;

        let owner = self
            .store
            .services()
            .find_one(&|s: &Service| s.id != service.id && s.has_route(route))?;
        if owner.is_some() {
            return Err(ControlError::already_exists(EntityKind::Service, "route", route));
        }

        self.store.services().update(&service)?;
        self.registry.register_service_route(&service.id, route)?;

        info!(service = %service.name, route, "route added");
        Ok(ServiceInfo::from(&service))
    }

    /// Remove a public route from a service.
    pub fn remove_service_route(
        &self,
        reference: &str,
        route: &str,
    ) -> Result<ServiceInfo, ControlError> {
        let _guard = self.write_lock.lock();

        let route = route.trim();
        let mut service = self.find_service(reference)?;
        service.remove_route(route)?;

        self.store.services().update(&service)?;
        self.registry.unregister_service_route(route)?;

        info!(service = %service.name, route, "route removed");
        Ok(ServiceInfo::from(&service))
    }

    pub fn service_info(&self, reference: &str) -> Result<ServiceInfo, ControlError> {
        let service = self.find_service(reference)?;
        Ok(ServiceInfo::from(&service))
    }

    /// List services; only enabled ones unless `all` is set.
    pub fn list_services(&self, all: bool) -> Result<Vec<ServiceInfo>, ControlError> {
        let services = self
            .store
            .services()
            .find(&|s: &Service| all || s.is_enabled)?;
        Ok(services.iter().map(ServiceInfo::from).collect())
    }

    /// Remove a service, its routes and its instances.
    ///
    /// Without `force`, fails while any deployment is attached on both its
    /// node and its instance.
    pub fn remove_service(&self, reference: &str, force: bool) -> Result<(), ControlError> {
        let _guard = self.write_lock.lock();

        let service = self.find_service(reference)?;
        self.registry.unregister_service(&service.id, force)?;

        let instances = self
            .store
            .instances()
            .find(&|i: &Instance| i.service_id == service.id)?;
        for instance in &instances {
            self.store.instances().delete(&instance.id)?;
        }
        self.store.services().delete(&service.id)?;

        info!(service = %service.name, id = %service.id, instances = instances.len(), "service removed");
        Ok(())
    }

    fn set_service_enabled(
        &self,
        reference: &str,
        enabled: bool,
    ) -> Result<ServiceInfo, ControlError> {
        let _guard = self.write_lock.lock();

        let mut service = self.find_service(reference)?;
        service.is_enabled = enabled;
        self.store.services().update(&service)?;

        self.registry.update_services::<ControlError, _>(|s| {
            if s.id == service.id {
                s.is_enabled = enabled;
            }
            Ok(())
        })?;

        info!(service = %service.name, id = %service.id, enabled, "service state changed");
        Ok(ServiceInfo::from(&service))
    }

    pub(super) fn find_service(&self, reference: &str) -> Result<Service, ControlError> {
        resolve(self.store.services(), reference, &|s: &Service| {
            s.has_route(reference)
        })
    }
}

fn check_route(route: &str) -> Result<&str, ControlError> {
    let route = route.trim();
    if route.is_empty() {
        return Err(ControlError::InvalidArgument(
            "route must not be empty".to_string(),
        ));
    }
    Ok(route)
}
