//! Service registry: per-service deployments and schedulers.

use super::{RegistryError, RouteRegistry};
use crate::entity::{Deployment, Instance, Node, Service};
use crate::scheduler::{new_scheduler, Scheduler, SchedulerError};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handle to one registered service.
pub type ServiceEntry = Arc<RwLock<RegisteredService>>;

/// A service as the registry holds it: entity, deployments and scheduler.
pub struct RegisteredService {
    entity: Service,
    deployments: Vec<Deployment>,
    scheduler: Option<Box<dyn Scheduler>>,
}

impl RegisteredService {
    /// Wrap a service without deployments or scheduler.
    pub fn new(entity: Service) -> Self {
        Self {
            entity,
            deployments: Vec::new(),
            scheduler: None,
        }
    }

    /// Build a service with the scheduler its balancing method asks for.
    pub fn build(entity: Service, deployments: Vec<Deployment>) -> Result<Self, SchedulerError> {
        let scheduler = new_scheduler(entity.balancing_method, deployments.clone())?;
        Ok(Self {
            entity,
            deployments,
            scheduler: Some(scheduler),
        })
    }

    /// Install a scheduler and hand it the current deployments.
    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self.refresh_scheduler();
        self
    }

    pub fn entity(&self) -> &Service {
        &self.entity
    }

    pub fn deployments(&self) -> &[Deployment] {
        &self.deployments
    }

    pub fn scheduler(&self) -> Option<&dyn Scheduler> {
        self.scheduler.as_deref()
    }

    /// Whether every deployment may be dropped.
    pub fn is_removable(&self) -> bool {
        self.deployments.iter().all(Deployment::is_removable)
    }

    /// Apply probe results to the matching instances.
    ///
    /// # Returns
    ///
    /// The number of instances whose liveness changed.
    pub fn apply_liveness<'a, I>(&mut self, results: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let mut changed = 0;
        for (instance_id, alive) in results {
            for deployment in &mut self.deployments {
                if deployment.instance.id == instance_id && deployment.instance.is_alive != alive {
                    deployment.instance.is_alive = alive;
                    changed += 1;
                }
            }
        }

        if changed > 0 {
            self.refresh_scheduler();
        }
        changed
    }

    /// Push the current deployment list to the scheduler.
    fn refresh_scheduler(&mut self) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.update_deployments(self.deployments.clone());
        }
    }
}

/// Registry of all services, their routes and deployments.
///
/// Lock order is the route table first, then a service entry.
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceEntry>,
    routes: RwLock<RouteRegistry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service and all of its routes.
    ///
    /// Without `force`, fails if the service ID or any of its routes is
    /// already registered; nothing is changed in that case. A forced
    /// registration replaces the previous record and takes over its routes.
    pub fn register_service(
        &self,
        service: RegisteredService,
        force: bool,
    ) -> Result<(), RegistryError> {
        let id = service.entity.id.clone();
        let mut routes = self.routes.write();

        if force {
            for stale in routes.routes_of(&id) {
                routes.unregister(&stale)?;
            }
        } else {
            if self.services.contains_key(&id) {
                return Err(RegistryError::ServiceAlreadyRegistered(id));
            }
            if let Some(taken) = service
                .entity
                .routes
                .iter()
                .find(|route| routes.is_registered(route))
            {
                return Err(RegistryError::RouteAlreadyRegistered(taken.clone()));
            }
        }

        for route in &service.entity.routes {
            // A forced takeover drops the route from its previous owner too.
            let owner = routes
                .lookup_service_id(route)
                .filter(|owner| *owner != id)
                .map(str::to_string);
            if let Some(entry) = owner.and_then(|owner| self.service(&owner)) {
                entry.write().entity.routes.retain(|r| r != route);
            }
            routes.register(route, &id, true)?;
        }

        debug!(
            service = %service.entity.name,
            id = %id,
            routes = service.entity.routes.len(),
            "service registered"
        );
        self.services.insert(id, Arc::new(RwLock::new(service)));
        Ok(())
    }

    /// Remove a service and its routes.
    ///
    /// Without `force`, fails with `ServiceNotRemovable` while any deployment
    /// is attached on both its node and its instance.
    pub fn unregister_service(&self, service_id: &str, force: bool) -> Result<(), RegistryError> {
        let mut routes = self.routes.write();
        let entry = self
            .service(service_id)
            .ok_or_else(|| RegistryError::UnregisteredService(service_id.to_string()))?;

        if !force && !entry.read().is_removable() {
            return Err(RegistryError::ServiceNotRemovable(service_id.to_string()));
        }

        for route in routes.routes_of(service_id) {
            routes.unregister(&route)?;
        }
        self.services.remove(service_id);

        debug!(id = %service_id, force, "service unregistered");
        Ok(())
    }

    /// Resolve a route to its service.
    ///
    /// A route pointing at a missing service is logged and treated as
    /// not found.
    pub fn lookup_service(&self, route: &str) -> Option<ServiceEntry> {
        let routes = self.routes.read();
        let service_id = routes.lookup_service_id(route)?;

        match self.services.get(service_id) {
            Some(entry) => Some(Arc::clone(entry.value())),
            None => {
                warn!(
                    route = %route,
                    service_id = %service_id,
                    "route resolves to a service that is not registered"
                );
                None
            }
        }
    }

    /// Add a route to a registered service.
    pub fn register_service_route(&self, service_id: &str, route: &str) -> Result<(), RegistryError> {
        let mut routes = self.routes.write();
        let entry = self
            .service(service_id)
            .ok_or_else(|| RegistryError::UnregisteredService(service_id.to_string()))?;

        routes.register(route, service_id, false)?;

        let mut service = entry.write();
        if !service.entity.has_route(route) {
            service.entity.routes.push(route.to_string());
        }
        Ok(())
    }

    /// Remove a route from whichever service owns it.
    pub fn unregister_service_route(&self, route: &str) -> Result<(), RegistryError> {
        let mut routes = self.routes.write();
        let service_id = routes.unregister(route)?;

        if let Some(entry) = self.service(&service_id) {
            entry.write().entity.routes.retain(|r| r != route);
        }
        Ok(())
    }

    /// Add a deployment to its instance's service.
    pub fn register_deployment(&self, deployment: Deployment) -> Result<(), RegistryError> {
        let service_id = &deployment.instance.service_id;
        let entry = self
            .service(service_id)
            .ok_or_else(|| RegistryError::UnregisteredService(service_id.clone()))?;

        let mut service = entry.write();
        debug!(
            service = %service.entity.name,
            node = %deployment.node.id,
            instance = %deployment.instance.id,
            "deployment registered"
        );
        service.deployments.push(deployment);
        service.refresh_scheduler();
        Ok(())
    }

    /// Remove one deployment equal to the given one.
    ///
    /// Removability is judged on the registry's live copy. Without `force`,
    /// a deployment attached on both ends is kept.
    pub fn unregister_deployment(
        &self,
        deployment: &Deployment,
        force: bool,
    ) -> Result<(), RegistryError> {
        let service_id = &deployment.instance.service_id;
        let entry = self
            .service(service_id)
            .ok_or_else(|| RegistryError::UnregisteredService(service_id.clone()))?;

        let mut service = entry.write();
        let idx = service
            .deployments
            .iter()
            .position(|d| d == deployment)
            .ok_or_else(|| RegistryError::UnregisteredDeployment {
                node_id: deployment.node.id.clone(),
                instance_id: deployment.instance.id.clone(),
            })?;

        if !force && !service.deployments[idx].is_removable() {
            return Err(RegistryError::DeploymentNotRemovable {
                node_id: deployment.node.id.clone(),
                instance_id: deployment.instance.id.clone(),
            });
        }

        service.deployments.swap_remove(idx);
        service.refresh_scheduler();
        Ok(())
    }

    /// Apply `visit` to every node copy held in any deployment.
    ///
    /// The first error stops the walk and is returned. Schedulers of every
    /// visited service are refreshed before returning.
    pub fn update_nodes<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&mut Node) -> Result<(), E>,
    {
        for entry in self.services() {
            let mut service = entry.write();
            let result = service
                .deployments
                .iter_mut()
                .try_for_each(|d| visit(&mut d.node));
            service.refresh_scheduler();
            result?;
        }
        Ok(())
    }

    /// Apply `visit` to every registered service entity.
    ///
    /// Routes must be changed through `register_service_route` and
    /// `unregister_service_route`, not through this visitor.
    pub fn update_services<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&mut Service) -> Result<(), E>,
    {
        for entry in self.services() {
            visit(&mut entry.write().entity)?;
        }
        Ok(())
    }

    /// Apply `visit` to every instance copy held in any deployment.
    ///
    /// Same stopping and refresh rules as `update_nodes`.
    pub fn update_instances<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&mut Instance) -> Result<(), E>,
    {
        for entry in self.services() {
            let mut service = entry.write();
            let result = service
                .deployments
                .iter_mut()
                .try_for_each(|d| visit(&mut d.instance));
            service.refresh_scheduler();
            result?;
        }
        Ok(())
    }

    /// Look up a service by ID.
    pub fn service(&self, service_id: &str) -> Option<ServiceEntry> {
        self.services
            .get(service_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of all registered services.
    pub fn services(&self) -> Vec<ServiceEntry> {
        self.services
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Live liveness flag of an instance, if it is deployed.
    pub fn instance_liveness(&self, service_id: &str, instance_id: &str) -> Option<bool> {
        let entry = self.service(service_id)?;
        let service = entry.read();
        service
            .deployments
            .iter()
            .find(|d| d.instance.id == instance_id)
            .map(|d| d.instance.is_alive)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
