//! Service entity.

use super::{generate_id, Entity, EntityError, EntityKind, Route};
use crate::scheduler::BalancingMethod;
use serde::{Deserialize, Serialize};

/// A logical application reachable through one or more public routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub routes: Vec<Route>,
    /// Version instances must carry to be attached by a rollout.
    pub target_version: String,
    pub balancing_method: BalancingMethod,
    pub is_enabled: bool,
}

impl Service {
    /// Create a disabled service with a fresh ID and no routes.
    pub fn new(name: impl Into<String>, balancing_method: BalancingMethod) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            routes: Vec::new(),
            target_version: String::new(),
            balancing_method,
            is_enabled: false,
        }
    }

    /// Whether the route is assigned to this service.
    pub fn has_route(&self, route: &str) -> bool {
        self.routes.iter().any(|r| r == route)
    }

    /// Assign a route. Fails if the service already owns it.
    pub fn add_route(&mut self, route: impl Into<Route>) -> Result<(), EntityError> {
        let route = route.into();
        if self.has_route(&route) {
            return Err(EntityError::RouteAlreadyAssigned(route));
        }
        self.routes.push(route);
        Ok(())
    }

    /// Remove a route. Order of the remaining routes is not preserved.
    pub fn remove_route(&mut self, route: &str) -> Result<(), EntityError> {
        let idx = self
            .routes
            .iter()
            .position(|r| r == route)
            .ok_or_else(|| EntityError::RouteNotAssigned(route.to_string()))?;
        self.routes.swap_remove(idx);
        Ok(())
    }
}

impl Entity for Service {
    const KIND: EntityKind = EntityKind::Service;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}
