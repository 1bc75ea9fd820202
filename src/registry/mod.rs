//! Runtime topology: which routes belong to which services, and which
//! deployments each service can be balanced over.
//!
//! The registry is the single live copy of the topology the dispatcher reads.
//! Each service sits behind its own read-write lock so request selection,
//! health updates and control-plane changes only contend per service.

mod route;
mod service;

pub use route::RouteRegistry;
pub use service::{RegisteredService, ServiceEntry, ServiceRegistry};

use crate::error::ErrorKind;
use thiserror::Error;

/// Errors raised by the route and service registries.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("route '{0}' is already registered")]
    RouteAlreadyRegistered(String),

    #[error("route '{0}' is not registered")]
    UnregisteredRoute(String),

    #[error("service '{0}' is already registered")]
    ServiceAlreadyRegistered(String),

    #[error("service '{0}' is not registered")]
    UnregisteredService(String),

    #[error("service '{0}' has deployments that are attached on both node and instance")]
    ServiceNotRemovable(String),

    #[error("deployment of instance '{instance_id}' on node '{node_id}' is not registered")]
    UnregisteredDeployment { node_id: String, instance_id: String },

    #[error("deployment of instance '{instance_id}' on node '{node_id}' is attached and cannot be removed")]
    DeploymentNotRemovable { node_id: String, instance_id: String },
}

impl RegistryError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::RouteAlreadyRegistered(_) | RegistryError::ServiceAlreadyRegistered(_) => {
                ErrorKind::AlreadyExists
            }
            RegistryError::UnregisteredRoute(_)
            | RegistryError::UnregisteredService(_)
            | RegistryError::UnregisteredDeployment { .. } => ErrorKind::NotFound,
            RegistryError::ServiceNotRemovable(_) | RegistryError::DeploymentNotRemovable { .. } => {
                ErrorKind::NotRemovable
            }
        }
    }
}
