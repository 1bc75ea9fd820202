//! Value objects describing entities to control plane callers.

use crate::entity::{Instance, Node, Service};
use crate::scheduler::BalancingMethod;
use serde::Serialize;

/// Observable state of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub weight: u8,
    pub is_attached: bool,
    pub is_alive: bool,
}

impl NodeInfo {
    pub(crate) fn new(node: &Node, is_alive: bool) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            url: node.url.clone(),
            weight: node.weight,
            is_attached: node.is_attached,
            is_alive,
        }
    }
}

/// Observable state of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub routes: Vec<String>,
    pub target_version: String,
    pub balancing_method: BalancingMethod,
    pub is_enabled: bool,
}

impl From<&Service> for ServiceInfo {
    fn from(service: &Service) -> Self {
        Self {
            id: service.id.clone(),
            name: service.name.clone(),
            routes: service.routes.clone(),
            target_version: service.target_version.clone(),
            balancing_method: service.balancing_method,
            is_enabled: service.is_enabled,
        }
    }
}

/// Observable state of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub id: String,
    pub name: String,
    pub service_id: String,
    pub node_id: String,
    pub address: String,
    pub version: String,
    pub is_attached: bool,
    pub is_alive: bool,
}

impl InstanceInfo {
    pub(crate) fn new(instance: &Instance, is_alive: bool) -> Self {
        Self {
            id: instance.id.clone(),
            name: instance.name.clone(),
            service_id: instance.service_id.clone(),
            node_id: instance.node_id.clone(),
            address: instance.address.clone(),
            version: instance.version.clone(),
            is_attached: instance.is_attached,
            is_alive,
        }
    }
}
