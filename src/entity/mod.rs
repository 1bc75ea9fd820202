//! Entity model: nodes, services, instances and the deployments pairing them.
//!
//! These are plain value types. Behaviour is limited to invariant checks and
//! the small state transitions (attach, detach, route edits) that every layer
//! agrees on.

mod deployment;
mod endpoint;
mod instance;
mod node;
mod service;

pub use deployment::Deployment;
pub use endpoint::Endpoint;
pub use instance::Instance;
pub use node::Node;
pub use service::Service;

use crate::error::ErrorKind;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// A public route (hostname, optionally with a path) mapped to one service.
///
/// Routes compare by exact string equality: `example.com` and `example.com/`
/// are different routes.
pub type Route = String;

/// Length of generated entity IDs in hex characters.
const ID_LENGTH: usize = 16;

/// The kinds of entity the balancer manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Node,
    Service,
    Instance,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => f.write_str("node"),
            EntityKind::Service => f.write_str("service"),
            EntityKind::Instance => f.write_str("instance"),
        }
    }
}

/// Common behaviour of stored entities.
pub trait Entity: Clone + Send + Sync + 'static {
    /// The kind tag used in error messages.
    const KIND: EntityKind;

    /// Unique identifier.
    fn id(&self) -> &str;

    /// Human readable name.
    fn name(&self) -> &str;
}

/// Errors raised by entity invariant checks.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("route '{0}' is already assigned to this service")]
    RouteAlreadyAssigned(String),

    #[error("route '{0}' is not assigned to this service")]
    RouteNotAssigned(String),
}

impl EntityError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EntityError::InvalidAddress { .. } => ErrorKind::InvalidArgument,
            EntityError::RouteAlreadyAssigned(_) => ErrorKind::AlreadyExists,
            EntityError::RouteNotAssigned(_) => ErrorKind::NotFound,
        }
    }
}

/// Generate a new random entity ID (16 lowercase hex characters).
pub fn generate_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LENGTH);
    id
}

/// Check that a name or ID only contains URL-safe characters.
///
/// Allowed are ASCII letters, digits, `_` and `-`. The empty string passes;
/// callers that require a value check for emptiness separately.
pub fn is_url_safe(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Seconds since the Unix epoch.
pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
