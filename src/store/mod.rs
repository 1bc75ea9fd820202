//! Entity store contract.
//!
//! The control plane persists nodes, services and instances through these
//! traits. Queries are predicates rather than a query language, so any
//! key-value backend can satisfy the contract.

mod memory;

pub use memory::MemoryStore;

use crate::entity::{Entity, EntityKind, Instance, Node, Service};
use crate::error::ErrorKind;
use thiserror::Error;

/// Errors reported by an entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Backend(_) => ErrorKind::Internal,
        }
    }
}

/// CRUD access to one kind of entity.
pub trait Store<E: Entity>: Send + Sync {
    /// Insert a new entity. Fails if its ID is taken.
    fn create(&self, entity: E) -> Result<(), StoreError>;

    /// Return every entity matching the filter, in insertion order.
    fn find(&self, filter: &dyn Fn(&E) -> bool) -> Result<Vec<E>, StoreError>;

    /// Replace the stored entity with the same ID.
    fn update(&self, entity: &E) -> Result<(), StoreError>;

    /// Delete the entity with the given ID.
    fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Return the first entity matching the filter.
    fn find_one(&self, filter: &dyn Fn(&E) -> bool) -> Result<Option<E>, StoreError> {
        Ok(self.find(filter)?.into_iter().next())
    }
}

/// A store holding all three entity kinds.
pub trait EntityStore: Send + Sync {
    fn nodes(&self) -> &dyn Store<Node>;
    fn services(&self) -> &dyn Store<Service>;
    fn instances(&self) -> &dyn Store<Instance>;
}

/// Filter matching every entity.
pub fn all<E>(_: &E) -> bool {
    true
}
