//! In-memory entity store.

use super::{EntityStore, Store, StoreError};
use crate::entity::{Entity, Instance, Node, Service};
use parking_lot::RwLock;

/// One entity kind, kept in insertion order.
pub struct Table<E> {
    rows: RwLock<Vec<E>>,
}

impl<E> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }
}

impl<E: Entity> Store<E> for Table<E> {
    fn create(&self, entity: E) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.iter().any(|row| row.id() == entity.id()) {
            return Err(StoreError::AlreadyExists {
                kind: E::KIND,
                id: entity.id().to_string(),
            });
        }
        rows.push(entity);
        Ok(())
    }

    fn find(&self, filter: &dyn Fn(&E) -> bool) -> Result<Vec<E>, StoreError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|row| filter(row))
            .cloned()
            .collect())
    }

    fn update(&self, entity: &E) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let row = rows
            .iter_mut()
            .find(|row| row.id() == entity.id())
            .ok_or_else(|| StoreError::NotFound {
                kind: E::KIND,
                id: entity.id().to_string(),
            })?;
        *row = entity.clone();
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let idx = rows
            .iter()
            .position(|row| row.id() == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: E::KIND,
                id: id.to_string(),
            })?;
        rows.remove(idx);
        Ok(())
    }
}

/// Entity store that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    nodes: Table<Node>,
    services: Table<Service>,
    instances: Table<Instance>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for MemoryStore {
    fn nodes(&self) -> &dyn Store<Node> {
        &self.nodes
    }

    fn services(&self) -> &dyn Store<Service> {
        &self.services
    }

    fn instances(&self) -> &dyn Store<Instance> {
        &self.instances
    }
}
