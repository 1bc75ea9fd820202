//! Control plane errors.

use crate::entity::{EntityError, EntityKind};
use crate::error::ErrorKind;
use crate::registry::RegistryError;
use crate::scheduler::SchedulerError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by `Controller` operations.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{kind} '{reference}' could not be found")]
    NotFound { kind: EntityKind, reference: String },

    #[error("a {kind} with {field} '{value}' already exists")]
    AlreadyExists {
        kind: EntityKind,
        field: &'static str,
        value: String,
    },

    #[error("{kind} '{reference}' cannot be removed: {reason}")]
    NotRemovable {
        kind: EntityKind,
        reference: String,
        reason: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Entity(#[from] EntityError),
}

impl ControlError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::NotFound { .. } => ErrorKind::NotFound,
            ControlError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ControlError::NotRemovable { .. } => ErrorKind::NotRemovable,
            ControlError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ControlError::Registry(e) => e.kind(),
            ControlError::Scheduler(e) => e.kind(),
            ControlError::Store(e) => e.kind(),
            ControlError::Entity(e) => e.kind(),
        }
    }

    pub(crate) fn not_found(kind: EntityKind, reference: &str) -> Self {
        ControlError::NotFound {
            kind,
            reference: reference.to_string(),
        }
    }

    pub(crate) fn already_exists(kind: EntityKind, field: &'static str, value: &str) -> Self {
        ControlError::AlreadyExists {
            kind,
            field,
            value: value.to_string(),
        }
    }
}
