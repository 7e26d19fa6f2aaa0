// workflow/src/errors.rs

use thiserror::Error;
use uuid::Uuid;

use models::{EntityKey, EntityType, ValidationError, VisitStatus};
use security::{DenialReason, RoutePath};

/// Failures of the data-access collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not Found: {0}")]
    NotFound(EntityKey),

    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict { key: EntityKey, expected: u64, actual: u64 },

    #[error("Serialization/Deserialization error: {0}")]
    Serialization(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<ValidationError> for StorageError {
    fn from(err: ValidationError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Everything `perform` can fail with.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("'{capability}' denied ({reason:?}), redirect to {fallback}")]
    AuthorizationDenied { capability: String, fallback: RoutePath, reason: DenialReason },

    #[error("cannot {action} {entity} {id} in state '{current}'{}", blocking_suffix(.blocking))]
    InvalidTransition {
        entity: EntityType,
        id: Uuid,
        current: String,
        action: String,
        /// Children that keep the transition from being legal.
        blocking: Vec<EntityKey>,
    },

    #[error("{entity} {id} is in terminal state '{current}', cannot {action}")]
    TerminalStateViolation { entity: EntityType, id: Uuid, current: String, action: String },

    #[error("visit {visit_id} is '{current}' but the action requires {required}")]
    VisitNotActive { visit_id: Uuid, current: VisitStatus, required: String },

    #[error("concurrent modification of {entity} {id}: expected version {expected}, found {actual}")]
    ConcurrentModification { entity: EntityType, id: Uuid, expected: u64, actual: u64 },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityType, id: Uuid },

    #[error("storage failure: {0}")]
    Storage(String),
}

fn blocking_suffix(blocking: &[EntityKey]) -> String {
    if blocking.is_empty() {
        return String::new();
    }
    let keys: Vec<String> = blocking.iter().map(ToString::to_string).collect();
    format!("; blocked by {}", keys.join(", "))
}

impl DomainError {
    pub fn invalid_transition(entity: EntityType, id: Uuid, current: impl Into<String>, action: impl Into<String>) -> Self {
        DomainError::InvalidTransition {
            entity,
            id,
            current: current.into(),
            action: action.into(),
            blocking: Vec::new(),
        }
    }

    pub fn terminal(entity: EntityType, id: Uuid, current: impl Into<String>, action: impl Into<String>) -> Self {
        DomainError::TerminalStateViolation { entity, id, current: current.into(), action: action.into() }
    }

    /// Terminal-state attempts count as invalid transitions too.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, DomainError::InvalidTransition { .. } | DomainError::TerminalStateViolation { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::ConcurrentModification { .. })
    }
}

impl From<StorageError> for DomainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => DomainError::NotFound { entity: key.entity_type, id: key.id },
            StorageError::VersionConflict { key, expected, actual } => DomainError::ConcurrentModification {
                entity: key.entity_type,
                id: key.id,
                expected,
                actual,
            },
            other => DomainError::Storage(other.to_string()),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
