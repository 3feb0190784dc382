//! Error types for Tether operations

use crate::{EntityType, Version};
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with key {key}")]
    NotFound { entity_type: EntityType, key: String },

    #[error("Entity already exists: {entity_type:?} with key {key}")]
    AlreadyExists { entity_type: EntityType, key: String },

    #[error("Stale write on {entity_type:?} {key}: expected version {expected:?}, found {actual:?}")]
    StaleVersion {
        entity_type: EntityType,
        key: String,
        expected: Option<Version>,
        actual: Option<Version>,
    },

    #[error("Referential integrity violated on {entity_type:?}: {reason}")]
    Integrity { entity_type: EntityType, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Authorization and state-machine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Permission denied for {actor}: {action} on {resource}")]
    PermissionDenied {
        actor: String,
        action: String,
        resource: String,
    },

    #[error("Invalid {entity_type:?} transition {from_state} -> {to_state}: {reason}")]
    InvalidStateTransition {
        entity_type: EntityType,
        from_state: String,
        to_state: String,
        reason: String,
    },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Grant value kind mismatch for {capability}: expected {expected}, got {got}")]
    GrantKindMismatch {
        capability: String,
        expected: String,
        got: String,
    },

    #[error("Unknown {kind}: {value}")]
    UnknownName { kind: String, value: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Tether errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TetherError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Caller-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Actor lacks the grant, the delegated mutate-access, or fails an identity check
    PermissionDenied,
    /// Operation incompatible with the current lock/override state
    InvalidStateTransition,
    /// Missing pair edge, layer, row or identity
    NotFound,
    /// Referential-integrity or uniqueness failure
    ConstraintViolation,
    /// Stale version on write; re-read and retry
    ConcurrencyConflict,
    /// Malformed request
    InvalidInput,
    Configuration,
    Internal,
}

impl TetherError {
    /// Get the error kind for categorization.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TetherError::Storage(StorageError::NotFound { .. }) => ErrorKind::NotFound,
            TetherError::Storage(StorageError::AlreadyExists { .. }) => {
                ErrorKind::ConstraintViolation
            }
            TetherError::Storage(StorageError::Integrity { .. }) => ErrorKind::ConstraintViolation,
            TetherError::Storage(StorageError::StaleVersion { .. }) => {
                ErrorKind::ConcurrencyConflict
            }
            TetherError::Storage(StorageError::LockPoisoned) => ErrorKind::Internal,
            TetherError::Access(AccessError::PermissionDenied { .. }) => {
                ErrorKind::PermissionDenied
            }
            TetherError::Access(AccessError::InvalidStateTransition { .. }) => {
                ErrorKind::InvalidStateTransition
            }
            TetherError::Validation(_) => ErrorKind::InvalidInput,
            TetherError::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Only stale writes are worth retrying after a re-read.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyConflict
    }

    pub fn permission_denied(
        actor: impl ToString,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        TetherError::Access(AccessError::PermissionDenied {
            actor: actor.to_string(),
            action: action.into(),
            resource: resource.into(),
        })
    }

    pub fn invalid_transition(
        entity_type: EntityType,
        from_state: impl Into<String>,
        to_state: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        TetherError::Access(AccessError::InvalidStateTransition {
            entity_type,
            from_state: from_state.into(),
            to_state: to_state.into(),
            reason: reason.into(),
        })
    }

    pub fn not_found(entity_type: EntityType, key: impl ToString) -> Self {
        TetherError::Storage(StorageError::NotFound {
            entity_type,
            key: key.to_string(),
        })
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TetherError::Validation(ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        })
    }
}

/// Result type alias for Tether operations.
pub type TetherResult<T> = Result<T, TetherError>;

// =============================================================================
// TESTS
// =============================================================================
