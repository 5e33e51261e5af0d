//! # Error Types: Structured Error Hierarchy
//!
//! All errors use `thiserror` for derive-based `Display` and `Error`
//! implementations. Validation errors carry the offending value so callers
//! can report it back verbatim.

use thiserror::Error;

/// Top-level error type for foundational operations.
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Input failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Content integrity violation (hash chain mismatch).
    #[error("integrity error: {0}")]
    Integrity(String),
}

/// Validation failures for domain primitives and boundary inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Entity identifier is empty, too long, or contains forbidden characters.
    #[error("invalid entity id {0:?}: must be 1-128 characters without whitespace")]
    InvalidEntityId(String),

    /// Principal identifier is empty, too long, or contains forbidden characters.
    #[error("invalid principal id {0:?}: must be 1-128 characters without whitespace")]
    InvalidPrincipalId(String),

    /// Entity type name is not one of the governed entity variants.
    #[error("unknown entity type {0:?}")]
    UnknownEntityType(String),

    /// State name is not defined for the given entity type.
    #[error("unknown state {state:?} for entity type {entity_type}")]
    UnknownState {
        /// Entity type the state was parsed for.
        entity_type: String,
        /// The unrecognized state name.
        state: String,
    },

    /// A rejection-class transition was requested without a reason.
    #[error("a non-empty reason is required when transitioning to {to_state}")]
    MissingReason {
        /// The rejection-class target state.
        to_state: String,
    },

    /// A state belongs to a different entity type than the request names.
    #[error("state {state} does not belong to entity type {entity_type}")]
    StateTypeMismatch {
        /// Requested entity type.
        entity_type: String,
        /// State name that belongs elsewhere.
        state: String,
    },
}
