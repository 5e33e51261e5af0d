//! # Identifier Newtypes
//!
//! Governed entities are identified by opaque strings issued by their owning
//! services (`usr_042`, `mile_001`, ...). The lifecycle service never
//! interprets them beyond validating their shape. Transition records get
//! their own UUID-based identifier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Principal recorded on transitions triggered by the service itself.
pub const SYSTEM_PRINCIPAL: &str = "system";

const MAX_ID_LEN: usize = 128;

fn valid_opaque_id(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_ID_LEN && !s.chars().any(|c| c.is_whitespace() || c == ':')
}

/// Opaque identifier of a governed entity, stable for the entity's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Validate and wrap an entity identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if valid_opaque_id(&id) {
            Ok(Self(id))
        } else {
            Err(ValidationError::InvalidEntityId(id))
        }
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the acting principal (an admin user id, or [`SYSTEM_PRINCIPAL`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Validate and wrap a principal identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if valid_opaque_id(&id) {
            Ok(Self(id))
        } else {
            Err(ValidationError::InvalidPrincipalId(id))
        }
    }

    /// The system actor used for automated transitions.
    pub fn system() -> Self {
        Self(SYSTEM_PRINCIPAL.to_string())
    }

    /// Whether this is the system actor.
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_PRINCIPAL
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PrincipalId> for String {
    fn from(id: PrincipalId) -> Self {
        id.0
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier of a state transition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionId(pub Uuid);

impl TransitionId {
    /// Generate a new random transition identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
