//! # Entity Store
//!
//! Governed entities are owned by external collaborators. The lifecycle
//! manager only needs to look an entity up and write its new state, which
//! is what [`EntityStore`] exposes.
//!
//! [`InMemoryEntityStore`] is the in-process implementation used by the
//! service. It also plays the owning collaborator's role by accepting
//! registrations, either in the type's initial state or, for imported
//! records that predate the lifecycle service, in an explicit state.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use forge_core::{EntityId, Timestamp};
use forge_state::{EntityType, LifecycleState};
use serde::Serialize;
use thiserror::Error;

/// Identity of a governed entity: its type plus its opaque id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, entity_id: EntityId) -> Self {
        Self {
            entity_type,
            entity_id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A governed entity as seen by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GovernedEntity {
    pub entity_id: EntityId,
    pub entity_type: EntityType,
    pub current_state: LifecycleState,
    /// State the entity was registered in. The first audit record starts here.
    pub registered_state: LifecycleState,
    pub created_at: Timestamp,
    /// Escrow account funded for this milestone, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_escrow_id: Option<EntityId>,
}

impl GovernedEntity {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id.clone())
    }
}

/// Failure to apply a state update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity {0} does not exist")]
    NotFound(EntityKey),

    #[error("entity store unavailable: {0}")]
    Unavailable(String),
}

/// Lookup and state update of governed entities.
pub trait EntityStore: Send + Sync {
    /// Current snapshot of the entity, if it exists.
    fn resolve(&self, key: &EntityKey) -> Option<GovernedEntity>;

    /// Overwrite the entity's current state.
    fn update_state(&self, key: &EntityKey, new_state: LifecycleState) -> Result<(), StoreError>;
}

/// Registration request for [`InMemoryEntityStore::register`].
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub entity_id: EntityId,
    pub entity_type: EntityType,
    /// Import state. `None` registers in the type's initial state.
    pub state: Option<LifecycleState>,
    pub linked_escrow_id: Option<EntityId>,
}

impl NewEntity {
    /// A fresh entity in its type's initial state.
    pub fn new(entity_type: EntityType, entity_id: EntityId) -> Self {
        Self {
            entity_id,
            entity_type,
            state: None,
            linked_escrow_id: None,
        }
    }

    pub fn in_state(mut self, state: LifecycleState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn linked_to_escrow(mut self, escrow_id: EntityId) -> Self {
        self.linked_escrow_id = Some(escrow_id);
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("entity {0} is already registered")]
    Duplicate(EntityKey),

    #[error("state {state} does not belong to entity type {entity_type}")]
    StateTypeMismatch {
        entity_type: EntityType,
        state: LifecycleState,
    },

    #[error("only milestones can be linked to an escrow account, not {0}")]
    EscrowLinkNotAllowed(EntityType),
}

/// Sharded in-memory entity store.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entities: DashMap<EntityKey, GovernedEntity>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity. Fails if `(entity_type, entity_id)` already exists.
    pub fn register(&self, new: NewEntity) -> Result<GovernedEntity, RegistrationError> {
        let state = match new.state {
            Some(state) if state.entity_type() != new.entity_type => {
                return Err(RegistrationError::StateTypeMismatch {
                    entity_type: new.entity_type,
                    state,
                });
            }
            Some(state) => state,
            None => new.entity_type.initial_state(),
        };
        if new.linked_escrow_id.is_some() && new.entity_type != EntityType::Milestone {
            return Err(RegistrationError::EscrowLinkNotAllowed(new.entity_type));
        }

        let key = EntityKey::new(new.entity_type, new.entity_id.clone());
        match self.entities.entry(key) {
            Entry::Occupied(occupied) => Err(RegistrationError::Duplicate(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                let entity = GovernedEntity {
                    entity_id: new.entity_id,
                    entity_type: new.entity_type,
                    current_state: state,
                    registered_state: state,
                    created_at: Timestamp::now(),
                    linked_escrow_id: new.linked_escrow_id,
                };
                vacant.insert(entity.clone());
                Ok(entity)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn resolve(&self, key: &EntityKey) -> Option<GovernedEntity> {
        self.entities.get(key).map(|entity| entity.value().clone())
    }

    fn update_state(&self, key: &EntityKey, new_state: LifecycleState) -> Result<(), StoreError> {
        match self.entities.get_mut(key) {
            Some(mut entity) => {
                entity.current_state = new_state;
                Ok(())
            }
            None => Err(StoreError::NotFound(key.clone())),
        }
    }
}
