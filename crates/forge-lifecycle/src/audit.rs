//! # Audit Log: Append-Only, Hash-Chained Transition History
//!
//! Every applied transition appends a [`StateTransitionRecord`] to the
//! entity's history. Each record carries the digest of its predecessor
//! (the first chains from [`GENESIS_DIGEST`]) and its own SHA-256 digest
//! over every field, so any later mutation is detectable with
//! [`verify_chain`].
//!
//! Per-entity histories are immutable `Arc<Vec<_>>` snapshots. An append
//! replaces the snapshot; readers holding the previous one keep a complete,
//! consistent view and never observe a half-written record.

use std::sync::Arc;

use dashmap::DashMap;
use forge_core::{
    EntityId, ForgeError, PrincipalId, Sha256Hex, Timestamp, TransitionId, ValidationError,
    GENESIS_DIGEST,
};
use forge_state::{EntityType, LifecycleState};
use serde::{Deserialize, Serialize};

use crate::store::EntityKey;

/// Immutable record of one applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordWire")]
pub struct StateTransitionRecord {
    pub transition_id: TransitionId,
    pub entity_id: EntityId,
    pub entity_type: EntityType,
    pub from_state: LifecycleState,
    pub to_state: LifecycleState,
    pub performed_by: PrincipalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: Timestamp,
    /// 1-based position in the entity's history.
    pub sequence: u64,
    pub previous_digest: String,
    pub digest: String,
}

impl StateTransitionRecord {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id.clone())
    }

    /// Recompute this record's digest from its contents.
    pub fn compute_digest(&self) -> String {
        Sha256Hex::new()
            .field(&self.previous_digest)
            .field(&self.transition_id.to_string())
            .field(self.entity_type.as_str())
            .field(self.entity_id.as_str())
            .field(&self.sequence.to_string())
            .field(self.from_state.name())
            .field(self.to_state.name())
            .field(self.performed_by.as_str())
            .optional_field(self.reason.as_deref())
            .field(&self.timestamp.to_rfc3339())
            .finish()
    }
}

/// Wire form of a record: states arrive as bare names and can only be
/// resolved once the entity type is known.
#[derive(Deserialize)]
struct RecordWire {
    transition_id: TransitionId,
    entity_id: EntityId,
    entity_type: EntityType,
    from_state: String,
    to_state: String,
    performed_by: PrincipalId,
    #[serde(default)]
    reason: Option<String>,
    timestamp: Timestamp,
    sequence: u64,
    previous_digest: String,
    digest: String,
}

impl TryFrom<RecordWire> for StateTransitionRecord {
    type Error = ValidationError;

    fn try_from(wire: RecordWire) -> Result<Self, Self::Error> {
        Ok(Self {
            from_state: LifecycleState::parse(wire.entity_type, &wire.from_state)?,
            to_state: LifecycleState::parse(wire.entity_type, &wire.to_state)?,
            transition_id: wire.transition_id,
            entity_id: wire.entity_id,
            entity_type: wire.entity_type,
            performed_by: wire.performed_by,
            reason: wire.reason,
            timestamp: wire.timestamp,
            sequence: wire.sequence,
            previous_digest: wire.previous_digest,
            digest: wire.digest,
        })
    }
}

/// The parts of a record supplied by the caller; the log assigns the rest.
#[derive(Debug, Clone)]
pub(crate) struct RecordDraft {
    pub from_state: LifecycleState,
    pub to_state: LifecycleState,
    pub performed_by: PrincipalId,
    pub reason: Option<String>,
}

/// Outcome of [`verify_chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    /// Sequence number of the first record that fails to verify.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<u64>,
}

impl ChainVerification {
    pub fn into_result(self) -> Result<(), ForgeError> {
        match self.broken_at {
            Some(sequence) => Err(ForgeError::Integrity(format!(
                "hash chain broken at sequence {sequence}"
            ))),
            None => Ok(()),
        }
    }
}

/// Parse an exported history: a JSON array of records as served by the
/// history endpoint.
pub fn parse_history(json: &str) -> Result<Vec<StateTransitionRecord>, ForgeError> {
    Ok(serde_json::from_str(json)?)
}

/// Check sequence continuity, digest linkage, and each record's own digest.
pub fn verify_chain(records: &[StateTransitionRecord]) -> ChainVerification {
    let mut previous_digest = GENESIS_DIGEST;
    for (index, record) in records.iter().enumerate() {
        let intact = record.sequence == index as u64 + 1
            && record.previous_digest == previous_digest
            && record.digest == record.compute_digest();
        if !intact {
            return ChainVerification {
                valid: false,
                broken_at: Some(index as u64 + 1),
            };
        }
        previous_digest = record.digest.as_str();
    }
    ChainVerification {
        valid: true,
        broken_at: None,
    }
}

/// Per-entity append-only histories.
#[derive(Debug, Default)]
pub struct AuditLog {
    histories: DashMap<EntityKey, Arc<Vec<StateTransitionRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of an entity's history, oldest first. Empty if none.
    pub fn history(&self, key: &EntityKey) -> Arc<Vec<StateTransitionRecord>> {
        self.histories
            .get(key)
            .map(|history| Arc::clone(history.value()))
            .unwrap_or_default()
    }

    /// Number of entities with at least one record.
    pub fn entity_count(&self) -> usize {
        self.histories.len()
    }

    /// Seal and append a record. Infallible.
    ///
    /// The caller must hold the entity's transition lock so that appends for
    /// one entity are serialized in the order their store updates happened.
    /// The next snapshot is built off the map; the shard lock is held only
    /// for the swap.
    pub(crate) fn append(&self, key: &EntityKey, draft: RecordDraft) -> StateTransitionRecord {
        let current = self.history(key);
        let previous = current.last();

        let now = Timestamp::now();
        let timestamp = previous.map_or(now, |p| now.at_least(p.timestamp));
        let sequence = previous.map_or(1, |p| p.sequence + 1);
        let previous_digest = previous
            .map_or(GENESIS_DIGEST, |p| p.digest.as_str())
            .to_string();

        let mut record = StateTransitionRecord {
            transition_id: TransitionId::new(),
            entity_id: key.entity_id.clone(),
            entity_type: key.entity_type,
            from_state: draft.from_state,
            to_state: draft.to_state,
            performed_by: draft.performed_by,
            reason: draft.reason,
            timestamp,
            sequence,
            previous_digest,
            digest: String::new(),
        };
        record.digest = record.compute_digest();

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(record.clone());
        self.histories.insert(key.clone(), Arc::new(next));
        record
    }
}
