//! # Lifecycle Manager
//!
//! Decides whether a requested state change is legal, applies it through
//! the entity store, records it in the audit log, and hands the record to
//! the notifier.
//!
//! ## Check order
//!
//! 1. Input validation (names, identifiers, rejection reason).
//! 2. The entity exists.
//! 3. The caller's expected state matches the current state.
//! 4. The edge is legal under the transition table.
//!
//! Steps 2-4 and the apply run under a per-entity mutex. Two requests that
//! race on the same pre-state therefore resolve to exactly one success; the
//! loser sees [`TransitionError::StaleState`].
//!
//! Entity reads take the same mutex, so a snapshot never shows a new
//! `current_state` whose record has not been appended yet. Mutexes are only
//! created for entities the store knows about.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use forge_core::{EntityId, PrincipalId, ValidationError};
use forge_state::{validate_walk, EntityType, LifecycleState, TransitionTable};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{verify_chain, AuditLog, RecordDraft, StateTransitionRecord};
use crate::dispatch::Notifier;
use crate::store::{EntityKey, EntityStore, GovernedEntity, StoreError};

/// A transition request as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub entity_id: String,
    pub entity_type: String,
    pub expected_from_state: String,
    pub to_state: String,
    pub performed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TransitionRequest {
    /// Build a request from typed parts.
    pub fn typed(
        key: &EntityKey,
        expected_from_state: LifecycleState,
        to_state: LifecycleState,
        performed_by: &PrincipalId,
        reason: Option<String>,
    ) -> Self {
        Self {
            entity_id: key.entity_id.to_string(),
            entity_type: key.entity_type.to_string(),
            expected_from_state: expected_from_state.name().to_string(),
            to_state: to_state.name().to_string(),
            performed_by: performed_by.to_string(),
            reason,
        }
    }

    fn parse(&self) -> Result<ParsedRequest, ValidationError> {
        let entity_type: EntityType = self.entity_type.parse()?;
        let entity_id = EntityId::new(self.entity_id.as_str())?;
        let expected_from_state = LifecycleState::parse(entity_type, &self.expected_from_state)?;
        let to_state = LifecycleState::parse(entity_type, &self.to_state)?;
        let performed_by = PrincipalId::new(self.performed_by.as_str())?;

        let reason = self
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        if to_state.requires_reason() && reason.is_none() {
            return Err(ValidationError::MissingReason {
                to_state: to_state.name().to_string(),
            });
        }

        Ok(ParsedRequest {
            key: EntityKey::new(entity_type, entity_id),
            expected_from_state,
            to_state,
            performed_by,
            reason,
        })
    }
}

#[derive(Debug)]
struct ParsedRequest {
    key: EntityKey,
    expected_from_state: LifecycleState,
    to_state: LifecycleState,
    performed_by: PrincipalId,
    reason: Option<String>,
}

/// Why a transition was not applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("entity {key} not found")]
    EntityNotFound { key: EntityKey },

    #[error("stale state for {key}: expected {expected}, actual {actual}")]
    StaleState {
        key: EntityKey,
        expected: LifecycleState,
        actual: LifecycleState,
    },

    #[error("illegal transition for {key}: {current} -> {requested}")]
    IllegalTransition {
        key: EntityKey,
        current: LifecycleState,
        requested: LifecycleState,
        legal_next_states: Vec<LifecycleState>,
    },

    #[error("entity store rejected update for {key}: {source}")]
    StoreFailure {
        key: EntityKey,
        #[source]
        source: StoreError,
    },
}

impl TransitionError {
    /// Whether the same request could succeed after refreshing state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleState { .. } | Self::StoreFailure { .. })
    }
}

/// Outcome counters.
#[derive(Debug, Default)]
pub struct LifecycleStats {
    applied: AtomicU64,
    entity_not_found: AtomicU64,
    stale_state: AtomicU64,
    illegal_transition: AtomicU64,
    validation: AtomicU64,
    store_failure: AtomicU64,
}

/// Point-in-time copy of [`LifecycleStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub applied: u64,
    pub entity_not_found: u64,
    pub stale_state: u64,
    pub illegal_transition: u64,
    pub validation: u64,
    pub store_failure: u64,
}

impl LifecycleStats {
    fn record(&self, outcome: &Result<StateTransitionRecord, TransitionError>) {
        let counter = match outcome {
            Ok(_) => &self.applied,
            Err(TransitionError::Validation(_)) => &self.validation,
            Err(TransitionError::EntityNotFound { .. }) => &self.entity_not_found,
            Err(TransitionError::StaleState { .. }) => &self.stale_state,
            Err(TransitionError::IllegalTransition { .. }) => &self.illegal_transition,
            Err(TransitionError::StoreFailure { .. }) => &self.store_failure,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            entity_not_found: self.entity_not_found.load(Ordering::Relaxed),
            stale_state: self.stale_state.load(Ordering::Relaxed),
            illegal_transition: self.illegal_transition.load(Ordering::Relaxed),
            validation: self.validation.load(Ordering::Relaxed),
            store_failure: self.store_failure.load(Ordering::Relaxed),
        }
    }
}

/// Integrity report for one entity's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryVerification {
    pub entity_id: EntityId,
    pub entity_type: EntityType,
    pub records: usize,
    pub chain_valid: bool,
    pub walk_valid: bool,
    /// Sequence number of the first record that fails either check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<u64>,
}

/// The lifecycle authority for all governed entities.
pub struct LifecycleManager {
    store: Arc<dyn EntityStore>,
    table: TransitionTable,
    audit: AuditLog,
    notifier: Arc<dyn Notifier>,
    locks: DashMap<EntityKey, Arc<Mutex<()>>>,
    stats: LifecycleStats,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("policy", &self.table.policy())
            .field("entities_with_history", &self.audit.entity_count())
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn EntityStore>,
        table: TransitionTable,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            table,
            audit: AuditLog::new(),
            notifier,
            locks: DashMap::new(),
            stats: LifecycleStats::default(),
        }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current snapshot of an entity from the store.
    ///
    /// Waits for any in-flight transition on the entity to finish.
    pub fn entity(&self, key: &EntityKey) -> Option<GovernedEntity> {
        self.store.resolve(key)?;
        let lock = self.entity_lock(key);
        let _guard = lock.lock();
        self.store.resolve(key)
    }

    /// Legal next states from `state` under the active policy.
    pub fn legal_next_states(&self, state: LifecycleState) -> &[LifecycleState] {
        self.table.legal_next_states(state)
    }

    /// Validate and apply one transition.
    pub fn request_transition(
        &self,
        request: &TransitionRequest,
    ) -> Result<StateTransitionRecord, TransitionError> {
        let outcome = request
            .parse()
            .map_err(TransitionError::from)
            .and_then(|parsed| self.apply(parsed));
        self.stats.record(&outcome);

        match &outcome {
            Ok(record) => {
                tracing::info!(
                    entity_type = %record.entity_type,
                    entity_id = %record.entity_id,
                    from = %record.from_state,
                    to = %record.to_state,
                    performed_by = %record.performed_by,
                    transition_id = %record.transition_id,
                    "transition applied"
                );
                self.notifier.notify(record);
            }
            Err(TransitionError::StoreFailure { key, source }) => {
                tracing::error!(entity = %key, error = %source, "entity store rejected transition");
            }
            Err(err) => {
                tracing::debug!(
                    entity_type = %request.entity_type,
                    entity_id = %request.entity_id,
                    error = %err,
                    "transition refused"
                );
            }
        }
        outcome
    }

    /// Apply each request independently, in input order.
    pub fn batch_request_transition(
        &self,
        requests: &[TransitionRequest],
    ) -> Vec<Result<StateTransitionRecord, TransitionError>> {
        requests
            .iter()
            .map(|request| self.request_transition(request))
            .collect()
    }

    /// History of an entity, oldest first. Empty for unknown entities.
    pub fn history(&self, key: &EntityKey) -> Arc<Vec<StateTransitionRecord>> {
        self.audit.history(key)
    }

    /// Re-check the hash chain and state-machine walk of an entity's history.
    pub fn verify_history(&self, key: &EntityKey) -> HistoryVerification {
        let records = self.audit.history(key);
        let chain = verify_chain(&records);

        let start = self
            .entity(key)
            .map(|entity| entity.registered_state)
            .or_else(|| records.first().map(|r| r.from_state));
        let walk = match start {
            Some(start) => validate_walk(
                &self.table,
                start,
                records.iter().map(|r| (r.from_state, r.to_state)),
            )
            .map(|_| ())
            .map_err(|err| records[err.index()].sequence),
            None => Ok(()),
        };

        let broken_at = match (chain.broken_at, walk.err()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        HistoryVerification {
            entity_id: key.entity_id.clone(),
            entity_type: key.entity_type,
            records: records.len(),
            chain_valid: chain.valid,
            walk_valid: walk.is_ok(),
            broken_at,
        }
    }

    fn entity_lock(&self, key: &EntityKey) -> Arc<Mutex<()>> {
        // Clone the Arc out so the shard guard is released before locking.
        Arc::clone(self.locks.entry(key.clone()).or_default().value())
    }

    fn apply(&self, request: ParsedRequest) -> Result<StateTransitionRecord, TransitionError> {
        let key = request.key;
        let not_found = |key: &EntityKey| TransitionError::EntityNotFound { key: key.clone() };
        self.store.resolve(&key).ok_or_else(|| not_found(&key))?;

        let lock = self.entity_lock(&key);
        let _guard = lock.lock();

        let entity = self.store.resolve(&key).ok_or_else(|| not_found(&key))?;

        if entity.current_state != request.expected_from_state {
            return Err(TransitionError::StaleState {
                key,
                expected: request.expected_from_state,
                actual: entity.current_state,
            });
        }

        let current = entity.current_state;
        if !self.table.is_legal(current, request.to_state) {
            return Err(TransitionError::IllegalTransition {
                key,
                current,
                requested: request.to_state,
                legal_next_states: self.table.legal_next_states(current).to_vec(),
            });
        }

        self.store
            .update_state(&key, request.to_state)
            .map_err(|source| TransitionError::StoreFailure {
                key: key.clone(),
                source,
            })?;

        Ok(self.audit.append(
            &key,
            RecordDraft {
                from_state: current,
                to_state: request.to_state,
                performed_by: request.performed_by,
                reason: request.reason,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NoopNotifier;
    use crate::store::{InMemoryEntityStore, NewEntity};
    use forge_state::{MilestoneState, TransactionSettlement, TransitionPolicy, UserState};
    use std::sync::mpsc;
    use std::time::Duration;

    fn manager_with(store: Arc<InMemoryEntityStore>, table: TransitionTable) -> LifecycleManager {
        LifecycleManager::new(store, table, Arc::new(NoopNotifier))
    }

    fn request(
        entity_type: &str,
        entity_id: &str,
        from: &str,
        to: &str,
        reason: Option<&str>,
    ) -> TransitionRequest {
        TransitionRequest {
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            expected_from_state: from.into(),
            to_state: to.into(),
            performed_by: "admin_1".into(),
            reason: reason.map(str::to_string),
        }
    }

    fn milestone_at(store: &InMemoryEntityStore, id: &str, state: MilestoneState) -> EntityKey {
        store
            .register(
                NewEntity::new(EntityType::Milestone, EntityId::new(id).unwrap())
                    .in_state(LifecycleState::Milestone(state)),
            )
            .unwrap()
            .key()
    }

    #[test]
    fn validation_precedes_existence() {
        let manager = manager_with(Arc::default(), TransitionTable::standard());
        let err = manager
            .request_transition(&request("Milestone", "ghost", "Planned", "Locked", None))
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Validation(ValidationError::StateTypeMismatch { .. })
        ));
    }

    #[test]
    fn blank_reason_counts_as_missing() {
        let store = Arc::new(InMemoryEntityStore::new());
        milestone_at(&store, "m1", MilestoneState::PendingVerification);
        let manager = manager_with(store, TransitionTable::standard());
        let err = manager
            .request_transition(&request(
                "Milestone",
                "m1",
                "PendingVerification",
                "Rejected",
                Some("   "),
            ))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Validation(ValidationError::MissingReason {
                to_state: "Rejected".into()
            })
        );
        assert_eq!(manager.stats().validation, 1);
    }

    #[test]
    fn reason_is_trimmed_and_recorded() {
        let store = Arc::new(InMemoryEntityStore::new());
        let key = milestone_at(&store, "m1", MilestoneState::PendingVerification);
        let manager = manager_with(store, TransitionTable::standard());
        let record = manager
            .request_transition(&request(
                "Milestone",
                "m1",
                "PendingVerification",
                "Rejected",
                Some("  missing receipts "),
            ))
            .unwrap();
        assert_eq!(record.reason.as_deref(), Some("missing receipts"));
        assert_eq!(manager.history(&key).len(), 1);
    }

    #[test]
    fn stale_is_checked_before_legality() {
        let store = Arc::new(InMemoryEntityStore::new());
        milestone_at(&store, "m1", MilestoneState::Approved);
        let manager = manager_with(store, TransitionTable::standard());
        // Planned -> Approved is also illegal, but the stale check wins.
        let err = manager
            .request_transition(&request("Milestone", "m1", "Planned", "Approved", None))
            .unwrap_err();
        assert!(matches!(err, TransitionError::StaleState { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn illegal_transition_reports_legal_next_states() {
        let store = Arc::new(InMemoryEntityStore::new());
        milestone_at(&store, "m1", MilestoneState::Planned);
        let manager = manager_with(store, TransitionTable::standard());
        let err = manager
            .request_transition(&request("Milestone", "m1", "Planned", "Approved", None))
            .unwrap_err();
        match err {
            TransitionError::IllegalTransition {
                current,
                legal_next_states,
                ..
            } => {
                assert_eq!(current, LifecycleState::Milestone(MilestoneState::Planned));
                assert_eq!(
                    legal_next_states,
                    vec![LifecycleState::Milestone(MilestoneState::InProgress)]
                );
            }
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn policy_controls_transaction_shortcut() {
        for (settlement, legal) in [
            (TransactionSettlement::Staged, false),
            (TransactionSettlement::Direct, true),
        ] {
            let store = Arc::new(InMemoryEntityStore::new());
            store
                .register(NewEntity::new(
                    EntityType::Transaction,
                    EntityId::new("txn_001").unwrap(),
                ))
                .unwrap();
            let table = TransitionTable::new(TransitionPolicy {
                transaction_settlement: settlement,
            });
            let manager = manager_with(store, table);
            let outcome = manager.request_transition(&request(
                "Transaction",
                "txn_001",
                "pending",
                "completed",
                None,
            ));
            assert_eq!(outcome.is_ok(), legal, "{settlement:?}");
        }
    }

    #[test]
    fn verify_history_reports_intact_chain() {
        let store = Arc::new(InMemoryEntityStore::new());
        let key = milestone_at(&store, "m1", MilestoneState::Planned);
        let manager = manager_with(store, TransitionTable::standard());
        manager
            .request_transition(&request("Milestone", "m1", "Planned", "InProgress", None))
            .unwrap();
        manager
            .request_transition(&request(
                "Milestone",
                "m1",
                "InProgress",
                "PendingVerification",
                None,
            ))
            .unwrap();
        let report = manager.verify_history(&key);
        assert_eq!(report.records, 2);
        assert!(report.chain_valid);
        assert!(report.walk_valid);
        assert_eq!(report.broken_at, None);
    }

    #[test]
    fn verify_history_of_unknown_entity_is_empty_and_valid() {
        let manager = manager_with(Arc::default(), TransitionTable::standard());
        let key = EntityKey::new(EntityType::User, EntityId::new("nobody").unwrap());
        let report = manager.verify_history(&key);
        assert_eq!(report.records, 0);
        assert!(report.chain_valid && report.walk_valid);
    }

    #[test]
    fn stats_count_each_outcome() {
        let store = Arc::new(InMemoryEntityStore::new());
        milestone_at(&store, "m1", MilestoneState::Planned);
        let manager = manager_with(store, TransitionTable::standard());
        let _ = manager.request_transition(&request("Milestone", "m1", "Planned", "InProgress", None));
        let _ = manager.request_transition(&request("Milestone", "m1", "Planned", "InProgress", None));
        let _ = manager.request_transition(&request("Milestone", "nope", "Planned", "InProgress", None));
        let _ = manager.request_transition(&request("Galaxy", "m1", "Planned", "InProgress", None));
        assert_eq!(
            manager.stats(),
            StatsSnapshot {
                applied: 1,
                stale_state: 1,
                entity_not_found: 1,
                validation: 1,
                ..StatsSnapshot::default()
            }
        );
    }

    #[test]
    fn unknown_entities_leave_no_lock_behind() {
        let manager = manager_with(Arc::default(), TransitionTable::standard());
        for i in 0..1_000 {
            let err = manager
                .request_transition(&request(
                    "User",
                    &format!("ghost_{i}"),
                    "PendingApproval",
                    "Verified",
                    None,
                ))
                .unwrap_err();
            assert!(matches!(err, TransitionError::EntityNotFound { .. }));
        }
        let ghost = EntityKey::new(EntityType::User, EntityId::new("ghost_0").unwrap());
        assert!(manager.entity(&ghost).is_none());
        assert!(manager.verify_history(&ghost).chain_valid);
        assert_eq!(manager.locks.len(), 0);
        assert_eq!(manager.stats().entity_not_found, 1_000);
    }

    /// Store that parks inside `update_state` after writing, until resumed.
    struct PausingStore {
        inner: InMemoryEntityStore,
        written: Mutex<mpsc::Sender<()>>,
        resume: Mutex<mpsc::Receiver<()>>,
    }

    impl EntityStore for PausingStore {
        fn resolve(&self, key: &EntityKey) -> Option<GovernedEntity> {
            self.inner.resolve(key)
        }

        fn update_state(&self, key: &EntityKey, new_state: LifecycleState) -> Result<(), StoreError> {
            self.inner.update_state(key, new_state)?;
            let _ = self.written.lock().send(());
            let _ = self.resume.lock().recv();
            Ok(())
        }
    }

    #[test]
    fn readers_never_see_state_without_its_record() {
        let (written_tx, written_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        let inner = InMemoryEntityStore::new();
        let key = inner
            .register(NewEntity::new(EntityType::User, EntityId::new("u1").unwrap()))
            .unwrap()
            .key();
        let store = Arc::new(PausingStore {
            inner,
            written: Mutex::new(written_tx),
            resume: Mutex::new(resume_rx),
        });
        let manager = LifecycleManager::new(store, TransitionTable::standard(), Arc::new(NoopNotifier));

        std::thread::scope(|s| {
            let writer = s.spawn(|| {
                manager.request_transition(&request("User", "u1", "PendingApproval", "Verified", None))
            });
            written_rx.recv().unwrap();

            let reader = s.spawn(|| {
                let entity = manager.entity(&key).unwrap();
                (entity.current_state, manager.history(&key).len())
            });
            std::thread::sleep(Duration::from_millis(50));
            assert!(!reader.is_finished(), "read completed mid-transition");

            resume_tx.send(()).unwrap();
            writer.join().unwrap().unwrap();
            let (state, records) = reader.join().unwrap();
            assert_eq!(state, LifecycleState::User(UserState::Verified));
            assert_eq!(records, 1);
        });
    }
}
