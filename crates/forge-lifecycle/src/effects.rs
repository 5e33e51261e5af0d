//! # Transition Side Effects
//!
//! Listeners wired to the dispatch worker by [`register_standard_effects`]:
//!
//! | Trigger | Listener | Effect |
//! |---|---|---|
//! | EscrowAccount → `Released` | [`WalletSettlementListener`] | debit escrow hold, credit beneficiary |
//! | EscrowAccount → `Refunded` | [`WalletSettlementListener`] | debit escrow hold, credit investor |
//! | Transaction → `completed` | [`WalletSettlementListener`] | credit depositor |
//! | Milestone → `Approved` | [`EscrowReleaseListener`] | release the linked escrow as `system` |
//! | every transition | [`NotificationLogListener`] | structured notification event |

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use forge_core::{EntityId, PrincipalId, TransitionId};
use forge_state::{EntityType, EscrowState, LifecycleState, MilestoneState, TransactionState};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::audit::StateTransitionRecord;
use crate::dispatch::{ListenerError, ListenerRegistry, TransitionListener};
use crate::manager::{LifecycleManager, TransitionError, TransitionRequest};
use crate::store::EntityKey;

// -- Wallet settlement ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletLeg {
    Debit,
    Credit,
}

/// Which party's balance an instruction moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    /// Funds held against an escrow account.
    EscrowHold,
    /// The innovator receiving released escrow funds.
    Beneficiary,
    /// The investor receiving refunded escrow funds.
    Investor,
    /// The user whose deposit transaction completed.
    Depositor,
}

/// One balance movement, keyed by the transition that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WalletInstruction {
    pub transition_id: TransitionId,
    /// Escrow account or transaction the movement settles.
    pub entity_id: EntityId,
    pub leg: WalletLeg,
    pub account: AccountRole,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet service unavailable: {0}")]
    Unavailable(String),

    #[error("wallet rejected instruction: {0}")]
    Rejected(String),
}

/// Balance updater collaborator.
pub trait WalletService: Send + Sync {
    fn apply(&self, instruction: &WalletInstruction) -> Result<(), WalletError>;
}

/// Wallet instructions implied by a record. Empty for most transitions.
pub fn settlement_instructions(record: &StateTransitionRecord) -> Vec<WalletInstruction> {
    let legs: &[(WalletLeg, AccountRole)] = match record.to_state {
        LifecycleState::Escrow(EscrowState::Released) => &[
            (WalletLeg::Debit, AccountRole::EscrowHold),
            (WalletLeg::Credit, AccountRole::Beneficiary),
        ],
        LifecycleState::Escrow(EscrowState::Refunded) => &[
            (WalletLeg::Debit, AccountRole::EscrowHold),
            (WalletLeg::Credit, AccountRole::Investor),
        ],
        LifecycleState::Transaction(TransactionState::Completed) => {
            &[(WalletLeg::Credit, AccountRole::Depositor)]
        }
        _ => &[],
    };
    legs.iter()
        .map(|(leg, account)| WalletInstruction {
            transition_id: record.transition_id,
            entity_id: record.entity_id.clone(),
            leg: *leg,
            account: *account,
        })
        .collect()
}

/// Applies [`settlement_instructions`] to a [`WalletService`].
pub struct WalletSettlementListener {
    wallet: Arc<dyn WalletService>,
}

impl WalletSettlementListener {
    pub fn new(wallet: Arc<dyn WalletService>) -> Self {
        Self { wallet }
    }

    /// Target states this listener must be registered for.
    pub fn triggers() -> [LifecycleState; 3] {
        [
            LifecycleState::Escrow(EscrowState::Released),
            LifecycleState::Escrow(EscrowState::Refunded),
            LifecycleState::Transaction(TransactionState::Completed),
        ]
    }
}

impl TransitionListener for WalletSettlementListener {
    fn name(&self) -> &'static str {
        "wallet_settlement"
    }

    fn on_transition(&self, record: &StateTransitionRecord) -> Result<(), ListenerError> {
        for instruction in settlement_instructions(record) {
            self.wallet.apply(&instruction).map_err(|err| match err {
                WalletError::Unavailable(msg) => ListenerError::Transient(msg),
                WalletError::Rejected(msg) => ListenerError::Permanent(msg),
            })?;
        }
        Ok(())
    }
}

/// In-process wallet that records applied instructions.
///
/// Re-applying an instruction already seen is a no-op, so retried
/// deliveries do not double-credit.
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    inner: Mutex<WalletLedger>,
}

#[derive(Debug, Default)]
struct WalletLedger {
    applied: Vec<WalletInstruction>,
    seen: HashSet<WalletInstruction>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every applied instruction, in application order.
    pub fn instructions(&self) -> Vec<WalletInstruction> {
        self.inner.lock().applied.clone()
    }
}

impl WalletService for InMemoryWallet {
    fn apply(&self, instruction: &WalletInstruction) -> Result<(), WalletError> {
        let mut ledger = self.inner.lock();
        if ledger.seen.insert(instruction.clone()) {
            ledger.applied.push(instruction.clone());
        }
        Ok(())
    }
}

// -- Milestone approval releases escrow -----------------------------------------

/// On milestone approval, releases the escrow account linked to it.
///
/// Holds a weak reference: the manager owns the dispatcher that feeds the
/// worker that owns this listener.
pub struct EscrowReleaseListener {
    manager: Weak<LifecycleManager>,
}

impl EscrowReleaseListener {
    pub fn new(manager: &Arc<LifecycleManager>) -> Self {
        Self {
            manager: Arc::downgrade(manager),
        }
    }

    pub fn trigger() -> LifecycleState {
        LifecycleState::Milestone(MilestoneState::Approved)
    }
}

impl TransitionListener for EscrowReleaseListener {
    fn name(&self) -> &'static str {
        "escrow_release"
    }

    fn on_transition(&self, record: &StateTransitionRecord) -> Result<(), ListenerError> {
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| ListenerError::Permanent("lifecycle manager shut down".into()))?;

        let milestone = manager
            .entity(&record.key())
            .ok_or_else(|| ListenerError::Permanent(format!("milestone {} vanished", record.key())))?;
        let Some(escrow_id) = milestone.linked_escrow_id else {
            tracing::debug!(
                milestone_id = %record.entity_id,
                "approved milestone has no linked escrow"
            );
            return Ok(());
        };

        let escrow = EntityKey::new(EntityType::EscrowAccount, escrow_id);
        let request = TransitionRequest::typed(
            &escrow,
            LifecycleState::Escrow(EscrowState::Locked),
            LifecycleState::Escrow(EscrowState::Released),
            &PrincipalId::system(),
            None,
        );
        match manager.request_transition(&request) {
            Ok(released) => {
                tracing::info!(
                    milestone_id = %record.entity_id,
                    escrow_id = %escrow.entity_id,
                    transition_id = %released.transition_id,
                    "escrow released on milestone approval"
                );
                Ok(())
            }
            // An earlier attempt that timed out may still have released it.
            Err(TransitionError::StaleState {
                actual: LifecycleState::Escrow(EscrowState::Released),
                ..
            }) => {
                tracing::debug!(
                    milestone_id = %record.entity_id,
                    escrow_id = %escrow.entity_id,
                    "escrow already released"
                );
                Ok(())
            }
            Err(err @ TransitionError::StoreFailure { .. }) => {
                Err(ListenerError::Transient(err.to_string()))
            }
            Err(err) => Err(ListenerError::Permanent(err.to_string())),
        }
    }
}

// -- User notifications ---------------------------------------------------------

/// Emits the user-facing notification event for every transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationLogListener;

impl TransitionListener for NotificationLogListener {
    fn name(&self) -> &'static str {
        "notification_log"
    }

    fn on_transition(&self, record: &StateTransitionRecord) -> Result<(), ListenerError> {
        tracing::info!(
            target: "forge::notifications",
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            from = %record.from_state,
            to = %record.to_state,
            performed_by = %record.performed_by,
            reason = record.reason.as_deref().unwrap_or(""),
            "entity status changed"
        );
        Ok(())
    }
}

/// Register the wallet, escrow-release, and notification listeners.
pub fn register_standard_effects(
    registry: &mut ListenerRegistry,
    manager: &Arc<LifecycleManager>,
    wallet: Arc<dyn WalletService>,
) {
    let settlement: Arc<dyn TransitionListener> = Arc::new(WalletSettlementListener::new(wallet));
    for state in WalletSettlementListener::triggers() {
        registry.on(state, Arc::clone(&settlement));
    }
    registry
        .on(
            EscrowReleaseListener::trigger(),
            Arc::new(EscrowReleaseListener::new(manager)),
        )
        .on_every(Arc::new(NotificationLogListener));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLog, RecordDraft};
    use forge_state::UserState;

    fn record(entity_type: EntityType, from: LifecycleState, to: LifecycleState) -> StateTransitionRecord {
        AuditLog::new().append(
            &EntityKey::new(entity_type, EntityId::new("e1").unwrap()),
            RecordDraft {
                from_state: from,
                to_state: to,
                performed_by: PrincipalId::new("admin_1").unwrap(),
                reason: Some("r".into()),
            },
        )
    }

    #[test]
    fn release_debits_hold_and_credits_beneficiary() {
        let r = record(
            EntityType::EscrowAccount,
            LifecycleState::Escrow(EscrowState::Locked),
            LifecycleState::Escrow(EscrowState::Released),
        );
        let legs: Vec<_> = settlement_instructions(&r)
            .into_iter()
            .map(|i| (i.leg, i.account))
            .collect();
        assert_eq!(
            legs,
            vec![
                (WalletLeg::Debit, AccountRole::EscrowHold),
                (WalletLeg::Credit, AccountRole::Beneficiary),
            ]
        );
    }

    #[test]
    fn refund_credits_investor() {
        let r = record(
            EntityType::EscrowAccount,
            LifecycleState::Escrow(EscrowState::Locked),
            LifecycleState::Escrow(EscrowState::Refunded),
        );
        let accounts: Vec<_> = settlement_instructions(&r).iter().map(|i| i.account).collect();
        assert_eq!(accounts, vec![AccountRole::EscrowHold, AccountRole::Investor]);
    }

    #[test]
    fn completed_transaction_credits_depositor() {
        let r = record(
            EntityType::Transaction,
            LifecycleState::Transaction(TransactionState::Verifying),
            LifecycleState::Transaction(TransactionState::Completed),
        );
        let instructions = settlement_instructions(&r);
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].leg, WalletLeg::Credit);
        assert_eq!(instructions[0].transition_id, r.transition_id);
    }

    #[test]
    fn other_transitions_move_no_money() {
        let r = record(
            EntityType::User,
            LifecycleState::User(UserState::PendingApproval),
            LifecycleState::User(UserState::Verified),
        );
        assert!(settlement_instructions(&r).is_empty());
    }

    #[test]
    fn wallet_ignores_replayed_instructions() {
        let wallet = Arc::new(InMemoryWallet::new());
        let listener = WalletSettlementListener::new(wallet.clone());
        let r = record(
            EntityType::EscrowAccount,
            LifecycleState::Escrow(EscrowState::Locked),
            LifecycleState::Escrow(EscrowState::Released),
        );
        listener.on_transition(&r).unwrap();
        listener.on_transition(&r).unwrap();
        assert_eq!(wallet.instructions().len(), 2);
    }

    struct DownWallet;

    impl WalletService for DownWallet {
        fn apply(&self, _instruction: &WalletInstruction) -> Result<(), WalletError> {
            Err(WalletError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn unavailable_wallet_is_transient() {
        let listener = WalletSettlementListener::new(Arc::new(DownWallet));
        let r = record(
            EntityType::Transaction,
            LifecycleState::Transaction(TransactionState::Verifying),
            LifecycleState::Transaction(TransactionState::Completed),
        );
        assert!(matches!(
            listener.on_transition(&r),
            Err(ListenerError::Transient(_))
        ));
    }

    #[test]
    fn notification_listener_always_succeeds() {
        let r = record(
            EntityType::User,
            LifecycleState::User(UserState::PendingApproval),
            LifecycleState::User(UserState::Rejected),
        );
        assert_eq!(NotificationLogListener.on_transition(&r), Ok(()));
    }

    fn manager_with_linked_escrow(
        escrow_state: EscrowState,
    ) -> (Arc<LifecycleManager>, StateTransitionRecord) {
        use crate::dispatch::NoopNotifier;
        use crate::store::{InMemoryEntityStore, NewEntity};
        use forge_state::TransitionTable;

        let store = Arc::new(InMemoryEntityStore::new());
        store
            .register(
                NewEntity::new(EntityType::EscrowAccount, EntityId::new("esc_1").unwrap())
                    .in_state(LifecycleState::Escrow(escrow_state)),
            )
            .unwrap();
        store
            .register(
                NewEntity::new(EntityType::Milestone, EntityId::new("e1").unwrap())
                    .in_state(LifecycleState::Milestone(MilestoneState::Approved))
                    .linked_to_escrow(EntityId::new("esc_1").unwrap()),
            )
            .unwrap();
        let manager = Arc::new(LifecycleManager::new(
            store,
            TransitionTable::standard(),
            Arc::new(NoopNotifier),
        ));
        let approval = record(
            EntityType::Milestone,
            LifecycleState::Milestone(MilestoneState::PendingVerification),
            LifecycleState::Milestone(MilestoneState::Approved),
        );
        (manager, approval)
    }

    #[test]
    fn escrow_release_replay_is_idempotent() {
        let (manager, approval) = manager_with_linked_escrow(EscrowState::Locked);
        let listener = EscrowReleaseListener::new(&manager);
        assert_eq!(listener.on_transition(&approval), Ok(()));
        assert_eq!(listener.on_transition(&approval), Ok(()));

        let escrow = EntityKey::new(EntityType::EscrowAccount, EntityId::new("esc_1").unwrap());
        assert_eq!(manager.history(&escrow).len(), 1);
        assert_eq!(
            manager.entity(&escrow).unwrap().current_state,
            LifecycleState::Escrow(EscrowState::Released)
        );
    }

    #[test]
    fn refunded_escrow_is_a_permanent_failure() {
        let (manager, approval) = manager_with_linked_escrow(EscrowState::Refunded);
        let listener = EscrowReleaseListener::new(&manager);
        assert!(matches!(
            listener.on_transition(&approval),
            Err(ListenerError::Permanent(_))
        ));
    }
}
