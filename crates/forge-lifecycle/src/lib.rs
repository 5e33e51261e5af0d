//! # forge-lifecycle: Entity Lifecycle Manager
//!
//! The single authority over approval-state changes of governed entities.
//!
//! ## Flow of a transition
//!
//! 1. [`LifecycleManager::request_transition`] parses the wire request into
//!    typed states, rejecting unknown names and missing rejection reasons.
//! 2. Under the entity's own mutex it resolves the entity from the
//!    [`EntityStore`], checks the caller's expected state, and checks the
//!    edge against the [`TransitionTable`](forge_state::TransitionTable).
//! 3. The store is updated first; only then is the record appended to the
//!    hash-chained [`AuditLog`]. A store failure leaves no record behind.
//! 4. After the lock is released the record is handed to a [`Notifier`].
//!    The [`ChannelDispatcher`] forwards it to a [`DispatchWorker`] task,
//!    which runs the registered [`TransitionListener`]s with timeouts and
//!    bounded retries. Listener failures never roll back a transition.
//!
//! ## Crate Policy
//!
//! - Locks are `parking_lot` and never held across `.await`.
//! - Transitions on different entities never contend on a shared lock.

pub mod audit;
pub mod dispatch;
pub mod effects;
pub mod manager;
pub mod store;

pub use audit::{parse_history, verify_chain, AuditLog, ChainVerification, StateTransitionRecord};
pub use dispatch::{
    channel, ChannelDispatcher, DispatchPolicy, DispatchReceiver, DispatchSnapshot, DispatchStats,
    DispatchWorker, ListenerError, ListenerRegistry, NoopNotifier, Notifier, TransitionListener,
};
pub use effects::{
    register_standard_effects, settlement_instructions, AccountRole, EscrowReleaseListener,
    InMemoryWallet, NotificationLogListener, WalletError, WalletInstruction, WalletLeg,
    WalletService, WalletSettlementListener,
};
pub use manager::{
    HistoryVerification, LifecycleManager, LifecycleStats, StatsSnapshot, TransitionError,
    TransitionRequest,
};
pub use store::{
    EntityKey, EntityStore, GovernedEntity, InMemoryEntityStore, NewEntity, RegistrationError,
    StoreError,
};
