//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Wiring
//!
//! ```text
//! handlers → LifecycleManager → InMemoryEntityStore
//!                    │
//!                    └─ ChannelDispatcher ──► DispatchWorker ──► listeners
//!                                                  (wallet, escrow release, notifications)
//! ```
//!
//! The worker is returned separately from [`AppState::build`] so tests can
//! drain it deterministically with `run_until_idle`; [`AppState::start`]
//! spawns it onto the runtime for the server binary.

use std::sync::Arc;

use forge_lifecycle::{
    channel, register_standard_effects, DispatchStats, DispatchWorker, InMemoryEntityStore,
    InMemoryWallet, LifecycleManager, ListenerRegistry,
};
use forge_state::TransitionTable;

use crate::config::AppConfig;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub entities: Arc<InMemoryEntityStore>,
    pub lifecycle: Arc<LifecycleManager>,
    pub wallet: Arc<InMemoryWallet>,
    pub dispatch_stats: Arc<DispatchStats>,
}

impl AppState {
    /// Assemble the state and its side-effect worker without starting it.
    pub fn build(config: AppConfig) -> (Self, DispatchWorker) {
        let entities = Arc::new(InMemoryEntityStore::default());
        let wallet = Arc::new(InMemoryWallet::new());
        let (dispatcher, receiver) = channel();
        let dispatch_stats = dispatcher.stats();

        let lifecycle = Arc::new(LifecycleManager::new(
            entities.clone(),
            TransitionTable::new(config.transition_policy),
            Arc::new(dispatcher),
        ));

        let mut registry = ListenerRegistry::new();
        register_standard_effects(&mut registry, &lifecycle, wallet.clone());
        let worker = DispatchWorker::new(receiver, registry, config.dispatch);

        let state = Self {
            config: Arc::new(config),
            entities,
            lifecycle,
            wallet,
            dispatch_stats,
        };
        (state, worker)
    }

    /// Assemble the state and spawn its side-effect worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: AppConfig) -> Self {
        let (state, worker) = Self::build(config);
        tokio::spawn(worker.run());
        state
    }
}
