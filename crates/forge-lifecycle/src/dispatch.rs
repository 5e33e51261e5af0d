//! # Side-Effect Dispatch
//!
//! The manager hands every applied record to a [`Notifier`] after releasing
//! the entity lock. The production notifier, [`ChannelDispatcher`], pushes
//! the record onto an unbounded channel and returns immediately. A
//! [`DispatchWorker`] task drains the channel and runs the listeners
//! registered for the record's target state plus the global listeners.
//!
//! Each listener attempt runs on the blocking pool under
//! [`DispatchPolicy::attempt_timeout`]. Transient failures and timeouts are
//! retried up to [`DispatchPolicy::max_attempts`] with linear backoff;
//! permanent failures are logged once. Nothing here can undo a transition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forge_state::LifecycleState;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audit::StateTransitionRecord;

/// Receives applied transitions. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, record: &StateTransitionRecord);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _record: &StateTransitionRecord) {}
}

/// Listener failure classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// May succeed on retry.
    #[error("transient: {0}")]
    Transient(String),

    /// Will not succeed on retry.
    #[error("permanent: {0}")]
    Permanent(String),
}

/// A side effect triggered by applied transitions.
///
/// Invoked on the blocking pool; may perform synchronous I/O. Listeners can
/// be invoked more than once for the same record when an attempt times out
/// or fails transiently, so effects should be keyed by `transition_id`.
pub trait TransitionListener: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn on_transition(&self, record: &StateTransitionRecord) -> Result<(), ListenerError>;
}

/// Listeners keyed by target state, plus listeners for every transition.
#[derive(Default)]
pub struct ListenerRegistry {
    by_target: HashMap<LifecycleState, Vec<Arc<dyn TransitionListener>>>,
    global: Vec<Arc<dyn TransitionListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke `listener` whenever an entity enters `state`.
    pub fn on(&mut self, state: LifecycleState, listener: Arc<dyn TransitionListener>) -> &mut Self {
        self.by_target.entry(state).or_default().push(listener);
        self
    }

    /// Invoke `listener` on every applied transition.
    pub fn on_every(&mut self, listener: Arc<dyn TransitionListener>) -> &mut Self {
        self.global.push(listener);
        self
    }

    /// Listeners for a record entering `state`: targeted first, then global.
    pub fn listeners_for(&self, state: LifecycleState) -> Vec<Arc<dyn TransitionListener>> {
        self.by_target
            .get(&state)
            .into_iter()
            .flatten()
            .chain(self.global.iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_target.values().map(Vec::len).sum::<usize>() + self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("targeted_states", &self.by_target.len())
            .field("global", &self.global.len())
            .finish()
    }
}

/// Retry and timeout policy for listener invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    /// Delay before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_millis(2000),
            backoff: Duration::from_millis(100),
        }
    }
}

/// Delivery counters shared between the worker and the metrics endpoint.
#[derive(Debug, Default)]
pub struct DispatchStats {
    queued: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DispatchSnapshot {
    pub queued: u64,
    pub delivered: u64,
    pub retried: u64,
    pub failed: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Sending half: the [`Notifier`] installed in the manager.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<StateTransitionRecord>,
    stats: Arc<DispatchStats>,
}

/// Receiving half, consumed by [`DispatchWorker::new`].
#[derive(Debug)]
pub struct DispatchReceiver {
    receiver: mpsc::UnboundedReceiver<StateTransitionRecord>,
    stats: Arc<DispatchStats>,
}

/// Create a connected dispatcher and receiver.
pub fn channel() -> (ChannelDispatcher, DispatchReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let stats = Arc::new(DispatchStats::default());
    (
        ChannelDispatcher {
            sender,
            stats: Arc::clone(&stats),
        },
        DispatchReceiver { receiver, stats },
    )
}

impl ChannelDispatcher {
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }
}

impl Notifier for ChannelDispatcher {
    fn notify(&self, record: &StateTransitionRecord) {
        if self.sender.send(record.clone()).is_err() {
            tracing::warn!(
                transition_id = %record.transition_id,
                "dispatch worker stopped; side effects skipped"
            );
            return;
        }
        self.stats.queued.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drains the dispatch channel and runs listeners.
pub struct DispatchWorker {
    receiver: mpsc::UnboundedReceiver<StateTransitionRecord>,
    registry: ListenerRegistry,
    policy: DispatchPolicy,
    stats: Arc<DispatchStats>,
}

impl DispatchWorker {
    pub fn new(receiver: DispatchReceiver, registry: ListenerRegistry, policy: DispatchPolicy) -> Self {
        Self {
            receiver: receiver.receiver,
            registry,
            policy,
            stats: receiver.stats,
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Process records until every sender is dropped.
    pub async fn run(mut self) {
        tracing::info!(
            listeners = self.registry.len(),
            max_attempts = self.policy.max_attempts,
            "dispatch worker started"
        );
        while let Some(record) = self.receiver.recv().await {
            self.dispatch(&record).await;
        }
        tracing::info!("dispatch channel closed; worker exiting");
    }

    /// Process every record currently queued, including records queued by
    /// listeners while draining. Returns the number of records processed.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(record) = self.receiver.try_recv() {
            self.dispatch(&record).await;
            processed += 1;
        }
        processed
    }

    async fn dispatch(&self, record: &StateTransitionRecord) {
        for listener in self.registry.listeners_for(record.to_state) {
            self.deliver(listener, record).await;
        }
    }

    async fn deliver(&self, listener: Arc<dyn TransitionListener>, record: &StateTransitionRecord) {
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let task_listener = Arc::clone(&listener);
            let task_record = record.clone();
            let outcome = tokio::time::timeout(
                self.policy.attempt_timeout,
                tokio::task::spawn_blocking(move || task_listener.on_transition(&task_record)),
            )
            .await;

            match outcome {
                Ok(Ok(Ok(()))) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Ok(Ok(Err(ListenerError::Permanent(reason)))) => {
                    tracing::warn!(
                        listener = listener.name(),
                        transition_id = %record.transition_id,
                        %reason,
                        "listener failed permanently"
                    );
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Ok(Ok(Err(ListenerError::Transient(reason)))) => {
                    tracing::warn!(
                        listener = listener.name(),
                        transition_id = %record.transition_id,
                        attempt,
                        %reason,
                        "listener failed"
                    );
                }
                Ok(Err(join_error)) => {
                    tracing::error!(
                        listener = listener.name(),
                        transition_id = %record.transition_id,
                        error = %join_error,
                        "listener panicked"
                    );
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(_elapsed) => {
                    tracing::warn!(
                        listener = listener.name(),
                        transition_id = %record.transition_id,
                        attempt,
                        timeout_ms = self.policy.attempt_timeout.as_millis() as u64,
                        "listener timed out"
                    );
                }
            }

            if attempt < max_attempts {
                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(self.policy.backoff * attempt).await;
            }
        }

        tracing::error!(
            listener = listener.name(),
            transition_id = %record.transition_id,
            attempts = max_attempts,
            "listener retries exhausted"
        );
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for DispatchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchWorker")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
