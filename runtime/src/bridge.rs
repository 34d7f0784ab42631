//! Event hub → store bridge.
//!
//! The [`ActionBridge`] subscribes to every `(service, event type)` pair known
//! to its [`MappingRegistry`]. When an event arrives, each mapping for that pair
//! is applied against a read-only view of the current state, and every
//! resulting action is dispatched into the [`Store`], in registration order.
//!
//! Transformer failures are logged and skipped. They never reach the emitter
//! and never prevent the other mappings for the same event from running.

use crate::Store;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use support_sync_core::event_hub::{Event, EventHub, Handler, HubError};
use support_sync_core::mapping::{Mapping, MappingRegistry};
use support_sync_core::reducer::Reducer;

type Key = (String, String);

/// Turns hub events into store actions.
///
/// Cloning yields another handle to the same bridge.
pub struct ActionBridge<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    hub: EventHub,
    store: Store<S, A, E, R>,
    registry: Arc<RwLock<MappingRegistry<S, A>>>,
    subscriptions: Arc<Mutex<Vec<(Key, Handler)>>>,
}

impl<S, A, E, R> ActionBridge<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: Send + Clone + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create an inactive bridge with an empty registry
    #[must_use]
    pub fn new(hub: EventHub, store: Store<S, A, E, R>) -> Self {
        Self {
            hub,
            store,
            registry: Arc::new(RwLock::new(MappingRegistry::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add mappings to the registry.
    ///
    /// If the bridge is already active, pairs that were not subscribed yet are
    /// subscribed immediately.
    pub fn register_mappings(&self, mappings: impl IntoIterator<Item = Mapping<S, A>>) {
        let was_active = self.is_active();
        {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            registry.register(mappings);
        }
        if was_active {
            self.activate();
        }
    }

    /// Subscribe to every registered pair.
    ///
    /// Idempotent: a pair is subscribed at most once no matter how often this
    /// is called. Returns the number of new subscriptions.
    pub fn activate(&self) -> usize {
        let keys = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys();

        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        let subscribed: HashSet<Key> = subscriptions.iter().map(|(key, _)| key.clone()).collect();

        let mut added = 0;
        for key in keys {
            if subscribed.contains(&key) {
                continue;
            }
            let handler = self.handler();
            self.hub.on(&key.0, &key.1, Arc::clone(&handler));
            subscriptions.push((key, handler));
            added += 1;
        }

        if added > 0 {
            tracing::info!(subscriptions = subscriptions.len(), added, "Action bridge active");
        }
        added
    }

    /// Remove every subscription made by [`ActionBridge::activate`]
    pub fn deactivate(&self) {
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        for ((service, event_type), handler) in subscriptions.drain(..) {
            self.hub.off(&service, &event_type, &handler);
        }
        tracing::info!("Action bridge deactivated");
    }

    /// Whether any subscription is live
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Number of registered mappings
    #[must_use]
    pub fn mapping_count(&self) -> usize {
        self.registry.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The store actions are dispatched into
    #[must_use]
    pub const fn store(&self) -> &Store<S, A, E, R> {
        &self.store
    }

    fn handler(&self) -> Handler {
        let store = self.store.clone();
        let registry = Arc::clone(&self.registry);

        Arc::new(move |event: &Event| forward(&store, &registry, event))
    }
}

/// Apply every mapping for `event` and dispatch the resulting actions.
///
/// A rejected dispatch does not stop the remaining mappings.
fn forward<S, A, E, R>(
    store: &Store<S, A, E, R>,
    registry: &RwLock<MappingRegistry<S, A>>,
    event: &Event,
) -> Result<(), HubError>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: Send + Clone + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let mappings = registry
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .mappings_for(&event.service, &event.event_type);

    let mut failure = None;
    for mapping in mappings {
        let action_type = mapping.action_type().resolve(&event.payload);
        let transformed = store.state(|state| mapping.apply(&event.payload, state));

        match transformed {
            Ok(Some(action)) => {
                metrics::counter!("bridge.dispatch", "action" => action_type).increment(1);
                tracing::debug!(
                    service = %event.service,
                    event_type = %event.event_type,
                    action_type,
                    "Dispatching mapped action"
                );
                if let Err(error) = store.dispatch(action) {
                    metrics::counter!("bridge.dispatch.failed", "action" => action_type).increment(1);
                    tracing::warn!(
                        service = %event.service,
                        event_type = %event.event_type,
                        action_type,
                        error = %error,
                        "Dispatch failed, continuing with remaining mappings"
                    );
                    failure.get_or_insert_with(|| HubError::HandlerFailed(error.to_string()));
                }
            },
            Ok(None) => {
                metrics::counter!("bridge.dispatch.suppressed", "action" => action_type).increment(1);
                tracing::trace!(action_type, "Mapping suppressed dispatch");
            },
            Err(error) => {
                metrics::counter!("bridge.transform.failed", "action" => action_type).increment(1);
                tracing::warn!(
                    service = %event.service,
                    event_type = %event.event_type,
                    action_type,
                    error = %error,
                    "Mapping transformer failed, skipping"
                );
            },
        }
    }

    // The first dispatch failure still reaches the hub's failure count.
    failure.map_or(Ok(()), Err)
}

impl<S, A, E, R> Clone for ActionBridge<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            store: self.store.clone(),
            registry: Arc::clone(&self.registry),
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }
}
