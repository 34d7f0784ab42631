//! In-process event hub keyed by `(service, event type)`.
//!
//! The [`EventHub`] decouples domain services (producers) from the action bridge
//! and any other consumer. It is strictly synchronous: [`EventHub::emit`] invokes
//! every handler registered for the pair, in registration order, before it returns.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   emit("support", "TICKET_RESOLVED", payload)
//! │ TicketService│──────────────────────────┐
//! └──────────────┘                          ▼
//!                                  ┌─────────────────┐
//!                                  │    EventHub     │
//!                                  └────────┬────────┘
//!                                ┌──────────┴──────────┐
//!                                ▼                     ▼
//!                        ┌──────────────┐      ┌──────────────┐
//!                        │ ActionBridge │      │ other handler│
//!                        └──────────────┘      └──────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Explicit instance**: construct one hub per application (tests build isolated hubs)
//! - **FIFO per emitter**: handlers see events in emission order
//! - **Failure isolation**: a handler that errors or panics is logged and skipped;
//!   the remaining handlers still run and the emitter never sees the failure
//! - **No queuing**: nothing is buffered, persisted, or delivered across processes
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use support_sync_core::event_hub::{EventHub, Handler};
//!
//! let hub = EventHub::new();
//! let handler: Handler = Arc::new(|event| {
//!     println!("{} / {}", event.service, event.event_type);
//!     Ok(())
//! });
//!
//! hub.on("support", "TICKET_CREATED", Arc::clone(&handler));
//! let outcome = hub.emit("support", "TICKET_CREATED", serde_json::json!({ "id": "t1" }));
//! assert_eq!(outcome.invoked, 1);
//!
//! hub.off("support", "TICKET_CREATED", &handler);
//! assert_eq!(hub.handler_count("support", "TICKET_CREATED"), 0);
//! ```

use crate::environment::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Errors a handler can report back to the hub.
///
/// These never reach the emitter; the hub logs them and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// The handler could not process the event
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    /// The handler panicked
    #[error("Handler panicked while handling {service}/{event_type}")]
    HandlerPanicked {
        /// Service of the event being handled
        service: String,
        /// Type of the event being handled
        event_type: String,
    },
}

/// A domain event flowing through the hub.
///
/// Events are ephemeral: they exist for the duration of one [`EventHub::emit`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Emitting service (e.g. `"support"`)
    pub service: String,
    /// Event type within the service (e.g. `"TICKET_RESOLVED"`)
    pub event_type: String,
    /// JSON payload
    pub payload: Value,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the given time
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            service: service.into(),
            event_type: event_type.into(),
            payload,
            timestamp,
        }
    }
}

/// Event handler.
///
/// Handlers are compared by identity in [`EventHub::off`], so keep a clone of the
/// `Arc` you registered if you intend to unregister it.
pub type Handler = Arc<dyn Fn(&Event) -> Result<(), HubError> + Send + Sync>;

/// Outcome of a single [`EventHub::emit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOutcome {
    /// Handlers invoked
    pub invoked: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

type EventKey = (String, String);

/// Process-local publish/subscribe bus.
///
/// Cloning an `EventHub` yields another handle to the same registry.
#[derive(Clone)]
pub struct EventHub {
    handlers: Arc<RwLock<HashMap<EventKey, Vec<Handler>>>>,
    clock: Arc<dyn Clock>,
}

impl EventHub {
    /// Create an empty hub stamping events with the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty hub stamping events with the given clock
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Register a handler for `(service, event_type)`.
    ///
    /// Registering the same handler twice causes it to run twice per event;
    /// callers wanting idempotent registration must [`off`](Self::off) first.
    pub fn on(&self, service: &str, event_type: &str, handler: Handler) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry((service.to_string(), event_type.to_string()))
            .or_default()
            .push(handler);

        tracing::trace!(service, event_type, "Handler registered");
    }

    /// Remove one registration of `handler` for `(service, event_type)`.
    ///
    /// Returns whether a registration was removed. Unknown handlers are a no-op.
    pub fn off(&self, service: &str, event_type: &str, handler: &Handler) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let key = (service.to_string(), event_type.to_string());

        let Some(registered) = handlers.get_mut(&key) else {
            return false;
        };

        let target = Arc::as_ptr(handler).cast::<()>();
        let Some(position) = registered
            .iter()
            .position(|candidate| Arc::as_ptr(candidate).cast::<()>() == target)
        else {
            return false;
        };

        registered.remove(position);
        if registered.is_empty() {
            handlers.remove(&key);
        }

        tracing::trace!(service, event_type, "Handler unregistered");
        true
    }

    /// Emit an event to every handler of `(service, event_type)`.
    ///
    /// Handlers run synchronously in registration order. The registry lock is
    /// released before the first handler runs, so handlers may register,
    /// unregister, or emit without deadlocking; such changes take effect from
    /// the next emit.
    pub fn emit(&self, service: &str, event_type: &str, payload: Value) -> EmitOutcome {
        let event = Event::new(service, event_type, payload, self.clock.now());
        self.emit_event(&event)
    }

    /// Emit a pre-built event (used when forwarding events from a transport).
    pub fn emit_event(&self, event: &Event) -> EmitOutcome {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers
                .get(&(event.service.clone(), event.event_type.clone()))
                .cloned()
                .unwrap_or_default()
        };

        metrics::counter!("hub.events.emitted", "service" => event.service.clone()).increment(1);

        if snapshot.is_empty() {
            tracing::trace!(
                service = %event.service,
                event_type = %event.event_type,
                "Event emitted with no handlers"
            );
            return EmitOutcome::default();
        }

        let mut outcome = EmitOutcome::default();

        for handler in snapshot {
            outcome.invoked += 1;

            let result = catch_unwind(AssertUnwindSafe(|| handler(event))).unwrap_or_else(|_| {
                Err(HubError::HandlerPanicked {
                    service: event.service.clone(),
                    event_type: event.event_type.clone(),
                })
            });

            if let Err(error) = result {
                outcome.failed += 1;
                metrics::counter!("hub.handler.failed", "service" => event.service.clone())
                    .increment(1);
                tracing::warn!(
                    service = %event.service,
                    event_type = %event.event_type,
                    error = %error,
                    "Event handler failed, continuing with remaining handlers"
                );
            }
        }

        outcome
    }

    /// Number of registrations for `(service, event_type)`
    #[must_use]
    pub fn handler_count(&self, service: &str, event_type: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers
            .get(&(service.to_string(), event_type.to_string()))
            .map_or(0, Vec::len)
    }

    /// Drop every registration (end of a logical session)
    pub fn clear(&self) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.clear();
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventHub")
            .field("keys", &handlers.len())
            .finish_non_exhaustive()
    }
}
