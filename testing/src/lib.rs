//! # Support Sync Testing
//!
//! Testing utilities for the support sync crates.
//!
//! This crate provides:
//! - Deterministic implementations of Environment traits (clock, ids)
//! - An event recorder for asserting what services emitted on the hub
//! - proptest strategies for domain identifiers
//! - The [`ReducerTest`] Given-When-Then harness
//!
//! ## Example
//!
//! ```ignore
//! use support_sync_testing::{test_clock, EventRecorder};
//!
//! let hub = EventHub::with_clock(Arc::new(test_clock()));
//! let recorder = EventRecorder::attach(&hub, &[("support", "TICKET_CREATED")]);
//!
//! service.create_ticket(request).await?;
//!
//! assert_eq!(recorder.event_types(), vec!["TICKET_CREATED"]);
//! ```

use chrono::{DateTime, Utc};
use support_sync_core::environment::{Clock, IdGenerator};


pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until explicitly advanced.
    ///
    /// # Example
    ///
    /// ```
    /// use support_sync_testing::mocks::FixedClock;
    /// use support_sync_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let start = Utc::now();
    /// let clock = FixedClock::new(start);
    /// assert_eq!(clock.now(), clock.now());
    ///
    /// clock.advance(Duration::seconds(5));
    /// assert_eq!(clock.now(), start + Duration::seconds(5));
    /// ```
    #[derive(Debug)]
    pub struct FixedClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable identifiers: `{prefix}-1`, `{prefix}-2`, ...
    #[derive(Debug)]
    pub struct SequentialIds {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIds {
        /// Create a generator with the given prefix
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl Default for SequentialIds {
        fn default() -> Self {
            Self::new("temp")
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}-{n}", self.prefix)
        }
    }
}

/// Hub event capture
pub mod recorder {
    use std::sync::{Arc, Mutex, PoisonError};
    use support_sync_core::event_hub::{Event, EventHub, Handler};

    /// Records every event emitted for a set of `(service, event type)` pairs.
    #[derive(Clone, Default)]
    pub struct EventRecorder {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl EventRecorder {
        /// Create a recorder subscribed to `keys` on `hub`
        #[must_use]
        pub fn attach(hub: &EventHub, keys: &[(&str, &str)]) -> Self {
            let recorder = Self::default();
            for (service, event_type) in keys {
                hub.on(service, event_type, recorder.handler());
            }
            recorder
        }

        /// A hub handler that appends to this recorder
        #[must_use]
        pub fn handler(&self) -> Handler {
            let events = Arc::clone(&self.events);
            Arc::new(move |event: &Event| {
                events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(event.clone());
                Ok(())
            })
        }

        /// Every recorded event, in emission order
        #[must_use]
        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Event types of the recorded events, in emission order
        #[must_use]
        pub fn event_types(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .map(|event| event.event_type)
                .collect()
        }

        /// Recorded events of one type
        #[must_use]
        pub fn of_type(&self, event_type: &str) -> Vec<Event> {
            self.events()
                .into_iter()
                .filter(|event| event.event_type == event_type)
                .collect()
        }

        /// Forget everything recorded so far
        pub fn clear(&self) {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Non-empty user identifiers without the `_` separator
    pub fn user_id() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9]{1,16}"
    }

    /// Two distinct user identifiers
    pub fn distinct_user_pair() -> impl Strategy<Value = (String, String)> {
        (user_id(), user_id()).prop_filter("users must differ", |(a, b)| a != b)
    }
}

/// Install a test-friendly tracing subscriber (idempotent)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock, SequentialIds};
pub use recorder::EventRecorder;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use support_sync_core::event_hub::EventHub;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new("msg");
        assert_eq!(ids.next_id(), "msg-1");
        assert_eq!(ids.next_id(), "msg-2");
    }

    #[test]
    fn test_recorder_captures_in_order() {
        let hub = EventHub::new();
        let recorder = EventRecorder::attach(
            &hub,
            &[("support", "TICKET_CREATED"), ("support", "TICKET_CLOSED")],
        );

        hub.emit("support", "TICKET_CREATED", json!({ "id": "t1" }));
        hub.emit("support", "TICKET_ASSIGNED", json!({ "id": "t1" }));
        hub.emit("support", "TICKET_CLOSED", json!({ "id": "t1" }));

        assert_eq!(recorder.event_types(), vec!["TICKET_CREATED", "TICKET_CLOSED"]);
        assert_eq!(recorder.of_type("TICKET_CLOSED").len(), 1);

        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
