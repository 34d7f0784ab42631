//! # Support Sync Core
//!
//! Core traits and types for synchronizing asynchronous domain events into a
//! single client-side state tree.
//!
//! This crate provides the fundamental abstractions used by the runtime and by
//! application crates:
//!
//! - **State**: one plain value per domain slice
//! - **Action**: every input to a reducer
//! - **Reducer**: pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: side effect descriptions (not execution)
//! - **Environment**: injected dependencies (clock, id generation)
//! - **Event Hub**: in-process publish/subscribe keyed by `(service, event type)`
//! - **Mapping Registry**: declarative `(service, event type) → action` rules
//!
//! ## Data Flow
//!
//! ```text
//! domain service ──emit──▶ EventHub ──▶ ActionBridge ──transform──▶ Action
//!                                                                  │
//!                                           Store::dispatch ◀──────┘
//!                                                  │
//!                                          slice reducers ──▶ new state
//! ```
//!
//! Reducers never touch the network. Services perform I/O and report the
//! outcome as events; anything a reducer wants done later is returned as an
//! [`Effect`].

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

pub use effect::Effect;
pub use reducer::Reducer;

/// Reducer composition (combining reducers, scoping slices)
pub mod composition;

/// In-process publish/subscribe bus for domain events
pub mod event_hub;

/// Declarative event → action mapping rules
pub mod mapping;

/// State transitions
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Owns one state type and folds actions into it.
    ///
    /// ```ignore
    /// impl Reducer for SupportReducer {
    ///     type State = SupportState;
    ///     type Action = SupportAction;
    ///     type Environment = ();
    ///
    ///     fn reduce(&self, state: &mut SupportState, action: SupportAction, _: &())
    ///         -> SmallVec<[Effect<SupportAction>; 4]>
    ///     {
    ///         if let SupportAction::TicketCreated { ticket } = action {
    ///             state.insert_pending(ticket);
    ///         }
    ///         SmallVec::new()
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// Owned state
        type State;

        /// Input
        type Action;

        /// Injected dependencies
        type Environment;

        /// Apply `action` to `state`.
        ///
        /// Unknown or inapplicable actions must leave the state untouched.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Deferred work returned by reducers
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Work the store runs after a dispatch. Any action an effect yields is
    /// dispatched back into the same store.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Children run concurrently
        Parallel(Vec<Effect<Action>>),

        /// Each child starts once the previous one and its follow-ups settle
        Sequential(Vec<Effect<Action>>),

        /// Dispatch `action` after `duration`
        Delay {
            /// Wait before dispatching
            duration: Duration,
            /// Dispatched when the wait ends
            action: Box<Action>,
        },

        /// Async computation; a `Some` output is dispatched
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Shorthand for [`Effect::Parallel`]
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Shorthand for [`Effect::Sequential`]
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Lift an effect into a wider action type
        ///
        /// Used when a slice reducer's effects are embedded into the
        /// application-level action enum.
        #[must_use]
        pub fn map<B>(self, f: fn(Action) -> B) -> Effect<B>
        where
            Action: Send + 'static,
            B: Send + 'static,
        {
            match self {
                Effect::None => Effect::None,
                Effect::Parallel(effects) => {
                    Effect::Parallel(effects.into_iter().map(|e| e.map(f)).collect())
                },
                Effect::Sequential(effects) => {
                    Effect::Sequential(effects.into_iter().map(|e| e.map(f)).collect())
                },
                Effect::Delay { duration, action } => Effect::Delay {
                    duration,
                    action: Box::new(f(*action)),
                },
                Effect::Future(fut) => Effect::Future(Box::pin(async move { fut.await.map(f) })),
            }
        }

        /// Whether this effect does nothing when executed
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().all(Effect::is_none)
                },
                Effect::Delay { .. } | Effect::Future(_) => false,
            }
        }
    }
}

/// Injected sources of time and identifiers
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of timestamps for emitted events
    pub trait Clock: Send + Sync {
        /// Current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Generator for locally synthesized identifiers
    ///
    /// Temporary records (optimistic messages) need an id before the backend
    /// assigns a permanent one.
    pub trait IdGenerator: Send + Sync {
        /// Produce a new identifier, unique within this process
        fn next_id(&self) -> String;
    }
}
