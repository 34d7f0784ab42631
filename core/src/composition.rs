//! Building one application reducer out of per-domain pieces.
//!
//! [`combine_reducers`] fans an action out to several reducers over the same
//! state. [`slice_reducer`] hands a reducer exclusive ownership of one
//! [`Arc`]-held slice of a larger state tree.
//!
//! # Copy-on-write slices
//!
//! Application state holds each domain slice as `Arc<Slice>`. A slice reducer
//! runs on a private copy and swaps the `Arc` only when the slice actually
//! changed. Consequences:
//!
//! - A snapshot cloned out of the store before a dispatch is never mutated.
//! - A changed slice always gets a new reference.
//! - An untouched slice keeps pointer identity, so consumers can detect change
//!   with [`Arc::ptr_eq`] instead of deep comparison.
//!
//! ```
//! use std::sync::Arc;
//! use support_sync_core::{Effect, Reducer, SmallVec};
//! use support_sync_core::composition::slice_reducer;
//!
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct Counter {
//!     count: i32,
//! }
//!
//! #[derive(Clone, Debug, Default)]
//! struct App {
//!     counter: Arc<Counter>,
//!     title: Arc<String>,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum AppAction {
//!     Counter(i32),
//!     Rename(String),
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = Counter;
//!     type Action = i32;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut Counter, delta: i32, _env: &()) -> SmallVec<[Effect<i32>; 4]> {
//!         state.count += delta;
//!         SmallVec::new()
//!     }
//! }
//!
//! let reducer = slice_reducer(
//!     CounterReducer,
//!     |app: &mut App| &mut app.counter,
//!     |action| match action {
//!         AppAction::Counter(delta) => Some(delta),
//!         AppAction::Rename(_) => None,
//!     },
//!     AppAction::Counter,
//!     |env: &()| env,
//! );
//!
//! let mut state = App::default();
//! let before = state.clone();
//! let _ = reducer.reduce(&mut state, AppAction::Counter(2), &());
//!
//! assert_eq!(state.counter.count, 2);
//! assert_eq!(before.counter.count, 0);
//! assert!(Arc::ptr_eq(&before.title, &state.title));
//! ```

use crate::effect::Effect;
use crate::reducer::Reducer;
use smallvec::SmallVec;
use std::sync::Arc;

/// Fan each action out to `reducers` in order, concatenating their effects
#[must_use]
pub fn combine_reducers<S, A, E>(
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
) -> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    CombinedReducer { reducers }
}

/// Output of [`combine_reducers`]
pub struct CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
}

impl<S, A, E> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    /// Number of reducers combined
    #[must_use]
    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    /// Whether no reducers are combined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        self.reducers
            .iter()
            .flat_map(|reducer| reducer.reduce(state, action.clone(), env))
            .collect()
    }
}

/// Scopes a reducer to one copy-on-write slice of a larger state.
///
/// # Arguments
///
/// - `reducer`: the slice reducer
/// - `slice`: accessor for the slice slot in the parent state
/// - `extract`: projects a parent action onto the slice action space;
///   `None` means the action does not concern this slice and the slice is
///   left untouched (same `Arc`)
/// - `embed`: lifts slice actions produced by effects back into parent actions
/// - `environment`: projects the parent environment onto the slice environment
pub fn slice_reducer<S, A, E, R>(
    reducer: R,
    slice: fn(&mut S) -> &mut Arc<R::State>,
    extract: fn(A) -> Option<R::Action>,
    embed: fn(R::Action) -> A,
    environment: fn(&E) -> &R::Environment,
) -> SliceReducer<S, A, E, R>
where
    R: Reducer,
    R::State: Clone + PartialEq,
{
    SliceReducer {
        reducer,
        slice,
        extract,
        embed,
        environment,
    }
}

/// A reducer that owns one slice of a parent state.
///
/// Created by [`slice_reducer`].
pub struct SliceReducer<S, A, E, R>
where
    R: Reducer,
{
    reducer: R,
    slice: fn(&mut S) -> &mut Arc<R::State>,
    extract: fn(A) -> Option<R::Action>,
    embed: fn(R::Action) -> A,
    environment: fn(&E) -> &R::Environment,
}

impl<S, A, E, R> Reducer for SliceReducer<S, A, E, R>
where
    R: Reducer,
    R::State: Clone + PartialEq,
    R::Action: Send + 'static,
    A: Send + 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let Some(slice_action) = (self.extract)(action) else {
            return SmallVec::new();
        };

        let slot = (self.slice)(state);
        let mut next = R::State::clone(slot);
        let effects = self
            .reducer
            .reduce(&mut next, slice_action, (self.environment)(env));

        if next != **slot {
            *slot = Arc::new(next);
        }

        effects.into_iter().map(|effect| effect.map(self.embed)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{smallvec, SmallVec};
    use proptest::prelude::*;

    #[derive(Clone, Default)]
    struct Inbox {
        unread: u32,
        last_sender: Option<String>,
    }

    #[derive(Clone)]
    enum InboxAction {
        Received(String),
        ReadAll,
    }

    struct UnreadReducer;

    impl Reducer for UnreadReducer {
        type State = Inbox;
        type Action = InboxAction;
        type Environment = ();

        fn reduce(
            &self,
            inbox: &mut Inbox,
            action: InboxAction,
            _env: &(),
        ) -> SmallVec<[Effect<InboxAction>; 4]> {
            match action {
                InboxAction::Received(_) => inbox.unread += 1,
                InboxAction::ReadAll => inbox.unread = 0,
            }
            smallvec![Effect::None]
        }
    }

    struct SenderReducer;

    impl Reducer for SenderReducer {
        type State = Inbox;
        type Action = InboxAction;
        type Environment = ();

        fn reduce(
            &self,
            inbox: &mut Inbox,
            action: InboxAction,
            _env: &(),
        ) -> SmallVec<[Effect<InboxAction>; 4]> {
            if let InboxAction::Received(sender) = action {
                inbox.last_sender = Some(sender);
            }
            SmallVec::new()
        }
    }

    #[test]
    fn every_combined_reducer_sees_each_action() {
        let combined = combine_reducers(vec![Box::new(UnreadReducer), Box::new(SenderReducer)]);
        assert_eq!(combined.len(), 2);
        assert!(!combined.is_empty());

        let mut inbox = Inbox::default();
        let effects = combined.reduce(&mut inbox, InboxAction::Received("u2".into()), &());
        assert_eq!(inbox.unread, 1);
        assert_eq!(inbox.last_sender.as_deref(), Some("u2"));
        assert_eq!(effects.len(), 1);

        let _ = combined.reduce(&mut inbox, InboxAction::Received("u3".into()), &());
        let _ = combined.reduce(&mut inbox, InboxAction::ReadAll, &());
        assert_eq!(inbox.unread, 0);
        assert_eq!(inbox.last_sender.as_deref(), Some("u3"));
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Tally {
        value: i32,
    }

    #[derive(Clone, Debug)]
    enum TallyAction {
        Add(i32),
        Echo,
    }

    struct TallyReducer;

    impl Reducer for TallyReducer {
        type State = Tally;
        type Action = TallyAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TallyAction::Add(n) => {
                    state.value += n;
                    SmallVec::new()
                },
                TallyAction::Echo => smallvec![Effect::Future(Box::pin(async {
                    Some(TallyAction::Add(1))
                }))],
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    struct Parent {
        left: Arc<Tally>,
        right: Arc<Tally>,
    }

    #[derive(Clone, Debug)]
    enum ParentAction {
        Left(TallyAction),
        Right(TallyAction),
    }

    fn left_reducer() -> SliceReducer<Parent, ParentAction, (), TallyReducer> {
        slice_reducer(
            TallyReducer,
            |parent: &mut Parent| &mut parent.left,
            |action| match action {
                ParentAction::Left(inner) => Some(inner),
                ParentAction::Right(_) => None,
            },
            ParentAction::Left,
            |env: &()| env,
        )
    }

    #[test]
    fn slice_change_replaces_only_that_slice() {
        let reducer = left_reducer();
        let mut state = Parent::default();
        let before = state.clone();

        let _ = reducer.reduce(&mut state, ParentAction::Left(TallyAction::Add(3)), &());

        assert_eq!(state.left.value, 3);
        assert_eq!(before.left.value, 0);
        assert!(!Arc::ptr_eq(&before.left, &state.left));
        assert!(Arc::ptr_eq(&before.right, &state.right));
    }

    #[test]
    fn unrelated_action_keeps_identity() {
        let reducer = left_reducer();
        let mut state = Parent::default();
        let before = state.clone();

        let effects = reducer.reduce(&mut state, ParentAction::Right(TallyAction::Add(3)), &());

        assert!(effects.is_empty());
        assert!(Arc::ptr_eq(&before.left, &state.left));
        assert!(Arc::ptr_eq(&before.right, &state.right));
    }

    #[test]
    fn no_op_slice_action_keeps_identity() {
        let reducer = left_reducer();
        let mut state = Parent::default();
        let before = state.clone();

        let _ = reducer.reduce(&mut state, ParentAction::Left(TallyAction::Add(0)), &());

        assert!(Arc::ptr_eq(&before.left, &state.left));
    }

    #[tokio::test]
    async fn slice_effects_are_embedded() {
        let reducer = left_reducer();
        let mut state = Parent::default();

        let mut effects = reducer.reduce(&mut state, ParentAction::Left(TallyAction::Echo), &());
        assert_eq!(effects.len(), 1);

        let Some(Effect::Future(fut)) = effects.pop() else {
            unreachable!("expected a future effect");
        };
        assert!(matches!(fut.await, Some(ParentAction::Left(TallyAction::Add(1)))));
    }

    proptest! {
        #[test]
        fn prior_snapshot_is_never_mutated(deltas in proptest::collection::vec(-50i32..50, 1..20)) {
            let reducer = left_reducer();
            let mut state = Parent::default();

            for delta in deltas {
                let snapshot = state.clone();
                let expected = snapshot.left.value;
                let _ = reducer.reduce(&mut state, ParentAction::Left(TallyAction::Add(delta)), &());

                prop_assert_eq!(snapshot.left.value, expected);
                prop_assert_eq!(state.left.value, expected + delta);
                prop_assert_eq!(Arc::ptr_eq(&snapshot.left, &state.left), delta == 0);
            }
        }
    }
}
