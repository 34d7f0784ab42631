//! # Support Sync Runtime
//!
//! Runtime implementation for the event-driven state synchronization layer.
//!
//! ## Core Components
//!
//! - **Store**: the single state tree, updated only through [`Store::dispatch`]
//! - **Effect Executor**: executes effect descriptions and feeds actions back into the store
//! - **Action Bridge**: subscribes to the event hub and turns events into dispatched actions
//! - **Retry**: backoff wrapper for idempotent backend reads
//!
//! ## Example
//!
//! ```ignore
//! use support_sync_runtime::Store;
//!
//! let store = Store::new(AppState::default(), AppReducer::new(), environment);
//!
//! store.dispatch(AppAction::Support(SupportAction::TicketCreated { ticket }))?;
//!
//! // Dispatch is synchronous: the new state is visible immediately.
//! let pending = store.state(|s| s.support.pending.len());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use support_sync_core::{effect::Effect, reducer::Reducer};
use tokio::sync::watch;

/// Event hub → store bridge driven by the mapping registry
pub mod bridge;

/// Retry logic with exponential backoff
pub mod retry;

pub use bridge::ActionBridge;
pub use error::StoreError;
pub use store::Store;

/// Store errors
pub mod error {
    use thiserror::Error;

    /// Errors returned by [`Store`](crate::Store) operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// `dispatch` was called after `shutdown` began
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Effects were still running when the shutdown timeout elapsed
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// No matching action arrived in time
        #[error("Timeout waiting for action")]
        Timeout,

        /// The action broadcast closed while waiting
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

/// Number of running effects, observable through `watch` receivers.
type InFlight = Arc<watch::Sender<usize>>;

fn in_flight() -> InFlight {
    Arc::new(watch::channel(0).0)
}

async fn drained(mut count: watch::Receiver<usize>) {
    // A closed channel means nobody can still be running
    let _ = count.wait_for(|n| *n == 0).await;
}

/// Holds one running effect against every counter it belongs to.
///
/// Released on drop, so a panicking effect task still settles its counters.
struct Running(Vec<InFlight>);

impl Running {
    fn start(counters: Vec<InFlight>) -> Self {
        for counter in &counters {
            counter.send_modify(|n| *n += 1);
        }
        Self(counters)
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        for counter in &self.0 {
            counter.send_modify(|n| *n = n.saturating_sub(1));
        }
    }
}

/// Completion of the effects started by one dispatched action
#[derive(Clone, Debug)]
pub struct EffectHandle {
    remaining: watch::Receiver<usize>,
}

impl EffectHandle {
    /// A handle with nothing left to wait for
    #[must_use]
    pub fn completed() -> Self {
        let (_, remaining) = watch::channel(0);
        Self { remaining }
    }

    /// Effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.remaining.borrow()
    }

    /// Wait until every effect has finished
    pub async fn wait(&mut self) {
        drained(self.remaining.clone()).await;
    }

    /// [`wait`](Self::wait) with an upper bound
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running after `timeout`.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

/// The single state tree and its dispatch entry point.
pub mod store {
    use super::{
        drained, in_flight, Arc, AtomicBool, Duration, Effect, EffectHandle, InFlight, Ordering,
        PoisonError, Reducer, RwLock, Running, StoreError,
    };
    use tokio::runtime::Handle;
    use tokio::sync::broadcast;

    /// Capacity of the effect-action broadcast
    const ACTION_BROADCAST_CAPACITY: usize = 64;

    /// Timeout used by [`Store::shutdown_default`]
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

    /// Single source of truth for application state.
    ///
    /// [`Store::dispatch`] is the only way to change state. It runs the
    /// reducer under the write lock and returns once the new state is
    /// visible; effects the reducer returns are spawned on the current Tokio
    /// runtime and their actions are fed back through `dispatch`.
    ///
    /// Cloning yields another handle to the same store.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        closed: Arc<AtomicBool>,
        running: InFlight,
        effect_actions: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Store holding `initial_state`
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            let (effect_actions, _) = broadcast::channel(ACTION_BROADCAST_CAPACITY);
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                closed: Arc::new(AtomicBool::new(false)),
                running: in_flight(),
                effect_actions,
            }
        }

        /// Injected dependencies
        #[must_use]
        pub fn environment(&self) -> &E {
            &self.environment
        }

        /// Reduce `action` and start its effects.
        ///
        /// Calls are serialized by the state lock. Without a Tokio runtime
        /// the state still changes but effects are dropped with an error log.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
        #[tracing::instrument(skip_all, name = "store_dispatch")]
        pub fn dispatch(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.closed.load(Ordering::Acquire) {
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                tracing::warn!("Rejected action: store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }
            metrics::counter!("store.actions.dispatched").increment(1);

            let effects = {
                let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
                self.reducer.reduce(&mut state, action, &self.environment)
            };
            if effects.iter().all(Effect::is_none) {
                return Ok(EffectHandle::completed());
            }

            let Ok(runtime) = Handle::try_current() else {
                tracing::error!(effects = effects.len(), "No Tokio runtime, dropping effects");
                return Ok(EffectHandle::completed());
            };

            let scope = in_flight();
            let handle = EffectHandle {
                remaining: scope.subscribe(),
            };
            for effect in effects {
                self.run(effect, &scope, &runtime);
            }
            Ok(handle)
        }

        /// `async` form of [`dispatch`](Self::dispatch)
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            self.dispatch(action)
        }

        /// Dispatch `action`, then wait for an effect-produced action
        /// accepted by `predicate`.
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] once shutdown has begun
        /// - [`StoreError::Timeout`] if nothing matched within `timeout`
        /// - [`StoreError::ChannelClosed`] if the broadcast closed
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut observed = self.effect_actions.subscribe();
            self.dispatch(action)?;

            let wait = async {
                loop {
                    match observed.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            };
            tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| StoreError::Timeout)?
        }

        /// Actions produced by effects, after they have been reduced
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.effect_actions.subscribe()
        }

        /// Read the state through `f` under the read lock
        pub fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            f(&state)
        }

        /// Clone of the whole state tree
        #[must_use]
        pub fn snapshot(&self) -> S
        where
            S: Clone,
        {
            self.state(S::clone)
        }

        /// Whether shutdown has begun
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }

        /// [`shutdown`](Self::shutdown) with [`DEFAULT_SHUTDOWN_TIMEOUT`]
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects outlive the timeout.
        pub async fn shutdown_default(&self) -> Result<(), StoreError> {
            self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT).await
        }

        /// Stop accepting actions and wait up to `timeout` for running effects.
        ///
        /// Actions fed back by effects after this point are dropped.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects outlive the timeout.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            self.closed.store(true, Ordering::Release);
            tracing::info!(running = *self.running.borrow(), "Store shutting down");

            if tokio::time::timeout(timeout, drained(self.running.subscribe()))
                .await
                .is_ok()
            {
                tracing::info!("Store shut down cleanly");
                return Ok(());
            }
            let running = *self.running.borrow();
            tracing::error!(running, "Store shutdown timed out");
            Err(StoreError::ShutdownTimeout(running))
        }

        /// Reduce an effect-produced action, then tell observers
        fn feed_back(&self, action: A) {
            if let Err(error) = self.dispatch(action.clone()) {
                tracing::debug!(%error, "Dropped effect action");
                return;
            }
            let _ = self.effect_actions.send(action);
        }

        fn run(&self, effect: Effect<A>, scope: &InFlight, runtime: &Handle) {
            let kind = match &effect {
                Effect::None => return,
                Effect::Parallel(_) => "parallel",
                Effect::Sequential(_) => "sequential",
                Effect::Delay { .. } => "delay",
                Effect::Future(_) => "future",
            };
            metrics::counter!("store.effects.executed", "type" => kind).increment(1);

            match effect {
                Effect::None => {},
                Effect::Parallel(effects) => {
                    for effect in effects {
                        self.run(effect, scope, runtime);
                    }
                },
                Effect::Future(future) => {
                    let running = Running::start(vec![Arc::clone(scope), Arc::clone(&self.running)]);
                    let store = self.clone();
                    runtime.spawn(async move {
                        let _running = running;
                        if let Some(action) = future.await {
                            store.feed_back(action);
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    let running = Running::start(vec![Arc::clone(scope), Arc::clone(&self.running)]);
                    let store = self.clone();
                    runtime.spawn(async move {
                        let _running = running;
                        tokio::time::sleep(duration).await;
                        store.feed_back(*action);
                    });
                },
                Effect::Sequential(effects) => {
                    let running = Running::start(vec![Arc::clone(scope), Arc::clone(&self.running)]);
                    let store = self.clone();
                    let runtime = runtime.clone();
                    runtime.clone().spawn(async move {
                        let _running = running;
                        for effect in effects {
                            let step = in_flight();
                            store.run(effect, &step, &runtime);
                            drained(step.subscribe()).await;
                        }
                    });
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                closed: Arc::clone(&self.closed),
                running: Arc::clone(&self.running),
                effect_actions: self.effect_actions.clone(),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use support_sync_core::{smallvec, SmallVec};

    #[derive(Debug, Clone, Default)]
    struct Queue {
        depth: i32,
        log: Vec<&'static str>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum QueueAction {
        Enqueue,
        Dequeue,
        Log(&'static str),
        Nothing,
        FetchOne,
        EnqueueLater,
        FetchThree,
        LogInOrder,
        Explode,
        Stall,
    }

    struct QueueReducer;

    fn emit(action: QueueAction) -> Effect<QueueAction> {
        Effect::Future(Box::pin(async move { Some(action) }))
    }

    impl Reducer for QueueReducer {
        type State = Queue;
        type Action = QueueAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Queue,
            action: QueueAction,
            _env: &(),
        ) -> SmallVec<[Effect<QueueAction>; 4]> {
            match action {
                QueueAction::Enqueue => state.depth += 1,
                QueueAction::Dequeue => state.depth -= 1,
                QueueAction::Log(entry) => state.log.push(entry),
                QueueAction::Nothing => {},
                QueueAction::FetchOne => return smallvec![emit(QueueAction::Enqueue)],
                QueueAction::EnqueueLater => {
                    return smallvec![Effect::Delay {
                        duration: Duration::from_millis(50),
                        action: Box::new(QueueAction::Enqueue),
                    }];
                },
                QueueAction::FetchThree => {
                    return smallvec![Effect::Parallel(vec![
                        emit(QueueAction::Enqueue),
                        emit(QueueAction::Enqueue),
                        emit(QueueAction::Enqueue),
                    ])];
                },
                QueueAction::LogInOrder => {
                    return smallvec![Effect::Sequential(vec![
                        Effect::Delay {
                            duration: Duration::from_millis(30),
                            action: Box::new(QueueAction::Log("first")),
                        },
                        emit(QueueAction::Log("second")),
                        Effect::Delay {
                            duration: Duration::from_millis(10),
                            action: Box::new(QueueAction::Log("third")),
                        },
                    ])];
                },
                QueueAction::Explode => {
                    return smallvec![Effect::Future(Box::pin(async {
                        panic!("effect blew up");
                    }))];
                },
                QueueAction::Stall => {
                    return smallvec![Effect::Future(Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        None
                    }))];
                },
            }
            SmallVec::new()
        }
    }

    type QueueStore = Store<Queue, QueueAction, (), QueueReducer>;

    fn store() -> QueueStore {
        Store::new(Queue::default(), QueueReducer, ())
    }

    #[test]
    fn dispatch_is_visible_on_return() {
        let store = store();

        store.dispatch(QueueAction::Enqueue).unwrap();
        assert_eq!(store.state(|q| q.depth), 1);

        store.dispatch(QueueAction::Enqueue).unwrap();
        store.dispatch(QueueAction::Dequeue).unwrap();
        assert_eq!(store.state(|q| q.depth), 1);
    }

    #[test]
    fn effects_without_runtime_are_dropped() {
        let store = store();

        let handle = store.dispatch(QueueAction::FetchOne).unwrap();

        assert_eq!(handle.pending(), 0);
        assert_eq!(store.state(|q| q.depth), 0);
    }

    #[tokio::test]
    async fn future_effect_feeds_back() {
        let store = store();

        let mut handle = store.send(QueueAction::FetchOne).await.unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        assert_eq!(store.state(|q| q.depth), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_effect_waits() {
        let store = store();

        let mut handle = store.dispatch(QueueAction::EnqueueLater).unwrap();
        assert_eq!(handle.pending(), 1);
        assert_eq!(store.state(|q| q.depth), 0);

        handle.wait().await;
        assert_eq!(store.state(|q| q.depth), 1);
    }

    #[tokio::test]
    async fn parallel_effects_all_feed_back() {
        let store = store();

        let mut handle = store.dispatch(QueueAction::FetchThree).unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        assert_eq!(store.state(|q| q.depth), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_effects_keep_order() {
        let store = store();

        let mut handle = store.dispatch(QueueAction::LogInOrder).unwrap();
        handle.wait().await;

        assert_eq!(store.state(|q| q.log.clone()), ["first", "second", "third"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatches_serialize() {
        let store = store();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.dispatch(QueueAction::Enqueue).unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.state(|q| q.depth), 50);
    }

    #[tokio::test]
    async fn panicking_effect_settles_counters() {
        let store = store();

        let mut handle = store.dispatch(QueueAction::Explode).unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        store.dispatch(QueueAction::Enqueue).unwrap();
        assert_eq!(store.state(|q| q.depth), 1);
        store.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn send_and_wait_for_sees_reduced_state() {
        let store = store();

        let action = store
            .send_and_wait_for(
                QueueAction::FetchOne,
                |a| *a == QueueAction::Enqueue,
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(action, QueueAction::Enqueue);
        assert_eq!(store.state(|q| q.depth), 1);
    }

    #[tokio::test]
    async fn send_and_wait_for_times_out() {
        let store = store();

        let result = store
            .send_and_wait_for(
                QueueAction::Nothing,
                |a| *a == QueueAction::Enqueue,
                Duration::from_millis(20),
            )
            .await;

        assert_eq!(result, Err(StoreError::Timeout));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = store();

        store.shutdown(Duration::from_secs(1)).await.unwrap();

        assert!(store.is_shutting_down());
        assert_eq!(
            store.dispatch(QueueAction::Enqueue).unwrap_err(),
            StoreError::ShutdownInProgress
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_running_effects() {
        let store = store();

        store.dispatch(QueueAction::EnqueueLater).unwrap();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        // The delayed action arrives after shutdown began and is dropped
        assert_eq!(store.state(|q| q.depth), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_reports_stuck_effects() {
        let store = store();

        store.dispatch(QueueAction::Stall).unwrap();
        let result = store.shutdown(Duration::from_millis(20)).await;

        assert_eq!(result, Err(StoreError::ShutdownTimeout(1)));
    }

    #[tokio::test]
    async fn completed_handle_returns_at_once() {
        let mut handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        handle.wait_with_timeout(Duration::from_millis(10)).await.unwrap();
    }
}
