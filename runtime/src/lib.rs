//! # Scoped Store Runtime
//!
//! Runtime implementation for reducer-driven stores with scoped change
//! notification.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and fans emitted events out to observers.
//!
//! ## Core Components
//!
//! - **Store**: Owns state, runs the reducer, notifies observers
//! - **Observer**: Invalidation hook invoked after every state change
//! - **`KeySelector`**: Per-key memoized projection, notified only when its key changes
//! - **`CollectionView`**: Projection notified only when membership changes
//!
//! ## Example
//!
//! ```ignore
//! use scoped_store_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! let events = store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use scoped_store_core::{reducer::Reducer, Events};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scoped read projections (per-key selectors and collection views)
pub mod selector;

/// Observer module - invalidation hooks driven by store changes
pub mod observer {
    /// Receives every state change made through a store
    ///
    /// `on_change` runs synchronously while the store still holds a read
    /// lock on the new state, so no other mutation can apply until every
    /// observer has returned. Observers must be quick and must not register
    /// further observers from inside `on_change`.
    ///
    /// Any `Fn(&S, &[A])` closure is an observer.
    pub trait Observer<S, A>: Send + Sync {
        /// Called with the post-mutation state and the events that produced it
        fn on_change(&self, state: &S, events: &[A]);
    }

    /// Handle identifying a registered observer
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ObserverId(pub(crate) u64);

    impl<S, A, F> Observer<S, A> for F
    where
        F: Fn(&S, &[A]) + Send + Sync,
    {
        fn on_change(&self, state: &S, events: &[A]) {
            self(state, events);
        }
    }
}

/// Store configuration
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::default().with_broadcast_capacity(256);
/// let store = Store::with_config(state, reducer, env, config);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of events buffered per `subscribe_events` receiver
    pub broadcast_capacity: usize,
}

impl StoreConfig {
    /// Set the event broadcast capacity
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
        }
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::observer::{Observer, ObserverId};
    use super::{Arc, Events, Reducer, RwLock, StoreConfig};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{PoisonError, RwLock as ObserverLock};
    use tokio::sync::broadcast;

    type ObserverList<S, A> = Vec<(ObserverId, Arc<dyn Observer<S, A>>)>;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`, the single lock guarding it)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Observers (notified after every accepted change)
    ///
    /// Cloning a Store is cheap; clones share state and observers.
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = Store::new(TodoState::new(), TodoReducer::new(), env);
    ///
    /// store.send(TodoAction::ToggleTodo { id }).await?;
    /// ```
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        observers: Arc<ObserverLock<ObserverList<S, A>>>,
        next_observer: Arc<AtomicU64>,
        /// Every event emitted by the reducer, for streaming consumers
        event_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        R::Error: std::fmt::Display,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses [`StoreConfig::default`].
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (event_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                observers: Arc::new(ObserverLock::new(Vec::new())),
                next_observer: Arc::new(AtomicU64::new(0)),
                event_broadcast,
            }
        }

        /// Register an observer
        ///
        /// The observer is notified of every change applied after this call
        /// returns, until it is passed to [`unobserve`](Self::unobserve).
        /// Scope-limited consumers should go through a
        /// [`KeySelector`](crate::selector::KeySelector).
        pub fn observe(&self, observer: Arc<dyn Observer<S, A>>) -> ObserverId {
            let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
            self.observers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push((id, observer));
            tracing::debug!(observer = id.0, "Observer registered");
            id
        }

        /// Remove an observer
        ///
        /// Takes effect for the next change; a notification already in
        /// progress still reaches it. Returns false if no such observer is
        /// registered.
        pub fn unobserve(&self, id: ObserverId) -> bool {
            let mut observers = self
                .observers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let before = observers.len();
            observers.retain(|(existing, _)| *existing != id);
            let removed = observers.len() != before;
            drop(observers);

            if removed {
                tracing::debug!(observer = id.0, "Observer removed");
            }
            removed
        }

        /// Number of registered observers
        #[must_use]
        pub fn observer_count(&self) -> usize {
            self.observers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock on state
        /// 2. Calls the reducer with (state, action, environment)
        /// 3. Downgrades to a read lock and notifies every observer
        /// 4. Broadcasts the events to `subscribe_events` receivers
        ///
        /// Concurrent `send()` calls serialize on the lock, and the
        /// notifications of one action complete before the next applies.
        ///
        /// # Returns
        ///
        /// The events emitted by the reducer. Empty means the action was
        /// accepted but changed nothing; observers are not called.
        ///
        /// # Errors
        ///
        /// Returns the reducer's error when the action is rejected. State is
        /// unchanged and no observer is notified.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<Events<A>, R::Error> {
            tracing::debug!("Processing action");
            metrics::counter!("store.actions.total").increment(1);

            let mut state = self.state.write().await;
            tracing::trace!("Acquired write lock on state");

            let start = std::time::Instant::now();
            let result = {
                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();
                self.reducer.reduce(&mut state, action, &self.environment)
            };
            metrics::histogram!("store.reducer.duration_seconds")
                .record(start.elapsed().as_secs_f64());

            let events = match result {
                Ok(events) => events,
                Err(error) => {
                    tracing::debug!(%error, "Action rejected by reducer");
                    metrics::counter!("store.actions.rejected").increment(1);
                    return Err(error);
                },
            };

            // Note: Precision loss acceptable for metrics (event counts < 2^52)
            #[allow(clippy::cast_precision_loss)]
            metrics::histogram!("store.events.count").record(events.len() as f64);

            if events.is_empty() {
                tracing::trace!("No events emitted, skipping notification");
                return Ok(events);
            }

            let state = state.downgrade();
            self.notify(&state, &events);
            tracing::debug!(events = events.len(), "Action processing completed");

            Ok(events)
        }

        /// Subscribe to every event emitted by this store
        ///
        /// Receivers that fall behind by more than the broadcast capacity see
        /// `RecvError::Lagged` and skip the oldest events.
        #[must_use]
        pub fn subscribe_events(&self) -> broadcast::Receiver<A> {
            self.event_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// Access state through a closure to ensure the lock is released promptly:
        ///
        /// ```ignore
        /// let count = store.state(|s| s.todos.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        fn notify(&self, state: &S, events: &[A]) {
            let observers = self
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            tracing::trace!(
                observers = observers.len(),
                events = events.len(),
                "Notifying observers"
            );
            for (_, observer) in observers.iter() {
                observer.on_change(state, events);
            }
            drop(observers);

            for event in events {
                // No live receivers is not an error
                let _ = self.event_broadcast.send(event.clone());
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
                observers: Arc::clone(&self.observers),
                next_observer: Arc::clone(&self.next_observer),
                event_broadcast: self.event_broadcast.clone(),
            }
        }
    }
}

// Re-export commonly used items
pub use observer::{Observer, ObserverId};
pub use selector::{CollectionView, KeySelector, ListenerId};
pub use store::Store;
