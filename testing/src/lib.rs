//! # Scoped Store Testing
//!
//! Testing utilities and helpers for scoped state stores.
//!
//! This crate provides:
//! - Deterministic implementations of Environment traits
//! - A Given-When-Then harness for reducers
//! - An observer that records every notification
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use scoped_store_testing::{RecordingObserver, SequentialIds};
//! use scoped_store_runtime::Store;
//!
//! #[tokio::test]
//! async fn test_add_flow() {
//!     let store = Store::new(TodoState::new(), TodoReducer::new(), env);
//!     let recorder = Arc::new(RecordingObserver::new());
//!     store.observe(recorder.clone());
//!
//!     store.send(TodoAction::AddTodo { id, title: "Buy milk".into() }).await?;
//!
//!     assert_eq!(recorder.batches().len(), 1);
//! }
//! ```


pub use reducer_test::{assertions, ReducerTest};

/// Deterministic implementations of Environment traits
pub mod mocks {
    use scoped_store_core::environment::IdGenerator;
    use scoped_store_runtime::Observer;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Mutex, PoisonError};
    use uuid::Uuid;

    /// Sequential id generator for deterministic tests
    ///
    /// Produces `00000000-0000-0000-0000-000000000001`,
    /// `...0002`, and so on. Never repeats within one generator.
    ///
    /// # Example
    ///
    /// ```
    /// use scoped_store_testing::mocks::SequentialIds;
    /// use scoped_store_core::environment::IdGenerator;
    /// use uuid::Uuid;
    ///
    /// let ids = SequentialIds::new();
    /// assert_eq!(ids.next_id(), Uuid::from_u128(1));
    /// assert_eq!(ids.next_id(), Uuid::from_u128(2));
    /// ```
    #[derive(Debug, Default)]
    pub struct SequentialIds {
        next: AtomicU64,
    }

    impl SequentialIds {
        /// Create a generator starting at 1
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }

        /// Create a generator whose first id is `Uuid::from_u128(first)`
        #[must_use]
        pub const fn starting_at(first: u64) -> Self {
            Self {
                next: AtomicU64::new(first.saturating_sub(1)),
            }
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> Uuid {
            let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
            Uuid::from_u128(u128::from(n))
        }
    }

    /// Id generator that always returns the same id
    ///
    /// Useful for exercising duplicate-id rejection.
    #[derive(Debug, Clone, Copy)]
    pub struct FixedId(pub Uuid);

    impl IdGenerator for FixedId {
        fn next_id(&self) -> Uuid {
            self.0
        }
    }

    /// Observer that records every batch of events it is notified with
    #[derive(Debug)]
    pub struct RecordingObserver<A> {
        batches: Mutex<Vec<Vec<A>>>,
    }

    impl<A> RecordingObserver<A> {
        /// Create an empty recorder
        #[must_use]
        pub const fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
            }
        }

        /// Every batch recorded so far, oldest first
        #[must_use]
        pub fn batches(&self) -> Vec<Vec<A>>
        where
            A: Clone,
        {
            self.batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// All recorded events flattened, oldest first
        #[must_use]
        pub fn events(&self) -> Vec<A>
        where
            A: Clone,
        {
            self.batches().into_iter().flatten().collect()
        }

        /// Number of notifications received
        #[must_use]
        pub fn notification_count(&self) -> usize {
            self.batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }
    }

    impl<A> Default for RecordingObserver<A> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<S, A> Observer<S, A> for RecordingObserver<A>
    where
        A: Clone + Send,
    {
        fn on_change(&self, _state: &S, events: &[A]) {
            self.batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(events.to_vec());
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    /// Install a compact `tracing` subscriber for tests
    ///
    /// Honors `RUST_LOG`, defaults to `warn`. Safe to call from every test;
    /// only the first call installs the subscriber.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::init_test_tracing;
pub use mocks::{FixedId, RecordingObserver, SequentialIds};
