//! # Scoped Store Core
//!
//! Core traits and types for reducer-driven state stores with scoped
//! change notification.
//!
//! This crate provides the fundamental abstractions shared by every store
//! built on the runtime:
//!
//! ## Core Concepts
//!
//! - **State**: Domain state owned exclusively by a store
//! - **Action**: All possible inputs to a reducer (commands and events)
//! - **Reducer**: `(State, Action, Environment) → Result<Events, Error>`
//! - **Scope**: Which observers an emitted event is relevant to
//! - **Environment**: Injected dependencies (id generation)
//!
//! ## Architecture Principles
//!
//! - Single source of truth: only the reducer mutates state
//! - Unidirectional data flow: action → reducer → events → observers
//! - Typed failures: a rejected action leaves state untouched
//! - Dependency injection via Environment
//!
//! ## Example
//!
//! ```ignore
//! use scoped_store_core::*;
//!
//! impl Reducer for TodoReducer {
//!     type State = TodoState;
//!     type Action = TodoAction;
//!     type Environment = TodoEnvironment;
//!     type Error = TodoError;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut TodoState,
//!         action: TodoAction,
//!         env: &TodoEnvironment,
//!     ) -> Result<SmallVec<[TodoAction; 4]>, TodoError> {
//!         // Validate, mutate, and report what happened
//!         Ok(SmallVec::new())
//!     }
//! }
//! ```

// Re-export commonly used types
pub use smallvec::{smallvec, SmallVec};

/// Events returned from a single reduction.
///
/// Most actions produce zero or one event, so four slots inline avoids
/// allocating in the common case.
pub type Events<A> = SmallVec<[A; 4]>;

/// Reducer module - The core trait for business logic
///
/// Reducers validate an action against the current state, apply it, and
/// report the resulting events. The store uses the returned events to decide
/// which observers to notify.
pub mod reducer {
    use super::Events;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes (commands and events)
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Error`: The typed rejection returned for invalid actions
    ///
    /// # Contract
    ///
    /// A reducer that returns `Err` must not have mutated `state`. Validate
    /// first, then apply.
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for CounterReducer {
    ///     type State = CounterState;
    ///     type Action = CounterAction;
    ///     type Environment = ();
    ///     type Error = CounterError;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut CounterState,
    ///         action: CounterAction,
    ///         _env: &(),
    ///     ) -> Result<Events<CounterAction>, CounterError> {
    ///         match action {
    ///             CounterAction::Increment => {
    ///                 state.count += 1;
    ///                 Ok(smallvec![CounterAction::Incremented])
    ///             }
    ///             CounterAction::Incremented => Ok(Events::new()),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// The error returned when an action is rejected
        type Error;

        /// Reduce an action into state changes and emitted events
        ///
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns the events describing what changed
        ///
        /// An empty event list means the action was accepted but changed
        /// nothing (for example removing an id that is already gone).
        ///
        /// # Errors
        ///
        /// Returns `Self::Error` when the action is invalid for the current
        /// state. State must be left exactly as it was.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<Events<Self::Action>, Self::Error>;
    }
}

/// Scope module - Granularity of change notification
///
/// Every emitted event declares the scopes it touches. Observers bound to a
/// scope are only notified when an event touches it.
pub mod scope {
    use smallvec::SmallVec;

    /// A notification scope
    ///
    /// - `Collection`: membership of the keyed collection (something was
    ///   added or removed)
    /// - `Key(k)`: the value stored under one key
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub enum Scope<K> {
        /// The collection's membership changed
        Collection,
        /// The value under this key changed
        Key(K),
    }

    impl<K> Scope<K> {
        /// Returns the key for a key scope
        #[must_use]
        pub const fn key(&self) -> Option<&K> {
            match self {
                Self::Collection => None,
                Self::Key(key) => Some(key),
            }
        }
    }

    /// Actions that know which notification scopes they touch
    ///
    /// Commands usually touch nothing; the events a reducer emits carry the
    /// scopes.
    pub trait Scoped {
        /// The key type of the underlying collection
        type Key;

        /// Scopes touched by this action
        fn scopes(&self) -> SmallVec<[Scope<Self::Key>; 2]>;

        /// Returns true if this action touches the given scope
        fn touches(&self, scope: &Scope<Self::Key>) -> bool
        where
            Self::Key: PartialEq,
        {
            self.scopes().iter().any(|s| s == scope)
        }

        /// Returns true if this action changes collection membership
        fn touches_collection(&self) -> bool
        where
            Self::Key: PartialEq,
        {
            self.touches(&Scope::Collection)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All non-deterministic inputs are abstracted behind traits and injected
/// via the Environment parameter, so tests can swap in predictable
/// implementations.
pub mod environment {
    use uuid::Uuid;

    /// Id generation - abstracts identifier creation for testability
    ///
    /// Implementations must not return the same id twice over the lifetime
    /// of a store. Practical uniqueness is enough; ids are not secrets.
    ///
    /// # Examples
    ///
    /// ```
    /// use scoped_store_core::environment::{IdGenerator, RandomIds};
    ///
    /// let ids = RandomIds;
    /// assert_ne!(ids.next_id(), ids.next_id());
    /// ```
    pub trait IdGenerator: Send + Sync {
        /// Produce a fresh id
        fn next_id(&self) -> Uuid;
    }

    /// Production id generator backed by random (v4) UUIDs
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RandomIds;

    impl IdGenerator for RandomIds {
        fn next_id(&self) -> Uuid {
            Uuid::new_v4()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{IdGenerator, RandomIds};
    use super::scope::{Scope, Scoped};
    use super::{smallvec, SmallVec};
    use std::collections::HashSet;

    #[derive(Debug)]
    enum Change {
        Inserted(u32),
        Updated(u32),
        Ignored,
    }

    impl Scoped for Change {
        type Key = u32;

        fn scopes(&self) -> SmallVec<[Scope<u32>; 2]> {
            match self {
                Self::Inserted(k) => smallvec![Scope::Collection, Scope::Key(*k)],
                Self::Updated(k) => smallvec![Scope::Key(*k)],
                Self::Ignored => SmallVec::new(),
            }
        }
    }

    #[test]
    fn insert_touches_collection_and_key() {
        let change = Change::Inserted(7);
        assert!(change.touches_collection());
        assert!(change.touches(&Scope::Key(7)));
        assert!(!change.touches(&Scope::Key(8)));
    }

    #[test]
    fn update_touches_only_its_key() {
        let change = Change::Updated(3);
        assert!(!change.touches_collection());
        assert!(change.touches(&Scope::Key(3)));
    }

    #[test]
    fn ignored_touches_nothing() {
        assert!(Change::Ignored.scopes().is_empty());
    }

    #[test]
    fn scope_key_accessor() {
        assert_eq!(Scope::Key(5).key(), Some(&5));
        assert_eq!(Scope::<u32>::Collection.key(), None);
    }

    #[test]
    fn random_ids_are_distinct() {
        let ids = RandomIds;
        let generated: HashSet<_> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(generated.len(), 1000);
    }
}
