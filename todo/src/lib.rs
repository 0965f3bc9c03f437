//! Todo store with per-id scoped subscriptions.
//!
//! A keyed collection of todo records with add, remove and toggle, where
//! readers subscribe to a single todo and are notified only when that todo
//! changes. It demonstrates:
//!
//! - A reducer that validates commands and answers with events
//! - Events that declare the notification scopes they touch
//! - A per-id memoized selector and a membership-only list view
//! - Event replay through the same reducer
//! - Testing with `ReducerTest`
//!
//! # Quick Start
//!
//! ```no_run
//! use todo::{TodoConfig, TodoStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = TodoStore::from_config(&TodoConfig::from_env());
//!
//! let milk = store.add("Buy milk").await?;
//! let dog = store.add("Walk dog").await?;
//!
//! // Only changes to `dog` reach this callback
//! let subscription = store
//!     .subscribe(dog, |todo| println!("dog is now {todo:?}"))
//!     .await;
//!
//! store.toggle(milk).await?;
//! store.remove(dog).await?;
//! subscription.unsubscribe();
//!
//! println!("Total todos: {}", store.count().await);
//! println!("Completed: {}", store.completed_count().await);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod reducer;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::TodoConfig;
pub use error::{TodoError, ValidationError};
pub use reducer::{TodoEnvironment, TodoReducer};
pub use store::{Subscription, TodoListView, TodoSelector, TodoStore};
pub use types::{TodoAction, TodoId, TodoRecord, TodoState};
