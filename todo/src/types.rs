//! Domain types for the todo store.
//!
//! A todo list is a keyed collection of records that can be added, toggled,
//! and removed. Every key equals the `id` of the record stored under it.

use scoped_store_core::scope::{Scope, Scoped};
use scoped_store_core::{smallvec, SmallVec};
use scoped_store_macros::Action;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a todo record
///
/// Opaque, generated by the store at creation, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TodoId(Uuid);

impl TodoId {
    /// Creates a `TodoId` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses ids handed back by a form or rendering layer
impl FromStr for TodoId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A single todo record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoRecord {
    /// Unique identifier
    pub id: TodoId,
    /// Title, fixed at creation
    pub title: String,
    /// Whether the todo is done
    pub done: bool,
}

impl TodoRecord {
    /// Creates a new, not yet done, record
    #[must_use]
    pub const fn new(id: TodoId, title: String) -> Self {
        Self {
            id,
            title,
            done: false,
        }
    }
}

/// State of the todo collection
///
/// Iteration order of `todos` is unspecified and may change across
/// mutations. Removal is terminal: a removed id is remembered in `removed`
/// and never becomes live again.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TodoState {
    /// All todos indexed by ID
    pub todos: HashMap<TodoId, TodoRecord>,
    /// Ids that were removed; only ever grows
    #[serde(default)]
    pub removed: HashSet<TodoId>,
}

impl TodoState {
    /// Creates a new empty todo state
    #[must_use]
    pub fn new() -> Self {
        Self {
            todos: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    /// Returns the number of todos
    #[must_use]
    pub fn count(&self) -> usize {
        self.todos.len()
    }

    /// Returns the number of done todos
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.todos.values().filter(|t| t.done).count()
    }

    /// Returns a todo by ID
    #[must_use]
    pub fn get(&self, id: &TodoId) -> Option<&TodoRecord> {
        self.todos.get(id)
    }

    /// Checks if a todo exists
    #[must_use]
    pub fn exists(&self, id: &TodoId) -> bool {
        self.todos.contains_key(id)
    }

    /// Checks if a todo existed and was removed
    #[must_use]
    pub fn was_removed(&self, id: &TodoId) -> bool {
        self.removed.contains(id)
    }

    /// Owned copy of every record
    #[must_use]
    pub fn snapshot(&self) -> Vec<TodoRecord> {
        self.todos.values().cloned().collect()
    }

    /// Ids of every record
    #[must_use]
    pub fn ids(&self) -> Vec<TodoId> {
        self.todos.keys().copied().collect()
    }
}

/// Actions representing commands and events for todos
///
/// Commands are requests sent to the store. The reducer validates them and
/// answers with events describing what changed; events are also accepted as
/// input, which replays them onto the state.
#[derive(Action, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TodoAction {
    // ========== Commands ==========
    /// Command: Add a new todo under a freshly generated id
    #[command]
    AddTodo {
        /// Todo identifier
        id: TodoId,
        /// Title of the todo
        title: String,
    },

    /// Command: Remove a todo (no-op if absent)
    #[command]
    RemoveTodo {
        /// Todo to remove
        id: TodoId,
    },

    /// Command: Flip the done flag of a todo
    #[command]
    ToggleTodo {
        /// Todo to toggle
        id: TodoId,
    },

    /// Command: Set the done flag of a todo to a specific value
    #[command]
    SetDone {
        /// Todo to update
        id: TodoId,
        /// New value of the flag
        done: bool,
    },

    // ========== Events ==========
    /// Event: Todo was added
    #[event]
    TodoAdded {
        /// The record as inserted
        record: TodoRecord,
    },

    /// Event: Todo was removed
    #[event]
    TodoRemoved {
        /// Todo identifier
        id: TodoId,
    },

    /// Event: Done flag changed
    #[event]
    TodoDoneChanged {
        /// Todo identifier
        id: TodoId,
        /// Value after the change
        done: bool,
    },
}

impl TodoAction {
    /// The id this action is about
    #[must_use]
    pub const fn id(&self) -> &TodoId {
        match self {
            Self::AddTodo { id, .. }
            | Self::RemoveTodo { id }
            | Self::ToggleTodo { id }
            | Self::SetDone { id, .. }
            | Self::TodoRemoved { id }
            | Self::TodoDoneChanged { id, .. } => id,
            Self::TodoAdded { record } => &record.id,
        }
    }
}

/// Adding or removing changes membership and the record itself; a done
/// change only touches the record. Commands touch nothing.
impl Scoped for TodoAction {
    type Key = TodoId;

    fn scopes(&self) -> SmallVec<[Scope<TodoId>; 2]> {
        match self {
            Self::TodoAdded { record } => smallvec![Scope::Collection, Scope::Key(record.id)],
            Self::TodoRemoved { id } => smallvec![Scope::Collection, Scope::Key(*id)],
            Self::TodoDoneChanged { id, .. } => smallvec![Scope::Key(*id)],
            Self::AddTodo { .. }
            | Self::RemoveTodo { .. }
            | Self::ToggleTodo { .. }
            | Self::SetDone { .. } => SmallVec::new(),
        }
    }
}
