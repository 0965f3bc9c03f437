//! Reducer logic for the todo collection.
//!
//! Commands are validated against the current state and answered with the
//! events they cause; events are applied to state. An event sent as input is
//! replayed: it is applied, and echoed back only if it changed something.

use crate::error::{TodoError, ValidationError};
use crate::types::{TodoAction, TodoId, TodoRecord, TodoState};
use scoped_store_core::{environment::IdGenerator, reducer::Reducer, smallvec, Events};
use std::sync::Arc;

/// Environment dependencies for the todo reducer
#[derive(Clone)]
pub struct TodoEnvironment {
    /// Source of fresh todo ids
    pub ids: Arc<dyn IdGenerator>,
}

impl TodoEnvironment {
    /// Creates a new `TodoEnvironment`
    #[must_use]
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    /// Draws the next id from the generator
    #[must_use]
    pub fn next_id(&self) -> TodoId {
        TodoId::from_uuid(self.ids.next_id())
    }
}

impl std::fmt::Debug for TodoEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoEnvironment").finish_non_exhaustive()
    }
}

/// Reducer for the todo collection
#[derive(Clone, Debug)]
pub struct TodoReducer {
    min_title_chars: usize,
}

impl TodoReducer {
    /// Creates a reducer requiring titles of at least two characters
    #[must_use]
    pub const fn new() -> Self {
        Self { min_title_chars: 2 }
    }

    /// Sets the minimum title length, in characters
    #[must_use]
    pub const fn with_min_title_chars(mut self, min_title_chars: usize) -> Self {
        self.min_title_chars = min_title_chars;
        self
    }

    /// Minimum title length in characters
    #[must_use]
    pub const fn min_title_chars(&self) -> usize {
        self.min_title_chars
    }

    /// Validates a title
    ///
    /// Counts characters of the title as given, surrounding whitespace
    /// included.
    fn validate_title(&self, title: &str) -> Result<(), ValidationError> {
        let actual = title.chars().count();
        if actual < self.min_title_chars {
            return Err(ValidationError::TitleTooShort {
                min: self.min_title_chars,
                actual,
            });
        }

        Ok(())
    }

    /// Validates an `AddTodo` command
    fn validate_add_todo(&self, state: &TodoState, id: &TodoId, title: &str) -> Result<(), TodoError> {
        self.validate_title(title)?;

        if state.was_removed(id) {
            return Err(TodoError::Removed(*id));
        }

        if state.exists(id) {
            return Err(TodoError::DuplicateId(*id));
        }

        Ok(())
    }

    /// Looks up the current done flag of a todo
    fn current_done(state: &TodoState, id: &TodoId) -> Result<bool, TodoError> {
        state
            .get(id)
            .map(|todo| todo.done)
            .ok_or(TodoError::NotFound(*id))
    }

    /// Applies an event to state
    fn apply_event(state: &mut TodoState, action: &TodoAction) {
        match action {
            TodoAction::TodoAdded { record } => {
                state.todos.insert(record.id, record.clone());
            },
            TodoAction::TodoRemoved { id } => {
                state.todos.remove(id);
                state.removed.insert(*id);
            },
            TodoAction::TodoDoneChanged { id, done } => {
                if let Some(todo) = state.todos.get_mut(id) {
                    todo.done = *done;
                }
            },
            // Commands are not applied to state
            TodoAction::AddTodo { .. }
            | TodoAction::RemoveTodo { .. }
            | TodoAction::ToggleTodo { .. }
            | TodoAction::SetDone { .. } => {},
        }
    }

    /// Applies an event and returns it as the single emitted event
    fn emit(state: &mut TodoState, event: TodoAction) -> Events<TodoAction> {
        Self::apply_event(state, &event);
        smallvec![event]
    }

    /// Emits a done change only if the flag actually changes
    fn change_done(state: &mut TodoState, id: TodoId, done: bool) -> Result<Events<TodoAction>, TodoError> {
        if Self::current_done(state, &id)? == done {
            return Ok(Events::new());
        }

        Ok(Self::emit(state, TodoAction::TodoDoneChanged { id, done }))
    }
}

impl Default for TodoReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for TodoReducer {
    type State = TodoState;
    type Action = TodoAction;
    type Environment = TodoEnvironment;
    type Error = TodoError;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> Result<Events<Self::Action>, Self::Error> {
        match action {
            // ========== Commands ==========
            TodoAction::AddTodo { id, title } => {
                self.validate_add_todo(state, &id, &title)?;

                Ok(Self::emit(
                    state,
                    TodoAction::TodoAdded {
                        record: TodoRecord::new(id, title),
                    },
                ))
            },

            TodoAction::RemoveTodo { id } => {
                if !state.exists(&id) {
                    return Ok(Events::new());
                }

                Ok(Self::emit(state, TodoAction::TodoRemoved { id }))
            },

            TodoAction::ToggleTodo { id } => {
                let done = Self::current_done(state, &id)?;
                Self::change_done(state, id, !done)
            },

            TodoAction::SetDone { id, done } => Self::change_done(state, id, done),

            // ========== Events (replay) ==========
            // A replayed log may be older than the state it is replayed
            // onto. Events for a removed id are superseded by that removal,
            // and a live record with the same title already reflects its
            // `TodoAdded`: its done flag is owned by the `TodoDoneChanged`
            // events that follow in the log, so it is not compared here.
            TodoAction::TodoAdded { record } => {
                if state.was_removed(&record.id) {
                    return Ok(Events::new());
                }
                match state.get(&record.id) {
                    Some(existing) if existing.title == record.title => return Ok(Events::new()),
                    Some(_) => return Err(TodoError::DuplicateId(record.id)),
                    None => {},
                }
                self.validate_title(&record.title)?;

                Ok(Self::emit(state, TodoAction::TodoAdded { record }))
            },

            TodoAction::TodoRemoved { id } => {
                if !state.exists(&id) {
                    return Ok(Events::new());
                }

                Ok(Self::emit(state, TodoAction::TodoRemoved { id }))
            },

            TodoAction::TodoDoneChanged { id, done } => {
                if state.was_removed(&id) {
                    return Ok(Events::new());
                }
                Self::change_done(state, id, done)
            },
        }
    }
}
