//! Error types for the todo store.

use crate::types::TodoId;
use thiserror::Error;

/// Errors returned by todo store operations
///
/// All errors are local and recoverable: a rejected operation leaves the
/// store exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TodoError {
    /// No todo exists with this id
    #[error("Todo with ID {0} not found")]
    NotFound(TodoId),

    /// Input failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The id generator produced an id that is already live
    #[error("Todo with ID {0} already exists")]
    DuplicateId(TodoId),

    /// The id belonged to a todo that was removed; ids are never reused
    #[error("Todo with ID {0} was removed")]
    Removed(TodoId),
}

/// Input validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Title is shorter than the configured minimum
    #[error("Todo title too short ({actual} characters, minimum {min})")]
    TitleTooShort {
        /// Minimum number of characters
        min: usize,
        /// Characters in the title
        actual: usize,
    },
}
