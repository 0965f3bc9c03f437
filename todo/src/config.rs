//! Configuration for the todo store.
//!
//! Values are loaded from environment variables (a `.env` file is honored by
//! the binary), falling back to defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Todo store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoConfig {
    /// Minimum number of characters in a title
    pub min_title_chars: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl TodoConfig {
    /// Load configuration from environment variables
    ///
    /// - `TODO_MIN_TITLE_CHARS` (default 2)
    /// - `TODO_EVENT_CAPACITY` (default 16)
    ///
    /// Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            min_title_chars: env::var("TODO_MIN_TITLE_CHARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_title_chars),
            event_capacity: env::var("TODO_EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.event_capacity),
        }
    }

    /// Set the minimum title length
    #[must_use]
    pub const fn with_min_title_chars(mut self, min_title_chars: usize) -> Self {
        self.min_title_chars = min_title_chars;
        self
    }

    /// Set the event broadcast capacity
    #[must_use]
    pub const fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity;
        self
    }
}

impl Default for TodoConfig {
    fn default() -> Self {
        Self {
            min_title_chars: 2,
            event_capacity: 16,
        }
    }
}
