//! The user-facing console.
//!
//! Objects and the engine post messages here; the front end reads them back.
//! Every message is also emitted as a `tracing` event at the matching level so
//! headless runs still see them in the log.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Maximum number of messages kept in the history.
pub const CONSOLE_CAPACITY: usize = 1024;

/// Severity of a console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Internal detail.
    Log,
    /// Normal output, e.g. from `print`.
    Post,
    /// Something looks wrong but the engine carried on.
    Warning,
    /// An operation failed.
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Log => "log",
            Level::Post => "post",
            Level::Warning => "warning",
            Level::Error => "error",
        })
    }
}

/// One console entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Severity.
    pub level: Level,
    /// Text.
    pub text: String,
}

/// Shared, cloneable handle to the console history.
#[derive(Debug, Clone, Default)]
pub struct Console {
    history: Arc<Mutex<VecDeque<Message>>>,
}

impl Console {
    /// Creates an empty console.
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts an internal message.
    pub fn log(&self, text: impl Into<String>) {
        self.push(Level::Log, text.into());
    }

    /// Posts a normal message.
    pub fn post(&self, text: impl Into<String>) {
        self.push(Level::Post, text.into());
    }

    /// Posts a warning.
    pub fn warning(&self, text: impl Into<String>) {
        self.push(Level::Warning, text.into());
    }

    /// Posts an error.
    pub fn error(&self, text: impl Into<String>) {
        self.push(Level::Error, text.into());
    }

    /// Returns a copy of the history, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.history.lock().iter().cloned().collect()
    }

    /// Drains the history.
    pub fn take(&self) -> Vec<Message> {
        self.history.lock().drain(..).collect()
    }

    /// Counts the messages of one level.
    pub fn count(&self, level: Level) -> usize {
        self.history
            .lock()
            .iter()
            .filter(|m| m.level == level)
            .count()
    }

    /// Returns the number of messages kept.
    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    /// Returns true if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }

    /// Empties the history.
    pub fn clear(&self) {
        self.history.lock().clear();
    }

    fn push(&self, level: Level, text: String) {
        match level {
            Level::Log => tracing::debug!(target: "patchbay::console", "{text}"),
            Level::Post => tracing::info!(target: "patchbay::console", "{text}"),
            Level::Warning => tracing::warn!(target: "patchbay::console", "{text}"),
            Level::Error => tracing::error!(target: "patchbay::console", "{text}"),
        }
        let mut history = self.history.lock();
        if history.len() == CONSOLE_CAPACITY {
            history.pop_front();
        }
        history.push_back(Message { level, text });
    }
}
