//! Undo/redo stacks of locally committed operations.
//!
//! Both stacks hold the operations that were actually applied. Undoing an
//! entry replays its inverse as a new local commit, and the operations that
//! replay produced become the matching redo entry (and vice versa). History
//! is never rewritten in place.

use crate::model::Operation;

/// One undoable step.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Label shown in menus ("Move", "Add object").
    pub label: String,
    /// Operations as they were applied.
    pub ops: Vec<Operation>,
}

/// Local undo/redo history.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<Entry>,
    redo: Vec<Entry>,
}

impl History {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fresh local commit and clears the redo stack.
    pub fn record(&mut self, entry: Entry) {
        self.undo.push(entry);
        self.redo.clear();
    }

    /// Returns true if an undo step is available.
    pub fn has_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Returns true if a redo step is available.
    pub fn has_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Label of the next undo step.
    pub fn undo_label(&self) -> Option<&str> {
        self.undo.last().map(|e| e.label.as_str())
    }

    /// Label of the next redo step.
    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(|e| e.label.as_str())
    }

    /// Number of undo steps.
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Number of redo steps.
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Entry> {
        self.undo.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Entry> {
        self.redo.pop()
    }

    pub(crate) fn push_undo(&mut self, entry: Entry) {
        self.undo.push(entry);
    }

    pub(crate) fn push_redo(&mut self, entry: Entry) {
        self.redo.push(entry);
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
