//! Directory service: listing, creating and renaming shared documents.
//!
//! Requests return immediately; results arrive later as [`DirectoryEvent`]s
//! that the main thread drains with [`DirectoryService::poll()`]. The
//! [`LocalDirectory`] implementation answers from memory, through the same
//! queue a remote implementation would use.

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A document known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Directory id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Relay session holding the document.
    pub session: String,
}

/// Errors reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// No document has this id.
    #[error("document {0} not found")]
    NotFound(u64),
    /// Names must not be blank.
    #[error("document name is empty")]
    EmptyName,
}

/// Result of a directory request.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryEvent {
    /// Answer to `list_documents`.
    Listed(Vec<DocumentInfo>),
    /// Answer to `create_document`.
    Created(Result<DocumentInfo, DirectoryError>),
    /// Answer to `rename_document`.
    Renamed(Result<DocumentInfo, DirectoryError>),
}

/// Asynchronous document directory.
pub trait DirectoryService {
    /// Requests the document list.
    fn list_documents(&mut self);

    /// Requests a new document.
    fn create_document(&mut self, name: &str);

    /// Requests a rename.
    fn rename_document(&mut self, id: u64, name: &str);

    /// Returns the next answered request.
    fn poll(&mut self) -> Option<DirectoryEvent>;
}

/// In-memory directory.
pub struct LocalDirectory {
    documents: Vec<DocumentInfo>,
    next_id: u64,
    answers_tx: Sender<DirectoryEvent>,
    answers_rx: Receiver<DirectoryEvent>,
}

impl Default for LocalDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        let (answers_tx, answers_rx) = unbounded();
        Self {
            documents: Vec::new(),
            next_id: 1,
            answers_tx,
            answers_rx,
        }
    }

    fn answer(&self, event: DirectoryEvent) {
        // Both ends live in `self`.
        let _ = self.answers_tx.send(event);
    }
}

fn validate_name(name: &str) -> Result<String, DirectoryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DirectoryError::EmptyName);
    }
    Ok(name.to_string())
}

impl DirectoryService for LocalDirectory {
    fn list_documents(&mut self) {
        self.answer(DirectoryEvent::Listed(self.documents.clone()));
    }

    fn create_document(&mut self, name: &str) {
        let result = validate_name(name).map(|name| {
            let info = DocumentInfo {
                id: self.next_id,
                name,
                session: Uuid::new_v4().simple().to_string(),
            };
            self.next_id += 1;
            self.documents.push(info.clone());
            tracing::info!(id = info.id, name = %info.name, "document created");
            info
        });
        self.answer(DirectoryEvent::Created(result));
    }

    fn rename_document(&mut self, id: u64, name: &str) {
        let result = validate_name(name).and_then(|name| {
            let doc = self
                .documents
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or(DirectoryError::NotFound(id))?;
            doc.name = name;
            Ok(doc.clone())
        });
        self.answer(DirectoryEvent::Renamed(result));
    }

    fn poll(&mut self) -> Option<DirectoryEvent> {
        self.answers_rx.try_recv().ok()
    }
}
