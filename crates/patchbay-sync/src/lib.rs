//! Shared patch documents and their synchronization.
//!
//! - [`Document`]: the record store with per-field change tracking
//! - [`DocumentManager`]: commits, gestures, undo/redo, pull/push and
//!   reconnection over a [`Carrier`]
//! - [`Relay`] / [`RelayServer`]: the remote authority keeping one ordered log
//!   per session
//! - [`TcpCarrier`] / [`LoopbackCarrier`]: transports
//! - [`DirectoryService`]: listing and naming documents
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use patchbay_sync::{ActorId, DocumentManager, LoopbackCarrier, Relay, Value};
//!
//! let relay = Arc::new(Mutex::new(Relay::new()));
//! let mut manager = DocumentManager::new(
//!     ActorId::random(),
//!     LoopbackCarrier::new(Arc::clone(&relay)),
//! );
//! manager.connect("localhost", 9000, "demo").unwrap();
//! manager.tick();
//!
//! let id = manager.document_mut().insert("object", [("text", Value::from("print"))]);
//! manager.commit("Add object").unwrap();
//! manager.tick();
//!
//! assert!(manager.document().contains(id));
//! assert_eq!(relay.lock().session_log("demo").unwrap().len(), 1);
//! ```

pub mod carrier;
pub mod codec;
pub mod directory;
pub mod history;
pub mod manager;
pub mod model;
pub mod relay;
pub mod transaction;

pub use carrier::{Carrier, CarrierEvent, LoopbackCarrier, TcpCarrier, TransportError};
pub use codec::{CodecError, Frame};
pub use directory::{DirectoryError, DirectoryEvent, DirectoryService, DocumentInfo, LocalDirectory};
pub use history::{Entry, History};
pub use manager::{ConnectionState, DocumentManager, ManagerEvent, SyncError};
pub use model::{
    ApplyReport, Change, ChangeSet, Document, Fields, ModelError, ObjectId, Operation, Record,
    Shield, Value, invert,
};
pub use relay::{PeerId, Relay, RelayError, RelayServer};
pub use transaction::{ActorId, Transaction};
