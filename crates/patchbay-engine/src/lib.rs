//! The patch engine: live objects and DSP chains built from a shared document.
//!
//! - [`Atom`]: message and argument values
//! - [`Object`] and the built-in classes in [`objects`]
//! - [`ObjectRegistry`]: class name to constructor, built once at startup
//! - [`Patcher`]: mirrors document changes into objects, links and a compiled
//!   DSP chain, and routes control messages
//! - [`Instance`]: a document manager, a patcher and a console driven together
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use patchbay_engine::{Atom, AudioSettings, Channels, Instance, ObjectRegistry};
//! use patchbay_sync::{ActorId, DocumentManager, LoopbackCarrier, Relay};
//!
//! let relay = Arc::new(Mutex::new(Relay::new()));
//! let manager = DocumentManager::new(ActorId::random(), LoopbackCarrier::new(relay));
//! let (mut instance, mut runner) = Instance::new(
//!     ObjectRegistry::with_builtins(),
//!     manager,
//!     AudioSettings::default(),
//!     Channels::default(),
//! );
//!
//! let plus = instance.add_object("+ 1", 10.0, 10.0).unwrap();
//! let print = instance.add_object("print", 10.0, 50.0).unwrap();
//! instance.add_link(plus, 0, print, 0).unwrap();
//! instance.send(plus, 0, &[Atom::Int(2)]).unwrap();
//! assert_eq!(instance.console().messages().last().unwrap().text, "print: 3");
//!
//! runner.process_block();
//! ```

pub mod atom;
pub mod audio;
pub mod console;
pub mod error;
pub mod instance;
pub mod object;
pub mod objects;
pub mod patch;
pub mod patcher;
pub mod registry;

pub use atom::Atom;
pub use audio::AudioBus;
pub use console::{Console, Level, Message};
pub use error::{ArgumentError, EngineError};
pub use instance::{Channels, Instance};
pub use object::{Context, Object, PinKind};
pub use patch::{LINK_CLASS, LinkSpec, OBJECT_CLASS, ObjectSpec};
pub use patcher::{AudioSettings, DEPTH_LIMIT, Patcher, STACK_LIMIT};
pub use registry::{ObjectCategory, ObjectConstructor, ObjectDescriptor, ObjectRegistry};
