//! Signal-processing core for patchbay.
//!
//! This crate holds everything the audio thread touches:
//!
//! - [`Signal`] and [`Buffer`]: per-block sample storage
//! - [`Processor`]: one DSP node with a prepare/perform/release lifecycle
//! - [`Chain`]: processors plus connections, compiled into a [`Schedule`]
//! - [`chain_swap`]: hands compiled chains to the audio thread between ticks
//!
//! Nothing here knows about patches, objects or documents. The engine crate
//! builds a [`Chain`] from the patch model and installs it through a
//! [`ChainSwap`].
//!
//! # Features
//!
//! - `tracing`: emit `tracing` events for chain mutations and compilation.

pub mod chain;
pub mod processor;
pub mod signal;
pub mod swap;

pub use chain::{
    Chain, ChainError, CompileReport, Connection, ConnectionId, ProcessorId, ProcessorState,
    Schedule,
};
pub use processor::{Binding, PerformFn, PrepareInfo, Processor, ProcessorError};
pub use signal::{Buffer, Sample, Signal};
pub use swap::{AudioRunner, ChainSwap, chain_swap};
