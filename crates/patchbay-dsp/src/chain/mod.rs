//! Compiled DSP chain.
//!
//! The chain module holds the signal side of a patch: processors connected
//! outlet to inlet, compiled into a flat execution order and run one block at a
//! time.
//!
//! # Architecture
//!
//! - [`Chain`] owns every processor and connection of one generation. The main
//!   thread builds and compiles it; afterwards it is handed to the audio thread
//!   (see [`swap`](crate::swap)) and only [`tick()`](Chain::tick) is called.
//! - [`Schedule`] is the frozen result of [`compile()`](Chain::compile): the
//!   execution order, the input feeds of every step, and the prepare order
//!   used by [`release()`](Chain::release).
//!
//! # Cycles
//!
//! Connection cycles are legal. Compilation breaks each cycle at a single
//! connection, which then carries the producer's previous block. The choice is
//! deterministic: it depends only on processor and connection insertion order.
//!
//! # Example
//!
//! ```rust,ignore
//! use patchbay_dsp::{Chain, Connection};
//!
//! let mut chain = Chain::new();
//! let osc = chain.add_processor(Box::new(Sine::new(440.0)))?;
//! let gain = chain.add_processor(Box::new(Gain::new(0.5)))?;
//! chain.add_connection(Connection::new(osc, 0, gain, 0))?;
//!
//! chain.compile(48000.0, 64)?;
//! chain.tick();
//! ```

mod connection;
mod processing;
mod schedule;

pub use connection::{Connection, ConnectionId, ProcessorId};
pub use processing::{Chain, ChainError, CompileReport, ProcessorState};
pub use schedule::Schedule;
