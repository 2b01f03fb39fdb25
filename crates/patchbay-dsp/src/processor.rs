//! The [`Processor`] trait: one node of the DSP chain.
//!
//! A processor declares its port counts up front and is otherwise inert until
//! the chain prepares it. `prepare()` inspects the sample rate, vector size and
//! inlet connectivity and either binds a perform routine ([`Binding::Bound`]) or
//! declines ([`Binding::Unbound`]). Unbound processors stay in the topology but
//! are skipped by [`Chain::tick()`](crate::Chain::tick) for that generation.
//!
//! Processors usually pick their perform routine during `prepare()` and store it
//! as a [`PerformFn`], so the per-block cost is a single indirect call:
//!
//! ```rust
//! use patchbay_dsp::{Binding, Buffer, PerformFn, PrepareInfo, Processor, ProcessorError};
//!
//! struct Add {
//!     rhs: f32,
//!     perform: Option<PerformFn<Self>>,
//! }
//!
//! impl Add {
//!     fn perform_scalar(&mut self, input: &Buffer, output: &mut Buffer) {
//!         let rhs = self.rhs;
//!         for (o, i) in output.channel_mut(0).as_mut_slice().iter_mut().zip(input.channel(0).as_slice()) {
//!             *o = *i + rhs;
//!         }
//!     }
//!
//!     fn perform_signal(&mut self, input: &Buffer, output: &mut Buffer) {
//!         let (lhs, rhs) = (input.channel(0).as_slice(), input.channel(1).as_slice());
//!         for ((o, l), r) in output.channel_mut(0).as_mut_slice().iter_mut().zip(lhs).zip(rhs) {
//!             *o = *l + *r;
//!         }
//!     }
//! }
//!
//! impl Processor for Add {
//!     fn inputs(&self) -> usize { 2 }
//!     fn outputs(&self) -> usize { 1 }
//!
//!     fn prepare(&mut self, info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
//!         self.perform = Some(if info.is_input_connected(1) {
//!             Self::perform_signal
//!         } else {
//!             Self::perform_scalar
//!         });
//!         Ok(Binding::Bound)
//!     }
//!
//!     fn perform(&mut self, input: &Buffer, output: &mut Buffer) {
//!         if let Some(f) = self.perform {
//!             f(self, input, output);
//!         }
//!     }
//! }
//! ```

use thiserror::Error;

use crate::signal::Buffer;

/// A perform routine bound to a concrete processor type.
pub type PerformFn<P> = fn(&mut P, &Buffer, &mut Buffer);

/// Information handed to [`Processor::prepare()`].
#[derive(Debug, Clone, Copy)]
pub struct PrepareInfo<'a> {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Samples per block.
    pub vector_size: usize,
    /// Connectivity of each inlet (`true` when at least one connection feeds it).
    pub inputs: &'a [bool],
}

impl PrepareInfo<'_> {
    /// Returns true if inlet `index` has at least one incoming connection.
    #[inline]
    pub fn is_input_connected(&self, index: usize) -> bool {
        self.inputs.get(index).copied().unwrap_or(false)
    }
}

/// Outcome of a successful [`Processor::prepare()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// A perform routine is bound; the processor runs every tick.
    Bound,
    /// No perform routine; the processor is skipped this generation.
    Unbound,
}

/// Errors raised by a processor while preparing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessorError {
    /// The processor cannot run at the requested vector size.
    #[error("unsupported vector size {0}")]
    UnsupportedVectorSize(usize),

    /// The processor cannot run at the requested sample rate.
    #[error("unsupported sample rate {0}")]
    UnsupportedSampleRate(f32),

    /// Any other preparation failure.
    #[error("prepare failed: {0}")]
    Prepare(String),
}

/// One node of the DSP chain.
///
/// Implementations are owned exclusively by a [`Chain`](crate::Chain) and are
/// only ever touched by one thread at a time.
pub trait Processor: Send {
    /// Number of signal inlets.
    fn inputs(&self) -> usize;

    /// Number of signal outlets.
    fn outputs(&self) -> usize;

    /// Prepares for processing and selects the perform routine.
    ///
    /// Called once per chain compilation, in dependency order.
    fn prepare(&mut self, info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError>;

    /// Processes one block.
    ///
    /// `input` has [`inputs()`](Self::inputs) channels holding the sum of every
    /// connection into each inlet; `output` has [`outputs()`](Self::outputs)
    /// zeroed channels that the processor overwrites.
    fn perform(&mut self, input: &Buffer, output: &mut Buffer);

    /// Releases resources acquired in `prepare()`.
    fn release(&mut self) {}

    /// A short name used in logs and reports.
    fn name(&self) -> &str {
        "processor"
    }
}
