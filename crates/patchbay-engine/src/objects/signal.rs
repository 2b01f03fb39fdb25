//! Signal objects: constants and per-sample arithmetic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use patchbay_dsp::{Binding, Buffer, PerformFn, PrepareInfo, Processor, ProcessorError, Sample};

use crate::atom::Atom;
use crate::audio::AudioBus;
use crate::error::ArgumentError;
use crate::object::{Context, Object, PinKind};

use super::{at_most, number_arg};

/// A sample value written by the main thread and read by the audio thread.
///
/// Stored as the bits of an `f32` so neither side ever locks.
#[derive(Debug, Default)]
pub struct Scalar(AtomicU32);

impl Scalar {
    /// Creates a scalar holding `value`.
    pub fn new(value: Sample) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    /// Stores a new value.
    #[inline]
    pub fn set(&self, value: Sample) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Loads the current value.
    #[inline]
    pub fn get(&self) -> Sample {
        Sample::from_bits(self.0.load(Ordering::Acquire))
    }
}

// --- sig~ ---

/// Outputs a constant signal set by control messages.
pub struct SigTilde {
    value: Arc<Scalar>,
}

impl SigTilde {
    /// Constructor for `sig~`.
    pub fn create(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        at_most(args, 1)?;
        let value = number_arg(args, 0)?.unwrap_or(0.0);
        Ok(Box::new(Self {
            value: Arc::new(Scalar::new(value as Sample)),
        }))
    }
}

impl Object for SigTilde {
    fn inlets(&self) -> &[PinKind] {
        &[PinKind::Control]
    }

    fn outlets(&self) -> &[PinKind] {
        &[PinKind::Signal]
    }

    fn receive(&mut self, _inlet: usize, message: &[Atom], cx: &mut Context<'_>) {
        match message.first().and_then(Atom::as_float) {
            Some(v) => self.value.set(v as Sample),
            None => cx.console().warning("sig~: expects a number"),
        }
    }

    fn processor(&self, _bus: &AudioBus) -> Option<Box<dyn Processor>> {
        Some(Box::new(SigProcessor {
            value: Arc::clone(&self.value),
        }))
    }
}

struct SigProcessor {
    value: Arc<Scalar>,
}

impl Processor for SigProcessor {
    fn inputs(&self) -> usize {
        0
    }

    fn outputs(&self) -> usize {
        1
    }

    fn prepare(&mut self, _info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
        Ok(Binding::Bound)
    }

    fn perform(&mut self, _input: &Buffer, output: &mut Buffer) {
        output.channel_mut(0).fill(self.value.get());
    }

    fn name(&self) -> &str {
        "sig~"
    }
}

// --- +~ and *~ ---

/// Per-sample arithmetic: `+~` and `*~`.
///
/// When the right inlet has a signal connection both operands are signals;
/// otherwise the right operand is a scalar taken from the first argument and
/// updated by numbers sent to the right inlet.
pub struct OperatorTilde {
    class: &'static str,
    compute: fn(Sample, Sample) -> Sample,
    rhs: Arc<Scalar>,
}

impl OperatorTilde {
    fn create(
        class: &'static str,
        compute: fn(Sample, Sample) -> Sample,
        args: &[Atom],
    ) -> Result<Box<dyn Object>, ArgumentError> {
        at_most(args, 1)?;
        let rhs = number_arg(args, 0)?.unwrap_or(0.0);
        Ok(Box::new(Self {
            class,
            compute,
            rhs: Arc::new(Scalar::new(rhs as Sample)),
        }))
    }

    /// Constructor for `+~`.
    pub fn plus(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        Self::create("+~", |a, b| a + b, args)
    }

    /// Constructor for `*~`.
    pub fn times(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        Self::create("*~", |a, b| a * b, args)
    }
}

impl Object for OperatorTilde {
    fn inlets(&self) -> &[PinKind] {
        &[PinKind::Signal, PinKind::Signal]
    }

    fn outlets(&self) -> &[PinKind] {
        &[PinKind::Signal]
    }

    fn receive(&mut self, inlet: usize, message: &[Atom], cx: &mut Context<'_>) {
        match (inlet, message.first().and_then(Atom::as_float)) {
            (1, Some(v)) => self.rhs.set(v as Sample),
            _ => cx
                .console()
                .warning(format!("{}: inlet {} only takes signals", self.class, inlet + 1)),
        }
    }

    fn processor(&self, _bus: &AudioBus) -> Option<Box<dyn Processor>> {
        Some(Box::new(OperatorTildeProcessor {
            class: self.class,
            compute: self.compute,
            rhs: Arc::clone(&self.rhs),
            perform: None,
        }))
    }
}

struct OperatorTildeProcessor {
    class: &'static str,
    compute: fn(Sample, Sample) -> Sample,
    rhs: Arc<Scalar>,
    perform: Option<PerformFn<Self>>,
}

impl OperatorTildeProcessor {
    fn perform_scalar(&mut self, input: &Buffer, output: &mut Buffer) {
        let rhs = self.rhs.get();
        let compute = self.compute;
        let lhs = input.channel(0).as_slice();
        for (o, l) in output.channel_mut(0).as_mut_slice().iter_mut().zip(lhs) {
            *o = compute(*l, rhs);
        }
    }

    fn perform_signal(&mut self, input: &Buffer, output: &mut Buffer) {
        let compute = self.compute;
        let (lhs, rhs) = (input.channel(0).as_slice(), input.channel(1).as_slice());
        for ((o, l), r) in output
            .channel_mut(0)
            .as_mut_slice()
            .iter_mut()
            .zip(lhs)
            .zip(rhs)
        {
            *o = compute(*l, *r);
        }
    }
}

impl Processor for OperatorTildeProcessor {
    fn inputs(&self) -> usize {
        2
    }

    fn outputs(&self) -> usize {
        1
    }

    fn prepare(&mut self, info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
        self.perform = Some(if info.is_input_connected(1) {
            Self::perform_signal
        } else {
            Self::perform_scalar
        });
        Ok(Binding::Bound)
    }

    fn perform(&mut self, input: &Buffer, output: &mut Buffer) {
        if let Some(f) = self.perform {
            f(self, input, output);
        }
    }

    fn release(&mut self) {
        self.perform = None;
    }

    fn name(&self) -> &str {
        self.class
    }
}
