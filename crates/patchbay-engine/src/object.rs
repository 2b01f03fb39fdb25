//! The [`Object`] trait implemented by every box of a patch.
//!
//! An object owns its control state and declares its pins. Control messages
//! reach it through [`Object::receive()`]; whatever it sends through the
//! [`Context`] is routed along the patch links once `receive()` returns.
//! Objects with signal pins also hand out a [`Processor`] for each chain the
//! engine compiles.

use patchbay_dsp::Processor;

use crate::atom::Atom;
use crate::audio::AudioBus;
use crate::console::Console;

/// The kind of an inlet or outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinKind {
    /// Carries control messages.
    Control,
    /// Carries audio. Signal inlets also accept control messages.
    Signal,
}

impl PinKind {
    /// Returns true for [`PinKind::Signal`].
    #[inline]
    pub fn is_signal(self) -> bool {
        self == PinKind::Signal
    }
}

/// Returns the position of pin `index` among the signal pins of `pins`.
///
/// Chain connections address processor ports, which only count signal pins.
pub fn signal_index(pins: &[PinKind], index: usize) -> Option<usize> {
    match pins.get(index) {
        Some(PinKind::Signal) => Some(pins[..index].iter().filter(|p| p.is_signal()).count()),
        _ => None,
    }
}

/// What an object may touch while handling a message.
pub struct Context<'a> {
    console: &'a Console,
    audio: Option<&'a AudioBus>,
    outputs: Vec<(usize, Vec<Atom>)>,
}

impl<'a> Context<'a> {
    /// Creates a context posting to `console`.
    pub fn new(console: &'a Console) -> Self {
        Self {
            console,
            audio: None,
            outputs: Vec::new(),
        }
    }

    /// Creates a context that can also reach the audio bus.
    pub fn with_audio(console: &'a Console, audio: &'a AudioBus) -> Self {
        Self {
            console,
            audio: Some(audio),
            outputs: Vec::new(),
        }
    }

    /// Sends `message` out of `outlet`.
    pub fn send(&mut self, outlet: usize, message: Vec<Atom>) {
        self.outputs.push((outlet, message));
    }

    /// Returns the console.
    pub fn console(&self) -> &Console {
        self.console
    }

    /// Returns the audio bus, if the patch has one.
    pub fn audio(&self) -> Option<&AudioBus> {
        self.audio
    }

    /// Returns the messages sent so far, in order.
    pub fn outputs(&self) -> &[(usize, Vec<Atom>)] {
        &self.outputs
    }

    /// Consumes the context and returns the messages sent.
    pub fn into_outputs(self) -> Vec<(usize, Vec<Atom>)> {
        self.outputs
    }
}

/// One box of a patch.
pub trait Object: Send {
    /// Inlet kinds, left to right.
    fn inlets(&self) -> &[PinKind];

    /// Outlet kinds, left to right.
    fn outlets(&self) -> &[PinKind];

    /// Handles a control message arriving on `inlet`.
    fn receive(&mut self, inlet: usize, message: &[Atom], cx: &mut Context<'_>);

    /// Called once after the patch is loaded.
    fn loadbang(&mut self, _cx: &mut Context<'_>) {}

    /// Creates the processor that runs this object in a new chain.
    ///
    /// Called every time the engine rebuilds the chain; the previous processor
    /// belongs to the previous chain. Control-only objects return `None`.
    fn processor(&self, _bus: &AudioBus) -> Option<Box<dyn Processor>> {
        None
    }

    /// Returns true if the object has any signal pin.
    fn is_dsp(&self) -> bool {
        self.inlets().iter().chain(self.outlets()).any(|p| p.is_signal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_index_skips_control_pins() {
        let pins = [PinKind::Control, PinKind::Signal, PinKind::Control, PinKind::Signal];
        assert_eq!(signal_index(&pins, 0), None);
        assert_eq!(signal_index(&pins, 1), Some(0));
        assert_eq!(signal_index(&pins, 3), Some(1));
        assert_eq!(signal_index(&pins, 4), None);
    }

    #[test]
    fn context_collects_outputs_in_order() {
        let console = Console::new();
        let mut cx = Context::new(&console);
        cx.send(1, vec![Atom::Int(1)]);
        cx.send(0, vec![Atom::bang()]);
        cx.console().post("x");
        assert_eq!(cx.outputs().len(), 2);
        let outputs = cx.into_outputs();
        assert_eq!(outputs[0].0, 1);
        assert_eq!(outputs[1].1, vec![Atom::bang()]);
        assert_eq!(console.len(), 1);
    }
}
