//! The audio bus shared by `adc~`/`dac~` processors and the audio driver.
//!
//! Per block the driver writes the hardware inputs, runs the chain and then
//! takes the outputs:
//!
//! ```text
//! driver: write_input(..) ──▶ AudioRunner::process_block() ──▶ take_outputs()
//!                            adc~ reads inputs, dac~ sums into outputs
//! ```
//!
//! Only the audio side locks the bus, so the document thread never contends
//! with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use patchbay_dsp::{Sample, Signal};

#[derive(Debug, Default)]
struct Channels {
    inputs: Vec<Signal>,
    outputs: Vec<Signal>,
}

/// Hardware-facing input and output channels.
#[derive(Debug, Clone)]
pub struct AudioBus {
    channels: Arc<Mutex<Channels>>,
    running: Arc<AtomicBool>,
    vector_size: usize,
}

impl AudioBus {
    /// Creates a bus with the given channel counts and block length.
    pub fn new(inputs: usize, outputs: usize, vector_size: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(Channels {
                inputs: (0..inputs).map(|_| Signal::new(vector_size)).collect(),
                outputs: (0..outputs).map(|_| Signal::new(vector_size)).collect(),
            })),
            running: Arc::new(AtomicBool::new(true)),
            vector_size,
        }
    }

    /// Returns the number of input channels.
    pub fn input_count(&self) -> usize {
        self.channels.lock().inputs.len()
    }

    /// Returns the number of output channels.
    pub fn output_count(&self) -> usize {
        self.channels.lock().outputs.len()
    }

    /// Returns the block length.
    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    /// Returns true while DSP is switched on.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Switches DSP on or off.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    // --- Driver side ---

    /// Stores one block of hardware input. Unknown channels are ignored.
    pub fn write_input(&self, channel: usize, samples: &[Sample]) {
        let mut channels = self.channels.lock();
        if let Some(signal) = channels.inputs.get_mut(channel) {
            signal.copy_from(&Signal::from(samples.to_vec()));
        }
    }

    /// Returns the summed output of the last block and zeroes it.
    pub fn take_outputs(&self) -> Vec<Signal> {
        let mut channels = self.channels.lock();
        let taken = channels.outputs.clone();
        for signal in &mut channels.outputs {
            signal.clear();
        }
        taken
    }

    // --- Processor side ---

    /// Copies input `channel` into `out`, or silence if it does not exist.
    pub fn read_input(&self, channel: usize, out: &mut Signal) {
        let channels = self.channels.lock();
        match channels.inputs.get(channel) {
            Some(signal) => out.copy_from(signal),
            None => out.clear(),
        }
    }

    /// Adds `signal` into output `channel`. Unknown channels are ignored.
    pub fn accumulate_output(&self, channel: usize, signal: &Signal) {
        let mut channels = self.channels.lock();
        if let Some(out) = channels.outputs.get_mut(channel) {
            out.accumulate_from(signal);
        }
    }
}
