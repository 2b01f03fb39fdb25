//! Audio interface objects: `adc~` and `dac~`.
//!
//! Both take channel routes as arguments. A route is a 1-based channel number
//! (`dac~ 1 2`) or an inclusive range (`adc~ 1:4`, `adc~ 4:1` for reversed
//! order). Without arguments the routes are channels 1 and 2.

use patchbay_dsp::{Binding, Buffer, PrepareInfo, Processor, ProcessorError};

use crate::atom::Atom;
use crate::audio::AudioBus;
use crate::error::ArgumentError;
use crate::object::{Context, Object, PinKind};

/// Highest channel number, and most routes, one audio object accepts.
pub const MAX_CHANNELS: usize = 512;

/// Parses channel routes into 0-based channel indices.
pub fn parse_channel_routes(args: &[Atom]) -> Result<Vec<usize>, ArgumentError> {
    let too_many = ArgumentError::TooManyChannels { max: MAX_CHANNELS };
    let mut routes = Vec::new();
    for arg in args {
        match arg {
            Atom::Int(_) | Atom::Float(_) => {
                let channel = arg.as_int().unwrap_or(0);
                if channel <= 0 {
                    return Err(ArgumentError::NonPositiveChannel);
                }
                if channel as usize > MAX_CHANNELS {
                    return Err(too_many);
                }
                routes.push(channel as usize - 1);
            }
            Atom::Symbol(range) => {
                let (left, right) = range.split_once(':').ok_or(ArgumentError::ChannelRoute)?;
                let parse = |s: &str| {
                    s.trim()
                        .parse::<i64>()
                        .map_err(|_| ArgumentError::ChannelRoute)
                };
                let (left, right) = (parse(left)?, parse(right)?);
                if left <= 0 || right <= 0 {
                    return Err(ArgumentError::NonPositiveChannel);
                }
                if left.max(right) as usize > MAX_CHANNELS {
                    return Err(too_many);
                }
                let (left, right) = (left as usize - 1, right as usize - 1);
                if left <= right {
                    routes.extend(left..=right);
                } else {
                    routes.extend((right..=left).rev());
                }
            }
        }
    }
    if routes.len() > MAX_CHANNELS {
        return Err(too_many);
    }
    if routes.is_empty() {
        routes = vec![0, 1];
    }
    Ok(routes)
}

/// Switches DSP on `start`, off on `stop`.
fn dsp_switch(class: &str, message: &[Atom], cx: &mut Context<'_>) {
    let running = match message.first().and_then(Atom::as_symbol) {
        Some("start") => true,
        Some("stop") => false,
        _ => {
            cx.console()
                .warning(format!("{class}: expects \"start\" or \"stop\""));
            return;
        }
    };
    match cx.audio() {
        Some(bus) => bus.set_running(running),
        None => cx.console().warning(format!("{class}: no audio interface")),
    }
}

// --- adc~ ---

/// Reads hardware inputs; one signal outlet per route.
pub struct AdcTilde {
    routes: Vec<usize>,
    outlets: Vec<PinKind>,
}

impl AdcTilde {
    /// Constructor for `adc~`.
    pub fn create(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        let routes = parse_channel_routes(args)?;
        Ok(Box::new(Self {
            outlets: vec![PinKind::Signal; routes.len()],
            routes,
        }))
    }
}

impl Object for AdcTilde {
    fn inlets(&self) -> &[PinKind] {
        &[PinKind::Control]
    }

    fn outlets(&self) -> &[PinKind] {
        &self.outlets
    }

    fn receive(&mut self, _inlet: usize, message: &[Atom], cx: &mut Context<'_>) {
        dsp_switch("adc~", message, cx);
    }

    fn processor(&self, bus: &AudioBus) -> Option<Box<dyn Processor>> {
        Some(Box::new(AdcProcessor {
            routes: self.routes.clone(),
            bus: bus.clone(),
        }))
    }
}

struct AdcProcessor {
    routes: Vec<usize>,
    bus: AudioBus,
}

impl Processor for AdcProcessor {
    fn inputs(&self) -> usize {
        0
    }

    fn outputs(&self) -> usize {
        self.routes.len()
    }

    fn prepare(&mut self, _info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
        Ok(Binding::Bound)
    }

    fn perform(&mut self, _input: &Buffer, output: &mut Buffer) {
        for (i, &channel) in self.routes.iter().enumerate() {
            self.bus.read_input(channel, output.channel_mut(i));
        }
    }

    fn name(&self) -> &str {
        "adc~"
    }
}

// --- dac~ ---

/// Sums its signal inlets into hardware outputs; one inlet per route.
pub struct DacTilde {
    routes: Vec<usize>,
    inlets: Vec<PinKind>,
}

impl DacTilde {
    /// Constructor for `dac~`.
    pub fn create(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        let routes = parse_channel_routes(args)?;
        Ok(Box::new(Self {
            inlets: vec![PinKind::Signal; routes.len()],
            routes,
        }))
    }
}

impl Object for DacTilde {
    fn inlets(&self) -> &[PinKind] {
        &self.inlets
    }

    fn outlets(&self) -> &[PinKind] {
        &[]
    }

    fn receive(&mut self, _inlet: usize, message: &[Atom], cx: &mut Context<'_>) {
        dsp_switch("dac~", message, cx);
    }

    fn processor(&self, bus: &AudioBus) -> Option<Box<dyn Processor>> {
        Some(Box::new(DacProcessor {
            routes: self.routes.clone(),
            bus: bus.clone(),
        }))
    }
}

struct DacProcessor {
    routes: Vec<usize>,
    bus: AudioBus,
}

impl Processor for DacProcessor {
    fn inputs(&self) -> usize {
        self.routes.len()
    }

    fn outputs(&self) -> usize {
        0
    }

    fn prepare(&mut self, info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
        if info.inputs.iter().any(|&c| c) {
            Ok(Binding::Bound)
        } else {
            Ok(Binding::Unbound)
        }
    }

    fn perform(&mut self, input: &Buffer, _output: &mut Buffer) {
        for (i, &channel) in self.routes.iter().enumerate() {
            self.bus.accumulate_output(channel, input.channel(i));
        }
    }

    fn name(&self) -> &str {
        "dac~"
    }
}
