//! Integration tests for the patchbay DSP chain.
//!
//! Exercises the chain through its public API the way the engine drives it:
//! build, compile, hand to an [`AudioRunner`], tick, swap, release.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use patchbay_dsp::{
    Binding, Buffer, Chain, ChainError, Connection, PrepareInfo, Processor, ProcessorError,
    chain_swap,
};

const SAMPLE_RATE: f32 = 48000.0;
const VECTOR_SIZE: usize = 32;

// ============================================================================
// Test processors
// ============================================================================

type Log = Arc<Mutex<Vec<&'static str>>>;

/// Records its name every time it performs, then copies inlet 0 to outlet 0
/// plus a constant.
struct Tagged {
    tag: &'static str,
    inputs: usize,
    add: f32,
    log: Log,
    released: Arc<AtomicUsize>,
}

impl Tagged {
    fn boxed(tag: &'static str, inputs: usize, add: f32, log: &Log) -> Box<dyn Processor> {
        Box::new(Self {
            tag,
            inputs,
            add,
            log: Arc::clone(log),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl Processor for Tagged {
    fn inputs(&self) -> usize {
        self.inputs
    }

    fn outputs(&self) -> usize {
        1
    }

    fn prepare(&mut self, _info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
        Ok(Binding::Bound)
    }

    fn perform(&mut self, input: &Buffer, output: &mut Buffer) {
        self.log.lock().unwrap().push(self.tag);
        let carry = if self.inputs > 0 {
            input.channel(0).get(0)
        } else {
            0.0
        };
        output.channel_mut(0).fill(carry + self.add);
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        self.tag
    }
}

/// Records the order of prepare and release calls.
struct Lifecycle {
    tag: &'static str,
    inputs: usize,
    events: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl Processor for Lifecycle {
    fn inputs(&self) -> usize {
        self.inputs
    }

    fn outputs(&self) -> usize {
        1
    }

    fn prepare(&mut self, _info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
        self.events.lock().unwrap().push(format!("prepare {}", self.tag));
        if self.fail {
            return Err(ProcessorError::Prepare(self.tag.to_string()));
        }
        Ok(Binding::Bound)
    }

    fn perform(&mut self, _input: &Buffer, _output: &mut Buffer) {}

    fn release(&mut self) {
        self.events.lock().unwrap().push(format!("release {}", self.tag));
    }
}

/// Binds only when its inlet is connected.
struct NeedsInput {
    seen: Arc<Mutex<Vec<bool>>>,
}

impl Processor for NeedsInput {
    fn inputs(&self) -> usize {
        2
    }

    fn outputs(&self) -> usize {
        1
    }

    fn prepare(&mut self, info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
        self.seen.lock().unwrap().extend_from_slice(info.inputs);
        if info.is_input_connected(0) {
            Ok(Binding::Bound)
        } else {
            Ok(Binding::Unbound)
        }
    }

    fn perform(&mut self, _input: &Buffer, _output: &mut Buffer) {}
}

// ============================================================================
// 1. Ordering
// ============================================================================

#[test]
fn producer_runs_before_consumer_across_swaps() {
    let log: Log = Arc::default();
    let (mut swap, mut runner) = chain_swap(4);

    for generation in 0..10 {
        let mut chain = Chain::new();
        // Even generations insert the consumer first, against the data flow.
        let (a, b) = if generation % 2 == 0 {
            let b = chain.add_processor(Tagged::boxed("b", 1, 0.0, &log)).unwrap();
            let a = chain.add_processor(Tagged::boxed("a", 0, 1.0, &log)).unwrap();
            (a, b)
        } else {
            let a = chain.add_processor(Tagged::boxed("a", 0, 1.0, &log)).unwrap();
            let b = chain.add_processor(Tagged::boxed("b", 1, 0.0, &log)).unwrap();
            (a, b)
        };
        assert_eq!(a < b, generation % 2 == 1);
        chain.add_connection(Connection::new(a, 0, b, 0)).unwrap();
        chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap();
        swap.install(chain).unwrap();

        for _ in 0..100 {
            log.lock().unwrap().clear();
            runner.process_block();
            assert_eq!(*log.lock().unwrap(), vec!["a", "b"], "generation {generation}");
        }
        swap.collect_retired();
    }
    assert_eq!(runner.ticks(), 1000);
    assert_eq!(runner.generation(), 10);
}

#[test]
fn diamond_output_sums_both_paths() {
    let log: Log = Arc::default();
    let mut chain = Chain::new();
    let src = chain.add_processor(Tagged::boxed("src", 0, 1.0, &log)).unwrap();
    let left = chain.add_processor(Tagged::boxed("l", 1, 1.0, &log)).unwrap();
    let right = chain.add_processor(Tagged::boxed("r", 1, 2.0, &log)).unwrap();
    let sum = chain.add_processor(Tagged::boxed("sum", 1, 0.0, &log)).unwrap();
    chain.add_connection(Connection::new(src, 0, left, 0)).unwrap();
    chain.add_connection(Connection::new(src, 0, right, 0)).unwrap();
    chain.add_connection(Connection::new(left, 0, sum, 0)).unwrap();
    chain.add_connection(Connection::new(right, 0, sum, 0)).unwrap();

    let report = chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap();
    assert_eq!(report.order, vec![src, left, right, sum]);
    assert!(report.delayed.is_empty());

    chain.tick();
    // (1 + 1) + (1 + 2)
    assert_eq!(chain.output(sum).unwrap().channel(0).get(VECTOR_SIZE - 1), 5.0);
}

// ============================================================================
// 2. Cycles
// ============================================================================

#[test]
fn two_processor_cycle_is_delayed_by_one_block() {
    let log: Log = Arc::default();
    let mut chain = Chain::new();
    let a = chain.add_processor(Tagged::boxed("a", 1, 1.0, &log)).unwrap();
    let b = chain.add_processor(Tagged::boxed("b", 1, 0.0, &log)).unwrap();
    chain.add_connection(Connection::new(a, 0, b, 0)).unwrap();
    let back = chain.add_connection(Connection::new(b, 0, a, 0)).unwrap();

    let report = chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap();
    assert_eq!(report.order, vec![a, b]);
    assert_eq!(report.delayed, vec![back]);

    // a reads b's previous block: 1, 2, 3, ...
    for block in 1..=8 {
        chain.tick();
        assert_eq!(chain.output(a).unwrap().channel(0).get(0), block as f32);
        assert_eq!(chain.output(b).unwrap().channel(0).get(0), block as f32);
    }
}

#[test]
fn cycle_order_is_deterministic() {
    let build = || {
        let log: Log = Arc::default();
        let mut chain = Chain::new();
        let ids: Vec<_> = ["p", "q", "r"]
            .into_iter()
            .map(|t| chain.add_processor(Tagged::boxed(t, 1, 0.0, &log)).unwrap())
            .collect();
        chain.add_connection(Connection::new(ids[2], 0, ids[0], 0)).unwrap();
        chain.add_connection(Connection::new(ids[0], 0, ids[1], 0)).unwrap();
        chain.add_connection(Connection::new(ids[1], 0, ids[2], 0)).unwrap();
        chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap()
    };
    let first = build();
    let second = build();
    assert_eq!(first.order, second.order);
    assert_eq!(first.delayed, second.delayed);
    assert_eq!(first.delayed.len(), 1);
}

// ============================================================================
// 3. Lifecycle
// ============================================================================

#[test]
fn release_runs_in_reverse_prepare_order() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut chain = Chain::new();
    let make = |tag, inputs| {
        Box::new(Lifecycle {
            tag,
            inputs,
            events: Arc::clone(&events),
            fail: false,
        }) as Box<dyn Processor>
    };
    let b = chain.add_processor(make("b", 1)).unwrap();
    let a = chain.add_processor(make("a", 0)).unwrap();
    chain.add_connection(Connection::new(a, 0, b, 0)).unwrap();

    chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap();
    chain.release();
    chain.release();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["prepare a", "prepare b", "release b", "release a"]
    );
}

#[test]
fn failed_prepare_is_not_released() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut chain = Chain::new();
    for (tag, fail) in [("ok", false), ("bad", true)] {
        chain
            .add_processor(Box::new(Lifecycle {
                tag,
                inputs: 0,
                events: Arc::clone(&events),
                fail,
            }))
            .unwrap();
    }
    let report = chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.order.len(), 1);
    drop(chain);

    let events = events.lock().unwrap();
    assert!(events.contains(&"release ok".to_string()));
    assert!(!events.contains(&"release bad".to_string()));
}

#[test]
fn prepare_sees_inlet_connectivity() {
    let log: Log = Arc::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut chain = Chain::new();
    let src = chain.add_processor(Tagged::boxed("src", 0, 1.0, &log)).unwrap();
    let sink = chain
        .add_processor(Box::new(NeedsInput {
            seen: Arc::clone(&seen),
        }))
        .unwrap();
    chain.add_connection(Connection::new(src, 0, sink, 1)).unwrap();

    let report = chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    assert_eq!(report.inactive, vec![sink]);
}

#[test]
fn recompile_after_edit() {
    let log: Log = Arc::default();
    let mut chain = Chain::new();
    let a = chain.add_processor(Tagged::boxed("a", 0, 1.0, &log)).unwrap();
    chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap();

    assert!(matches!(
        chain.add_processor(Tagged::boxed("b", 1, 0.0, &log)),
        Err(ChainError::InvalidState(_))
    ));

    chain.release();
    let b = chain.add_processor(Tagged::boxed("b", 1, 0.0, &log)).unwrap();
    chain.add_connection(Connection::new(a, 0, b, 0)).unwrap();
    let report = chain.compile(SAMPLE_RATE, 64).unwrap();
    assert_eq!(report.order, vec![a, b]);
    chain.tick();
    assert_eq!(chain.output(b).unwrap().vector_size(), 64);
    assert_eq!(chain.output(b).unwrap().channel(0).get(63), 1.0);
}
