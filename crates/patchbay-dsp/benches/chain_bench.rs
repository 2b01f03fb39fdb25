//! Criterion benchmarks for the patchbay DSP chain.
//!
//! Measures chain overhead independently of DSP cost using a trivial `Gain`
//! processor. Two axes:
//!
//! - **Compile**: cycle detection, topological sort and prepare
//! - **Tick**: per-block throughput at varying vector sizes
//!
//! Run with: `cargo bench -p patchbay-dsp -- chain/`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use patchbay_dsp::{
    Binding, Buffer, Chain, Connection, PrepareInfo, Processor, ProcessorError,
};

const SAMPLE_RATE: f32 = 48000.0;
const VECTOR_SIZE: usize = 64;
const VECTOR_SIZES: &[usize] = &[16, 64, 256, 1024];

// ---------------------------------------------------------------------------
// Trivial Gain processor
// ---------------------------------------------------------------------------

/// Multiplies inlet 0 by a constant.
struct Gain(f32);

impl Processor for Gain {
    fn inputs(&self) -> usize {
        1
    }

    fn outputs(&self) -> usize {
        1
    }

    fn prepare(&mut self, _info: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
        Ok(Binding::Bound)
    }

    fn perform(&mut self, input: &Buffer, output: &mut Buffer) {
        let gain = self.0;
        for (o, i) in output
            .channel_mut(0)
            .as_mut_slice()
            .iter_mut()
            .zip(input.channel(0).as_slice())
        {
            *o = *i * gain;
        }
    }
}

// ---------------------------------------------------------------------------
// Chain constructors
// ---------------------------------------------------------------------------

fn make_linear(n: usize) -> Chain {
    let mut chain = Chain::new();
    let mut prev = None;
    for _ in 0..n {
        let node = chain.add_processor(Box::new(Gain(0.9))).unwrap();
        if let Some(p) = prev {
            chain.add_connection(Connection::new(p, 0, node, 0)).unwrap();
        }
        prev = Some(node);
    }
    chain
}

/// A linear chain plus a two-processor feedback loop.
fn make_feedback(n: usize) -> Chain {
    let mut chain = make_linear(n);
    let first = chain.add_processor(Box::new(Gain(0.5))).unwrap();
    let last = chain.add_processor(Box::new(Gain(0.5))).unwrap();
    chain.add_connection(Connection::new(first, 0, last, 0)).unwrap();
    chain.add_connection(Connection::new(last, 0, first, 0)).unwrap();
    chain
}

// ---------------------------------------------------------------------------
// Compile benchmarks
// ---------------------------------------------------------------------------

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain/compile");

    for n in [5usize, 20, 100] {
        group.bench_with_input(BenchmarkId::new("linear", n), &n, |b, &n| {
            b.iter(|| {
                let mut chain = make_linear(n);
                black_box(chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap());
            });
        });
    }

    group.bench_function("feedback_20", |b| {
        b.iter(|| {
            let mut chain = make_feedback(20);
            black_box(chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap());
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Tick benchmarks
// ---------------------------------------------------------------------------

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain/tick");

    for &size in VECTOR_SIZES {
        let mut chain = make_linear(20);
        chain.compile(SAMPLE_RATE, size).unwrap();
        group.bench_with_input(BenchmarkId::new("linear_20", size), &size, |b, _| {
            b.iter(|| {
                chain.tick();
                black_box(&chain);
            });
        });
    }

    let mut chain = make_feedback(20);
    chain.compile(SAMPLE_RATE, VECTOR_SIZE).unwrap();
    group.bench_function("feedback_20", |b| {
        b.iter(|| {
            chain.tick();
            black_box(&chain);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_tick);
criterion_main!(benches);
