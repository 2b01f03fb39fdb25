//! Property-based tests for chain compilation.
//!
//! Random topologies, acyclic and cyclic, must always compile to an order
//! that covers every processor exactly once and respects every connection
//! that is not delayed.

use proptest::prelude::*;
use patchbay_dsp::{
    Binding, Buffer, Chain, Connection, ConnectionId, PrepareInfo, Processor, ProcessorError,
    ProcessorId,
};

struct Pass;

impl Processor for Pass {
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
        output.channel_mut(0).copy_from(input.channel(0));
    }
}

/// Builds a chain of `n` processors with the given (from, to) pairs,
/// skipping duplicates. Returns the chain, ids, and accepted connections.
fn build(
    n: usize,
    pairs: &[(usize, usize)],
) -> (Chain, Vec<ProcessorId>, Vec<(ConnectionId, Connection)>) {
    let mut chain = Chain::new();
    let ids: Vec<_> = (0..n)
        .map(|_| chain.add_processor(Box::new(Pass)).unwrap())
        .collect();
    let mut accepted = Vec::new();
    for &(from, to) in pairs {
        let c = Connection::new(ids[from % n], 0, ids[to % n], 0);
        if let Ok(id) = chain.add_connection(c) {
            accepted.push((id, c));
        }
    }
    (chain, ids, accepted)
}

fn position(order: &[ProcessorId], id: ProcessorId) -> usize {
    order.iter().position(|p| *p == id).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Connections only go from lower to higher index: no cycles, nothing delayed,
    /// every producer precedes its consumer.
    #[test]
    fn acyclic_order_respects_connections(
        n in 1usize..12,
        pairs in prop::collection::vec((0usize..12, 0usize..12), 0..40),
    ) {
        let forward: Vec<_> = pairs
            .into_iter()
            .map(|(a, b)| (a % n, b % n))
            .filter(|(a, b)| a < b)
            .collect();
        let (mut chain, ids, accepted) = build(n, &forward);
        let report = chain.compile(48000.0, 8).unwrap();

        prop_assert_eq!(report.order.len(), ids.len());
        prop_assert!(report.delayed.is_empty());
        for (_, c) in &accepted {
            prop_assert!(position(&report.order, c.source) < position(&report.order, c.dest));
        }
    }

    /// Arbitrary graphs (cycles and self loops included) always compile, and
    /// every connection that is not delayed is respected by the order.
    #[test]
    fn cyclic_graphs_compile_and_tick(
        n in 1usize..10,
        pairs in prop::collection::vec((0usize..10, 0usize..10), 0..40),
    ) {
        let (mut chain, ids, accepted) = build(n, &pairs);
        let report = chain.compile(48000.0, 8).unwrap();

        let mut sorted = report.order.clone();
        sorted.sort();
        prop_assert_eq!(sorted, ids);

        for (id, c) in &accepted {
            if report.delayed.contains(id) {
                // A delayed connection never points forward.
                prop_assert!(position(&report.order, c.dest) <= position(&report.order, c.source));
            } else {
                prop_assert!(position(&report.order, c.source) < position(&report.order, c.dest));
            }
        }

        for _ in 0..4 {
            chain.tick();
        }
        chain.release();
        prop_assert!(!chain.is_compiled());
    }
}
