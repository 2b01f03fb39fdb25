//! DSP chain: mutation API, compilation and block execution.
//!
//! A [`Chain`] alternates between two states:
//!
//! - **editing**: processors and connections may be added or removed;
//! - **compiled**: the topology is frozen, processors are prepared, and
//!   [`tick()`](Chain::tick) runs one block of every active processor.
//!
//! [`release()`](Chain::release) goes back from compiled to editing. Mutating
//! a compiled chain fails with [`ChainError::InvalidState`].

use thiserror::Error;

use crate::processor::{Binding, PrepareInfo, Processor, ProcessorError};
use crate::signal::Buffer;

use super::connection::{Connection, ConnectionId, ProcessorId};
use super::schedule::{self, Edge, Feed, Schedule, Step};

/// Errors that can occur during chain operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    /// The operation is not allowed in the chain's current state.
    #[error("invalid chain state: {0}")]
    InvalidState(&'static str),
    /// The specified processor was not found in the chain.
    #[error("processor {0} not found")]
    ProcessorNotFound(ProcessorId),
    /// The specified connection was not found in the chain.
    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),
    /// The outlet index exceeds the producer's outlet count.
    #[error("outlet {outlet} out of range for {processor} ({count} outlets)")]
    OutletOutOfRange {
        /// Producing processor.
        processor: ProcessorId,
        /// Requested outlet.
        outlet: usize,
        /// Declared outlet count.
        count: usize,
    },
    /// The inlet index exceeds the consumer's inlet count.
    #[error("inlet {inlet} out of range for {processor} ({count} inlets)")]
    InletOutOfRange {
        /// Consuming processor.
        processor: ProcessorId,
        /// Requested inlet.
        inlet: usize,
        /// Declared inlet count.
        count: usize,
    },
    /// An identical connection already exists.
    #[error("connection {0:?} already exists")]
    DuplicateConnection(Connection),
    /// The vector size must be non-zero.
    #[error("invalid vector size {0}")]
    InvalidVectorSize(usize),
    /// The sample rate must be finite and positive.
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(f32),
}

/// Lifecycle of one processor within the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Not prepared (chain is editing).
    Inert,
    /// Prepared and bound; runs every tick.
    Active,
    /// Prepared but declined to bind; skipped.
    Inactive,
    /// `prepare()` failed; skipped until the next compilation.
    Failed,
}

/// Summary of a compilation, for logging and console reporting.
#[derive(Debug, Default)]
pub struct CompileReport {
    /// Active processors in execution order.
    pub order: Vec<ProcessorId>,
    /// Connections read with a one-block delay to break cycles.
    pub delayed: Vec<ConnectionId>,
    /// Processors that prepared but declined to bind.
    pub inactive: Vec<ProcessorId>,
    /// Processors whose `prepare()` failed, with the error.
    pub failed: Vec<(ProcessorId, ProcessorError)>,
}

struct Node {
    processor: Box<dyn Processor>,
    inputs: Buffer,
    outputs: Buffer,
    state: ProcessorState,
    incoming: Vec<ConnectionId>,
    outgoing: Vec<ConnectionId>,
}

/// Owns the processors and connections of one audio-graph generation.
///
/// # Usage
///
/// 1. Create with [`new()`](Self::new)
/// 2. Add processors and connections
/// 3. [`compile()`](Self::compile) with the sample rate and vector size
/// 4. Call [`tick()`](Self::tick) once per block
/// 5. [`release()`](Self::release) before editing again
pub struct Chain {
    nodes: Vec<Option<Node>>,
    connections: Vec<Option<Connection>>,
    schedule: Option<Schedule>,
    sample_rate: f32,
    vector_size: usize,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// Creates an empty, editable chain.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            connections: Vec::new(),
            schedule: None,
            sample_rate: 0.0,
            vector_size: 0,
        }
    }

    // --- Mutations ---

    /// Adds a processor and returns its identifier.
    pub fn add_processor(
        &mut self,
        processor: Box<dyn Processor>,
    ) -> Result<ProcessorId, ChainError> {
        self.ensure_editing("cannot add a processor to a compiled chain")?;
        let id = ProcessorId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            processor,
            inputs: Buffer::default(),
            outputs: Buffer::default(),
            state: ProcessorState::Inert,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }));
        #[cfg(feature = "tracing")]
        tracing::debug!("chain_add: processor {id}");
        Ok(id)
    }

    /// Removes a processor along with every connection touching it.
    pub fn remove_processor(&mut self, id: ProcessorId) -> Result<Box<dyn Processor>, ChainError> {
        self.ensure_editing("cannot remove a processor from a compiled chain")?;
        let node = self.node(id)?;
        let attached: Vec<ConnectionId> = node
            .incoming
            .iter()
            .chain(node.outgoing.iter())
            .copied()
            .collect();
        for connection in attached {
            self.disconnect_internal(connection);
        }
        let node = self.nodes[id.0 as usize]
            .take()
            .ok_or(ChainError::ProcessorNotFound(id))?;
        #[cfg(feature = "tracing")]
        tracing::debug!("chain_remove: processor {id}");
        Ok(node.processor)
    }

    /// Adds a connection, validating both endpoints and port indices.
    pub fn add_connection(&mut self, connection: Connection) -> Result<ConnectionId, ChainError> {
        self.ensure_editing("cannot connect processors of a compiled chain")?;

        let outlets = self.node(connection.source)?.processor.outputs();
        if connection.outlet >= outlets {
            return Err(ChainError::OutletOutOfRange {
                processor: connection.source,
                outlet: connection.outlet,
                count: outlets,
            });
        }
        let inlets = self.node(connection.dest)?.processor.inputs();
        if connection.inlet >= inlets {
            return Err(ChainError::InletOutOfRange {
                processor: connection.dest,
                inlet: connection.inlet,
                count: inlets,
            });
        }
        if self.connections.iter().flatten().any(|c| *c == connection) {
            return Err(ChainError::DuplicateConnection(connection));
        }

        let id = ConnectionId(self.connections.len() as u32);
        self.connections.push(Some(connection));
        if let Some(Some(node)) = self.nodes.get_mut(connection.source.0 as usize) {
            node.outgoing.push(id);
        }
        if let Some(Some(node)) = self.nodes.get_mut(connection.dest.0 as usize) {
            node.incoming.push(id);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "chain_connect: {}:{} → {}:{}",
            connection.source,
            connection.outlet,
            connection.dest,
            connection.inlet
        );
        Ok(id)
    }

    /// Removes a connection.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<Connection, ChainError> {
        self.ensure_editing("cannot disconnect processors of a compiled chain")?;
        let connection = self
            .connections
            .get(id.0 as usize)
            .copied()
            .flatten()
            .ok_or(ChainError::ConnectionNotFound(id))?;
        self.disconnect_internal(id);
        Ok(connection)
    }

    // --- Compilation ---

    /// Prepares every processor and freezes the evaluation order.
    ///
    /// Processors are prepared in dependency order over the whole topology.
    /// The execution order is then resolved again over the processors that
    /// bound a perform routine, so inactive processors neither run nor feed
    /// anyone. A processor whose `prepare()` fails is reported and skipped; it
    /// never aborts the compilation.
    pub fn compile(
        &mut self,
        sample_rate: f32,
        vector_size: usize,
    ) -> Result<CompileReport, ChainError> {
        self.ensure_editing("chain is already compiled")?;
        if vector_size == 0 {
            return Err(ChainError::InvalidVectorSize(vector_size));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(ChainError::InvalidSampleRate(sample_rate));
        }
        self.sample_rate = sample_rate;
        self.vector_size = vector_size;

        let members: Vec<usize> = self.live_slots().collect();
        let all_edges = self.edges(|_| true);
        let prepare_order = schedule::resolve(self.nodes.len(), &members, &all_edges).order;

        let mut report = CompileReport::default();
        let mut prepared = Vec::with_capacity(prepare_order.len());
        for &slot in &prepare_order {
            let connectivity = self.inlet_connectivity(slot);
            let Some(node) = self.nodes[slot].as_mut() else {
                continue;
            };
            let info = PrepareInfo {
                sample_rate,
                vector_size,
                inputs: &connectivity,
            };
            let id = ProcessorId(slot as u32);
            match node.processor.prepare(&info) {
                Ok(Binding::Bound) => {
                    node.state = ProcessorState::Active;
                    node.inputs.resize(node.processor.inputs(), vector_size);
                    node.outputs.resize(node.processor.outputs(), vector_size);
                    node.inputs.clear();
                    node.outputs.clear();
                    prepared.push(slot);
                }
                Ok(Binding::Unbound) => {
                    node.state = ProcessorState::Inactive;
                    prepared.push(slot);
                    report.inactive.push(id);
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(processor = %id, error = %err, "prepare failed");
                    node.state = ProcessorState::Failed;
                    report.failed.push((id, err));
                }
            }
        }

        let active: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&slot| self.state_of(slot) == ProcessorState::Active)
            .collect();
        let active_edges = self.edges(|slot| self.state_of(slot) == ProcessorState::Active);
        let resolution = schedule::resolve(self.nodes.len(), &active, &active_edges);

        let steps = resolution
            .order
            .iter()
            .map(|&slot| Step {
                slot,
                feeds: active_edges
                    .iter()
                    .filter(|e| e.to == slot)
                    .filter_map(|e| self.connections[e.id.0 as usize])
                    .map(|c| Feed {
                        source: c.source.0 as usize,
                        outlet: c.outlet,
                        inlet: c.inlet,
                    })
                    .collect(),
            })
            .collect();

        report.order = resolution
            .order
            .iter()
            .map(|&slot| ProcessorId(slot as u32))
            .collect();
        report.delayed.clone_from(&resolution.delayed);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            active = report.order.len(),
            inactive = report.inactive.len(),
            failed = report.failed.len(),
            delayed = report.delayed.len(),
            "chain compiled"
        );

        self.schedule = Some(Schedule {
            steps,
            prepared,
            delayed: resolution.delayed,
        });
        Ok(report)
    }

    // --- Execution ---

    /// Runs one block of every active processor in schedule order.
    ///
    /// Each inlet receives the sum of every connection into it. Does nothing
    /// when the chain is not compiled.
    pub fn tick(&mut self) {
        let Some(schedule) = self.schedule.as_ref() else {
            return;
        };
        for step in &schedule.steps {
            let Some(node) = self.nodes[step.slot].as_mut() else {
                continue;
            };
            let mut inputs = core::mem::take(&mut node.inputs);
            inputs.clear();
            for feed in &step.feeds {
                let signal = self
                    .nodes
                    .get(feed.source)
                    .and_then(|n| n.as_ref())
                    .and_then(|n| n.outputs.get(feed.outlet));
                if let Some(signal) = signal {
                    inputs.channel_mut(feed.inlet).accumulate_from(signal);
                }
            }
            if let Some(node) = self.nodes[step.slot].as_mut() {
                node.outputs.clear();
                node.processor.perform(&inputs, &mut node.outputs);
                node.inputs = inputs;
            }
        }
    }

    /// Releases every prepared processor in reverse prepare order and returns
    /// the chain to the editing state. Calling it again is a no-op.
    pub fn release(&mut self) {
        let Some(schedule) = self.schedule.take() else {
            return;
        };
        for &slot in schedule.prepared.iter().rev() {
            if let Some(node) = self.nodes[slot].as_mut() {
                node.processor.release();
            }
        }
        for node in self.nodes.iter_mut().flatten() {
            node.state = ProcessorState::Inert;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("chain released");
    }

    // --- Queries ---

    /// Returns true if the chain is compiled.
    pub fn is_compiled(&self) -> bool {
        self.schedule.is_some()
    }

    /// Returns the compiled schedule, if any.
    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    /// Returns the number of processors.
    pub fn processor_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Returns the number of connections.
    pub fn connection_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_some()).count()
    }

    /// Returns the lifecycle state of a processor.
    pub fn processor_state(&self, id: ProcessorId) -> Option<ProcessorState> {
        self.nodes
            .get(id.0 as usize)
            .and_then(|n| n.as_ref())
            .map(|n| n.state)
    }

    /// Returns a processor by identifier.
    pub fn processor(&self, id: ProcessorId) -> Option<&dyn Processor> {
        self.nodes
            .get(id.0 as usize)
            .and_then(|n| n.as_ref())
            .map(|n| n.processor.as_ref())
    }

    /// Returns the output buffer written by a processor during the last tick.
    pub fn output(&self, id: ProcessorId) -> Option<&Buffer> {
        self.nodes
            .get(id.0 as usize)
            .and_then(|n| n.as_ref())
            .map(|n| &n.outputs)
    }

    /// Returns a connection by identifier.
    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.get(id.0 as usize).copied().flatten()
    }

    /// Returns the sample rate of the last compilation.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Returns the vector size of the last compilation.
    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    // --- Internal helpers ---

    fn ensure_editing(&self, reason: &'static str) -> Result<(), ChainError> {
        if self.schedule.is_some() {
            #[cfg(feature = "tracing")]
            tracing::error!(reason, "chain misuse");
            return Err(ChainError::InvalidState(reason));
        }
        Ok(())
    }

    fn node(&self, id: ProcessorId) -> Result<&Node, ChainError> {
        self.nodes
            .get(id.0 as usize)
            .and_then(|n| n.as_ref())
            .ok_or(ChainError::ProcessorNotFound(id))
    }

    fn state_of(&self, slot: usize) -> ProcessorState {
        self.nodes[slot]
            .as_ref()
            .map_or(ProcessorState::Inert, |n| n.state)
    }

    fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| i)
    }

    /// Collects live connections whose endpoints both satisfy `keep`.
    fn edges(&self, keep: impl Fn(usize) -> bool) -> Vec<Edge> {
        self.connections
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let c = c.as_ref()?;
                let (from, to) = (c.source.0 as usize, c.dest.0 as usize);
                (keep(from) && keep(to)).then_some(Edge {
                    id: ConnectionId(i as u32),
                    from,
                    to,
                })
            })
            .collect()
    }

    fn inlet_connectivity(&self, slot: usize) -> Vec<bool> {
        let Some(node) = self.nodes[slot].as_ref() else {
            return Vec::new();
        };
        let mut connected = vec![false; node.processor.inputs()];
        for id in &node.incoming {
            let inlet = self.connection(*id).map(|c| c.inlet);
            if let Some(flag) = inlet.and_then(|i| connected.get_mut(i)) {
                *flag = true;
            }
        }
        connected
    }

    fn disconnect_internal(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get_mut(id.0 as usize).and_then(Option::take)
        else {
            return;
        };
        if let Some(Some(node)) = self.nodes.get_mut(connection.source.0 as usize) {
            node.outgoing.retain(|c| *c != id);
        }
        if let Some(Some(node)) = self.nodes.get_mut(connection.dest.0 as usize) {
            node.incoming.retain(|c| *c != id);
        }
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Passes inlet 0 through, adding a constant.
    struct Offset {
        inputs: usize,
        amount: f32,
    }

    impl Processor for Offset {
        fn inputs(&self) -> usize {
            self.inputs
        }
        fn outputs(&self) -> usize {
            1
        }
        fn prepare(&mut self, _: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
            Ok(Binding::Bound)
        }
        fn perform(&mut self, input: &Buffer, output: &mut Buffer) {
            let out = output.channel_mut(0).as_mut_slice();
            for (i, o) in out.iter_mut().enumerate() {
                let inp = if self.inputs > 0 {
                    input.channel(0).get(i)
                } else {
                    0.0
                };
                *o = inp + self.amount;
            }
        }
    }

    fn offset(inputs: usize, amount: f32) -> Box<dyn Processor> {
        Box::new(Offset { inputs, amount })
    }

    /// Always declines to bind.
    struct Silent;

    impl Processor for Silent {
        fn inputs(&self) -> usize {
            1
        }
        fn outputs(&self) -> usize {
            1
        }
        fn prepare(&mut self, _: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
            Ok(Binding::Unbound)
        }
        fn perform(&mut self, _: &Buffer, _: &mut Buffer) {
            unreachable!("unbound processors never perform");
        }
    }

    /// Fails to prepare.
    struct Broken;

    impl Processor for Broken {
        fn inputs(&self) -> usize {
            0
        }
        fn outputs(&self) -> usize {
            1
        }
        fn prepare(&mut self, _: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
            Err(ProcessorError::Prepare("boom".into()))
        }
        fn perform(&mut self, _: &Buffer, _: &mut Buffer) {
            unreachable!("failed processors never perform");
        }
    }

    /// Counts releases.
    struct Counted(Arc<AtomicUsize>);

    impl Processor for Counted {
        fn inputs(&self) -> usize {
            0
        }
        fn outputs(&self) -> usize {
            0
        }
        fn prepare(&mut self, _: &PrepareInfo<'_>) -> Result<Binding, ProcessorError> {
            Ok(Binding::Bound)
        }
        fn perform(&mut self, _: &Buffer, _: &mut Buffer) {}
        fn release(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_processors_and_connect() {
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        let b = chain.add_processor(offset(1, 1.0)).unwrap();
        chain.add_connection(Connection::new(a, 0, b, 0)).unwrap();
        assert_eq!(chain.processor_count(), 2);
        assert_eq!(chain.connection_count(), 1);
    }

    #[test]
    fn test_out_of_range_ports_rejected() {
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        let b = chain.add_processor(offset(1, 1.0)).unwrap();
        assert!(matches!(
            chain.add_connection(Connection::new(a, 1, b, 0)),
            Err(ChainError::OutletOutOfRange { outlet: 1, count: 1, .. })
        ));
        assert!(matches!(
            chain.add_connection(Connection::new(a, 0, b, 3)),
            Err(ChainError::InletOutOfRange { inlet: 3, count: 1, .. })
        ));
        assert_eq!(chain.connection_count(), 0);
    }

    #[test]
    fn test_unknown_processor_rejected() {
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        let ghost = ProcessorId(42);
        assert_eq!(
            chain.add_connection(Connection::new(a, 0, ghost, 0)),
            Err(ChainError::ProcessorNotFound(ghost))
        );
    }

    #[test]
    fn test_duplicate_connection_rejected() {
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        let b = chain.add_processor(offset(1, 1.0)).unwrap();
        let c = Connection::new(a, 0, b, 0);
        chain.add_connection(c).unwrap();
        assert_eq!(
            chain.add_connection(c),
            Err(ChainError::DuplicateConnection(c))
        );
    }

    #[test]
    fn test_mutating_compiled_chain_fails() {
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        chain.compile(48000.0, 64).unwrap();
        assert!(matches!(
            chain.add_processor(offset(0, 1.0)),
            Err(ChainError::InvalidState(_))
        ));
        assert!(matches!(
            chain.add_connection(Connection::new(a, 0, a, 0)),
            Err(ChainError::InvalidState(_))
        ));
        assert!(matches!(
            chain.compile(48000.0, 64),
            Err(ChainError::InvalidState(_))
        ));
        chain.release();
        assert!(chain.add_processor(offset(0, 1.0)).is_ok());
    }

    #[test]
    fn test_compile_rejects_bad_settings() {
        let mut chain = Chain::new();
        assert_eq!(
            chain.compile(48000.0, 0).unwrap_err(),
            ChainError::InvalidVectorSize(0)
        );
        assert!(matches!(
            chain.compile(0.0, 64),
            Err(ChainError::InvalidSampleRate(_))
        ));
        assert!(!chain.is_compiled());
    }

    #[test]
    fn test_tick_linear_chain() {
        let mut chain = Chain::new();
        let b = chain.add_processor(offset(1, 2.0)).unwrap();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        chain.add_connection(Connection::new(a, 0, b, 0)).unwrap();
        let report = chain.compile(48000.0, 4).unwrap();
        assert_eq!(report.order, vec![a, b]);
        chain.tick();
        assert_eq!(chain.output(b).unwrap().channel(0).as_slice(), &[3.0; 4]);
    }

    #[test]
    fn test_fan_in_sums() {
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        let b = chain.add_processor(offset(0, 0.5)).unwrap();
        let sum = chain.add_processor(offset(1, 0.0)).unwrap();
        chain.add_connection(Connection::new(a, 0, sum, 0)).unwrap();
        chain.add_connection(Connection::new(b, 0, sum, 0)).unwrap();
        chain.compile(48000.0, 8).unwrap();
        chain.tick();
        assert_eq!(chain.output(sum).unwrap().channel(0).get(0), 1.5);
    }

    #[test]
    fn test_unbound_processor_is_skipped_and_silent() {
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        let s = chain.add_processor(Box::new(Silent)).unwrap();
        let b = chain.add_processor(offset(1, 0.0)).unwrap();
        chain.add_connection(Connection::new(a, 0, s, 0)).unwrap();
        chain.add_connection(Connection::new(s, 0, b, 0)).unwrap();
        let report = chain.compile(48000.0, 4).unwrap();
        assert_eq!(report.inactive, vec![s]);
        assert_eq!(report.order, vec![a, b]);
        assert_eq!(chain.processor_state(s), Some(ProcessorState::Inactive));
        chain.tick();
        assert_eq!(chain.output(b).unwrap().channel(0).get(0), 0.0);
        assert_eq!(chain.processor_count(), 3);
    }

    #[test]
    fn test_failed_prepare_is_isolated() {
        let mut chain = Chain::new();
        let broken = chain.add_processor(Box::new(Broken)).unwrap();
        let ok = chain.add_processor(offset(0, 1.0)).unwrap();
        let report = chain.compile(48000.0, 4).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, broken);
        assert_eq!(report.order, vec![ok]);
        chain.tick();
        assert_eq!(chain.output(ok).unwrap().channel(0).get(0), 1.0);
    }

    #[test]
    fn test_feedback_reads_previous_block() {
        // a (accumulator: in + 1) feeds itself.
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(1, 1.0)).unwrap();
        let loop_id = chain.add_connection(Connection::new(a, 0, a, 0)).unwrap();
        let report = chain.compile(48000.0, 2).unwrap();
        assert_eq!(report.delayed, vec![loop_id]);
        for expected in 1..=5 {
            chain.tick();
            assert_eq!(chain.output(a).unwrap().channel(0).get(0), expected as f32);
        }
    }

    #[test]
    fn test_release_is_idempotent_and_reverse_ordered() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut chain = Chain::new();
        chain
            .add_processor(Box::new(Counted(Arc::clone(&count))))
            .unwrap();
        chain
            .add_processor(Box::new(Counted(Arc::clone(&count))))
            .unwrap();
        chain.compile(44100.0, 32).unwrap();
        chain.release();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        chain.release();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!chain.is_compiled());
    }

    #[test]
    fn test_drop_releases_compiled_chain() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let mut chain = Chain::new();
            chain
                .add_processor(Box::new(Counted(Arc::clone(&count))))
                .unwrap();
            chain.compile(44100.0, 32).unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_processor_drops_connections() {
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        let b = chain.add_processor(offset(1, 1.0)).unwrap();
        let c = chain.add_connection(Connection::new(a, 0, b, 0)).unwrap();
        chain.remove_processor(a).unwrap();
        assert_eq!(chain.connection_count(), 0);
        assert!(chain.connection(c).is_none());
        assert_eq!(
            chain.remove_connection(c).unwrap_err(),
            ChainError::ConnectionNotFound(c)
        );
        let report = chain.compile(48000.0, 4).unwrap();
        assert_eq!(report.order, vec![b]);
    }

    #[test]
    fn test_tick_before_compile_is_noop() {
        let mut chain = Chain::new();
        let a = chain.add_processor(offset(0, 1.0)).unwrap();
        chain.tick();
        assert_eq!(chain.output(a).unwrap().channel_count(), 0);
    }
}
