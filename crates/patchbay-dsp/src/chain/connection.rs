//! Identifiers and connection types for the DSP chain.

/// Identifier of a processor inside a [`Chain`](super::Chain).
///
/// Assigned sequentially and never reused within a chain, so the raw index
/// doubles as the processor's insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessorId(pub(crate) u32);

impl ProcessorId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ProcessorId({})", self.0)
    }
}

/// Identifier of a connection inside a [`Chain`](super::Chain).
///
/// Assigned sequentially and never reused within a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub(crate) u32);

impl ConnectionId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// A directed signal connection `(source, outlet) → (dest, inlet)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Producing processor.
    pub source: ProcessorId,
    /// Outlet index on the producer.
    pub outlet: usize,
    /// Consuming processor.
    pub dest: ProcessorId,
    /// Inlet index on the consumer.
    pub inlet: usize,
}

impl Connection {
    /// Creates a connection.
    pub fn new(source: ProcessorId, outlet: usize, dest: ProcessorId, inlet: usize) -> Self {
        Self {
            source,
            outlet,
            dest,
            inlet,
        }
    }
}
