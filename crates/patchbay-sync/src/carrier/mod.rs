//! Transport carriers connecting a document manager to a relay.
//!
//! A [`Carrier`] is poll-driven. I/O happens elsewhere (on a transport thread
//! for [`TcpCarrier`], synchronously inside the relay for
//! [`LoopbackCarrier`]); results are queued as [`CarrierEvent`]s that the
//! manager drains on the main thread. Connection state changes are reported
//! only through these events.

mod loopback;
mod tcp;

pub use loopback::LoopbackCarrier;
pub use tcp::TcpCarrier;

use thiserror::Error;

use crate::codec::Frame;

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connecting to the remote failed.
    #[error("connection to {address} failed: {reason}")]
    Connect {
        /// Remote address.
        address: String,
        /// Underlying reason.
        reason: String,
    },
    /// The remote closed the connection.
    #[error("connection closed by remote")]
    Closed,
    /// Reading or writing failed.
    #[error("i/o error: {0}")]
    Io(String),
    /// The carrier has no open connection.
    #[error("not connected")]
    NotConnected,
    /// A received line could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Wraps an I/O error.
    pub fn io(err: &std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum CarrierEvent {
    /// A connection attempt started.
    Connecting,
    /// The connection is open.
    Connected,
    /// The connection is gone, with the error that closed it if any.
    Disconnected(Option<TransportError>),
    /// A frame arrived.
    Frame(Frame),
}

/// Ordered, reliable frame transport to a remote authority.
pub trait Carrier: Send {
    /// Starts connecting. Progress is reported through [`poll()`](Self::poll).
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Queues a frame for sending.
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Returns the next pending event.
    fn poll(&mut self) -> Option<CarrierEvent>;

    /// Closes the connection cooperatively. A `Disconnected` event follows.
    fn disconnect(&mut self);
}

impl<C: Carrier + ?Sized> Carrier for Box<C> {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        (**self).connect(host, port)
    }

    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn poll(&mut self) -> Option<CarrierEvent> {
        (**self).poll()
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }
}
