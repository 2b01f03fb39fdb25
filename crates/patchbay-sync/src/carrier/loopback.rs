//! In-process carrier attached directly to a shared [`Relay`].

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, unbounded};
use parking_lot::Mutex;

use super::{Carrier, CarrierEvent, TransportError};
use crate::codec::Frame;
use crate::relay::{PeerId, Relay};

/// Carrier that talks to a [`Relay`] in the same process.
///
/// Frames are delivered synchronously, which makes multi-peer scenarios fully
/// deterministic. [`sever()`](Self::sever) and
/// [`refuse_connections()`](Self::refuse_connections) simulate network faults.
pub struct LoopbackCarrier {
    relay: Arc<Mutex<Relay>>,
    peer: Option<PeerId>,
    incoming: Option<Receiver<Frame>>,
    events: VecDeque<CarrierEvent>,
    refuse: bool,
}

impl LoopbackCarrier {
    /// Creates a carrier for `relay`.
    pub fn new(relay: Arc<Mutex<Relay>>) -> Self {
        Self {
            relay,
            peer: None,
            incoming: None,
            events: VecDeque::new(),
            refuse: false,
        }
    }

    /// Makes subsequent connection attempts fail.
    pub fn refuse_connections(&mut self, refuse: bool) {
        self.refuse = refuse;
    }

    /// Drops the connection as if the network failed.
    pub fn sever(&mut self) {
        if self.close() {
            self.events
                .push_back(CarrierEvent::Disconnected(Some(TransportError::Closed)));
        }
    }

    /// Returns true while attached to the relay.
    pub fn is_open(&self) -> bool {
        self.peer.is_some()
    }

    fn close(&mut self) -> bool {
        self.incoming = None;
        match self.peer.take() {
            Some(peer) => {
                self.relay.lock().detach(peer);
                true
            }
            None => false,
        }
    }
}

impl Carrier for LoopbackCarrier {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.peer.is_some() {
            return Ok(());
        }
        self.events.push_back(CarrierEvent::Connecting);
        if self.refuse {
            self.events
                .push_back(CarrierEvent::Disconnected(Some(TransportError::Connect {
                    address: format!("{host}:{port}"),
                    reason: "connection refused".into(),
                })));
            return Ok(());
        }
        let (sender, receiver) = unbounded();
        self.peer = Some(self.relay.lock().attach(sender));
        self.incoming = Some(receiver);
        self.events.push_back(CarrierEvent::Connected);
        Ok(())
    }

    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let peer = self.peer.ok_or(TransportError::NotConnected)?;
        self.relay.lock().handle(peer, frame.clone());
        Ok(())
    }

    fn poll(&mut self) -> Option<CarrierEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        self.incoming
            .as_ref()
            .and_then(|rx| rx.try_recv().ok())
            .map(CarrierEvent::Frame)
    }

    fn disconnect(&mut self) {
        if self.close() {
            self.events.push_back(CarrierEvent::Disconnected(None));
        }
    }
}

impl Drop for LoopbackCarrier {
    fn drop(&mut self) {
        self.close();
    }
}
