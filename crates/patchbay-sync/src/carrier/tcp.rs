//! TCP carrier with a dedicated transport thread.
//!
//! The transport thread owns the socket. It writes frames queued by
//! [`send()`](Carrier::send), reads newline-delimited frames with a short read
//! timeout, and reports everything through a `crossbeam-channel` queue that
//! the main thread drains with [`poll()`](Carrier::poll). It never touches the
//! document.
//!
//! [`disconnect()`](Carrier::disconnect) clears the connection's running flag.
//! An established connection notices within one read timeout and is joined. A
//! thread still inside `connect` is detached instead: its queue is dropped,
//! the carrier reports the disconnect itself and the thread exits once the
//! attempt returns.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::{Carrier, CarrierEvent, TransportError};
use crate::codec::{self, Frame, LineRead};

/// Default socket read timeout (bounds disconnect latency).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(25);

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The transport thread of one connection and its flags.
struct Worker {
    running: Arc<AtomicBool>,
    established: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Carrier speaking the line protocol over TCP.
pub struct TcpCarrier {
    events: Option<Receiver<CarrierEvent>>,
    backlog: VecDeque<CarrierEvent>,
    outgoing: Option<Sender<Frame>>,
    worker: Option<Worker>,
    read_timeout: Duration,
    connect_timeout: Duration,
}

impl Default for TcpCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpCarrier {
    /// Creates an idle carrier.
    pub fn new() -> Self {
        Self {
            events: None,
            backlog: VecDeque::new(),
            outgoing: None,
            worker: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the socket read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Moves whatever the current queue holds into the backlog.
    fn drain_queue(&mut self) {
        if let Some(events) = self.events.take() {
            self.backlog.extend(events.try_iter());
        }
    }

    fn stop(&mut self) -> bool {
        self.outgoing = None;
        let Some(worker) = self.worker.take() else {
            return false;
        };
        worker.running.store(false, Ordering::SeqCst);
        if worker.thread.is_finished() || worker.established.load(Ordering::SeqCst) {
            if worker.thread.join().is_err() {
                tracing::error!("transport thread panicked");
            }
        } else {
            self.drain_queue();
            self.backlog.push_back(CarrierEvent::Disconnected(None));
            tracing::debug!("transport thread detached while connecting");
        }
        true
    }
}

impl Carrier for TcpCarrier {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if let Some(worker) = &self.worker {
            if !worker.thread.is_finished() {
                return Ok(());
            }
            self.stop();
        }
        self.drain_queue();
        let (events_tx, events_rx) = unbounded();
        let (outgoing_tx, outgoing_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let established = Arc::new(AtomicBool::new(false));

        let link = Link {
            address: format!("{host}:{port}"),
            outgoing: outgoing_rx,
            events: events_tx,
            running: Arc::clone(&running),
            established: Arc::clone(&established),
            read_timeout: self.read_timeout,
            connect_timeout: self.connect_timeout,
        };
        let thread = std::thread::Builder::new()
            .name("patchbay-transport".into())
            .spawn(move || link.run())
            .map_err(|err| TransportError::io(&err))?;
        self.events = Some(events_rx);
        self.outgoing = Some(outgoing_tx);
        self.worker = Some(Worker {
            running,
            established,
            thread,
        });
        Ok(())
    }

    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let outgoing = self.outgoing.as_ref().ok_or(TransportError::NotConnected)?;
        outgoing
            .send(frame.clone())
            .map_err(|_| TransportError::NotConnected)
    }

    fn poll(&mut self) -> Option<CarrierEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        self.events.as_ref().and_then(|events| events.try_recv().ok())
    }

    fn disconnect(&mut self) {
        self.stop();
    }
}

impl Drop for TcpCarrier {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved onto the transport thread.
struct Link {
    address: String,
    outgoing: Receiver<Frame>,
    events: Sender<CarrierEvent>,
    running: Arc<AtomicBool>,
    established: Arc<AtomicBool>,
    read_timeout: Duration,
    connect_timeout: Duration,
}

impl Link {
    fn run(self) {
        self.emit(CarrierEvent::Connecting);
        let stream = match self.open() {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(address = %self.address, %err, "connect failed");
                self.emit(CarrierEvent::Disconnected(Some(err)));
                return;
            }
        };
        self.established.store(true, Ordering::SeqCst);
        if !self.running.load(Ordering::SeqCst) {
            self.emit(CarrierEvent::Disconnected(None));
            return;
        }
        tracing::info!(address = %self.address, "connected");
        self.emit(CarrierEvent::Connected);

        let error = self.pump(stream).err();
        if let Some(err) = &error {
            tracing::warn!(address = %self.address, %err, "connection lost");
        }
        self.emit(CarrierEvent::Disconnected(error));
    }

    fn open(&self) -> Result<TcpStream, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            address: self.address.clone(),
            reason,
        };
        let addresses = self
            .address
            .to_socket_addrs()
            .map_err(|err| connect_error(err.to_string()))?;

        let mut last = connect_error("no address resolved".into());
        for address in addresses {
            match TcpStream::connect_timeout(&address, self.connect_timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.read_timeout))
                        .map_err(|err| TransportError::io(&err))?;
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(err) => last = connect_error(err.to_string()),
            }
        }
        Err(last)
    }

    fn pump(&self, stream: TcpStream) -> Result<(), TransportError> {
        let mut writer = stream.try_clone().map_err(|err| TransportError::io(&err))?;
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        while self.running.load(Ordering::SeqCst) {
            for frame in self.outgoing.try_iter() {
                let line = codec::encode(&frame)
                    .map_err(|err| TransportError::Protocol(err.to_string()))?;
                writer
                    .write_all(line.as_bytes())
                    .map_err(|err| TransportError::io(&err))?;
            }
            match codec::read_frame(&mut reader, &mut buf).map_err(|err| TransportError::io(&err))? {
                LineRead::Line(Ok(frame)) => self.emit(CarrierEvent::Frame(frame)),
                LineRead::Line(Err(err)) => {
                    tracing::warn!(%err, "dropping malformed frame");
                }
                LineRead::Pending => {}
                LineRead::Eof => return Err(TransportError::Closed),
            }
        }
        Ok(())
    }

    fn emit(&self, event: CarrierEvent) {
        // Receiver gone means the carrier was dropped; nothing left to notify.
        let _ = self.events.send(event);
    }
}
