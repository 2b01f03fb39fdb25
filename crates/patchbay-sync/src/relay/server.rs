//! TCP front end for the relay.
//!
//! One thread accepts connections; each connection gets its own thread that
//! decodes incoming lines into frames, hands them to the shared [`Relay`] and
//! writes back whatever the relay queued for that peer. Every loop polls a
//! shared running flag so [`RelayServer::shutdown()`] stops everything
//! cooperatively.

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};
use parking_lot::Mutex;

use super::{Relay, RelayError};
use crate::codec::{self, Frame, LineRead};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A relay served over TCP.
pub struct RelayServer {
    listener: TcpListener,
    relay: Arc<Mutex<Relay>>,
    running: Arc<AtomicBool>,
}

impl RelayServer {
    /// Binds the listener.
    pub fn bind(address: impl ToSocketAddrs, relay: Relay) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            relay: Arc::new(Mutex::new(relay)),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the shared relay.
    pub fn relay(&self) -> Arc<Mutex<Relay>> {
        Arc::clone(&self.relay)
    }

    /// Returns the running flag; storing `false` stops the server.
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Asks the accept loop and every connection to stop.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Accepts connections until shut down, then joins every connection thread.
    pub fn run(&self) -> Result<(), RelayError> {
        tracing::info!(address = %self.local_addr()?, "relay listening");
        let mut connections: Vec<JoinHandle<()>> = Vec::new();

        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, address)) => {
                    tracing::info!(%address, "connection accepted");
                    let relay = Arc::clone(&self.relay);
                    let running = Arc::clone(&self.running);
                    connections.push(std::thread::spawn(move || {
                        if let Err(err) = serve(stream, &relay, &running) {
                            tracing::warn!(%address, %err, "connection ended with error");
                        }
                        tracing::info!(%address, "connection closed");
                    }));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => tracing::warn!(%err, "accept failed"),
            }
            connections.retain(|handle| !handle.is_finished());
        }

        for handle in connections {
            let _ = handle.join();
        }
        tracing::info!("relay stopped");
        Ok(())
    }
}

fn serve(stream: TcpStream, relay: &Mutex<Relay>, running: &AtomicBool) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    stream.set_nodelay(true)?;

    let (sender, replies) = unbounded();
    let peer = relay.lock().attach(sender);
    let result = pump(stream, relay, running, peer, &replies);
    relay.lock().detach(peer);
    result
}

fn pump(
    stream: TcpStream,
    relay: &Mutex<Relay>,
    running: &AtomicBool,
    peer: super::PeerId,
    replies: &Receiver<Frame>,
) -> std::io::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    while running.load(Ordering::SeqCst) {
        for frame in replies.try_iter() {
            write_frame(&mut writer, &frame)?;
        }
        match codec::read_frame(&mut reader, &mut buf)? {
            LineRead::Line(Ok(frame)) => relay.lock().handle(peer, frame),
            LineRead::Line(Err(err)) => {
                tracing::warn!(%peer, %err, "dropping malformed frame");
                write_frame(
                    &mut writer,
                    &Frame::Error {
                        message: err.to_string(),
                    },
                )?;
            }
            LineRead::Pending => {}
            LineRead::Eof => return Ok(()),
        }
    }
    Ok(())
}

fn write_frame(writer: &mut TcpStream, frame: &Frame) -> std::io::Result<()> {
    let line = codec::encode(frame).map_err(std::io::Error::other)?;
    writer.write_all(line.as_bytes())
}
