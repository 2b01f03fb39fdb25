//! The remote authority: an ordered transaction log per session.
//!
//! [`Relay`] is transport-agnostic. Peers attach with a channel the relay
//! writes reply frames into, then feed it the frames they receive. The TCP
//! front end lives in [`server`]; tests drive the relay directly through
//! [`LoopbackCarrier`](crate::LoopbackCarrier).
//!
//! Per session the relay keeps:
//!
//! - the log of accepted transactions, in acceptance order;
//! - the highest accepted `seq` per actor, to drop re-sent duplicates.
//!
//! With a store directory every session log is written to
//! `<store>/<session>.json` after each accepted push and reloaded at start.

mod server;

pub use server::RelayServer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use thiserror::Error;

use crate::codec::Frame;
use crate::transaction::{ActorId, Transaction};

/// Errors raised by the relay and its server.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Reading or writing the store failed.
    #[error("store i/o error on '{path}': {source}")]
    Store {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A stored session log could not be parsed.
    #[error("corrupt session log '{path}': {source}")]
    Corrupt {
        /// Offending file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Network setup failed.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),
}

/// Handle of one attached peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerId(u64);

impl core::fmt::Display for PeerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Session {
    log: Vec<Transaction>,
    last_seq: HashMap<ActorId, u64>,
}

impl Session {
    fn from_log(log: Vec<Transaction>) -> Self {
        let mut last_seq = HashMap::new();
        for tx in &log {
            let last = last_seq.entry(tx.actor).or_insert(0);
            *last = (*last).max(tx.seq);
        }
        Self { log, last_seq }
    }
}

struct Peer {
    sender: Sender<Frame>,
    session: Option<String>,
    actor: Option<ActorId>,
}

/// Multi-session transaction relay.
#[derive(Default)]
pub struct Relay {
    sessions: HashMap<String, Session>,
    peers: HashMap<PeerId, Peer>,
    next_peer: u64,
    store: Option<PathBuf>,
}

impl Relay {
    /// Creates an in-memory relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a relay persisting session logs under `dir`, loading any
    /// logs already there.
    pub fn with_store(dir: impl Into<PathBuf>) -> Result<Self, RelayError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| RelayError::Store {
            path: dir.clone(),
            source,
        })?;

        let mut sessions = HashMap::new();
        let entries = std::fs::read_dir(&dir).map_err(|source| RelayError::Store {
            path: dir.clone(),
            source,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let log = load_log(&path)?;
            tracing::info!(session = %name, transactions = log.len(), "session loaded");
            sessions.insert(name, Session::from_log(log));
        }

        Ok(Self {
            sessions,
            store: Some(dir),
            ..Self::default()
        })
    }

    /// Attaches a peer. Replies to its frames are sent through `sender`.
    pub fn attach(&mut self, sender: Sender<Frame>) -> PeerId {
        self.next_peer += 1;
        let id = PeerId(self.next_peer);
        self.peers.insert(
            id,
            Peer {
                sender,
                session: None,
                actor: None,
            },
        );
        tracing::debug!(%id, "peer attached");
        id
    }

    /// Detaches a peer. Unknown peers are ignored.
    pub fn detach(&mut self, id: PeerId) {
        if let Some(peer) = self.peers.remove(&id) {
            tracing::debug!(
                %id,
                session = peer.session.as_deref().unwrap_or("-"),
                "peer detached"
            );
        }
    }

    /// Handles one frame received from `id`.
    pub fn handle(&mut self, id: PeerId, frame: Frame) {
        match frame {
            Frame::Hello { actor, session } => self.hello(id, actor, session),
            Frame::Push { transaction } => self.push(id, transaction),
            other => {
                tracing::warn!(%id, ?other, "unexpected frame from client");
                self.reply(
                    id,
                    Frame::Error {
                        message: "unexpected frame".into(),
                    },
                );
            }
        }
    }

    /// Returns the log of a session.
    pub fn session_log(&self, session: &str) -> Option<&[Transaction]> {
        self.sessions.get(session).map(|s| s.log.as_slice())
    }

    /// Iterates over session names.
    pub fn sessions(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Returns the number of attached peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn hello(&mut self, id: PeerId, actor: ActorId, session: String) {
        let Some(peer) = self.peers.get_mut(&id) else {
            return;
        };
        peer.actor = Some(actor);
        peer.session = Some(session.clone());
        let transactions = self.sessions.entry(session.clone()).or_default().log.clone();
        tracing::info!(%id, %actor, %session, transactions = transactions.len(), "peer joined");
        self.reply(id, Frame::Snapshot { transactions });
    }

    fn push(&mut self, id: PeerId, transaction: Transaction) {
        let Some(peer) = self.peers.get(&id) else {
            return;
        };
        let Some(name) = peer.session.clone() else {
            self.reply(
                id,
                Frame::Error {
                    message: "push before hello".into(),
                },
            );
            return;
        };
        if peer.actor != Some(transaction.actor) {
            self.reply(
                id,
                Frame::Error {
                    message: format!("push for foreign actor {}", transaction.actor),
                },
            );
            return;
        }

        let session = self.sessions.entry(name.clone()).or_default();
        let actor = transaction.actor;
        let last = session.last_seq.get(&actor).copied().unwrap_or(0);
        if transaction.seq <= last {
            tracing::debug!(%actor, seq = transaction.seq, "duplicate push acknowledged");
            self.reply(id, Frame::Ack { actor, seq: last });
            return;
        }

        let seq = transaction.seq;
        session.last_seq.insert(actor, seq);
        session.log.push(transaction.clone());
        tracing::debug!(%actor, seq, session = %name, "transaction accepted");
        self.persist(&name);

        self.reply(id, Frame::Ack { actor, seq });
        let frame = Frame::Broadcast { transaction };
        for (other, peer) in &self.peers {
            if *other != id && peer.session.as_deref() == Some(name.as_str()) {
                // Dead peers are detached by their connection handler.
                let _ = peer.sender.send(frame.clone());
            }
        }
    }

    fn reply(&self, id: PeerId, frame: Frame) {
        if let Some(peer) = self.peers.get(&id) {
            let _ = peer.sender.send(frame);
        }
    }

    fn persist(&self, name: &str) {
        let Some(dir) = self.store.as_deref() else {
            return;
        };
        let Some(session) = self.sessions.get(name) else {
            return;
        };
        if !is_storable(name) {
            tracing::warn!(session = %name, "session name not storable, keeping it in memory");
            return;
        }
        let path = dir.join(format!("{name}.json"));
        let result = serde_json::to_vec(&session.log)
            .map_err(std::io::Error::other)
            .and_then(|bytes| std::fs::write(&path, bytes));
        if let Err(err) = result {
            tracing::error!(path = %path.display(), %err, "failed to persist session");
        }
    }
}

fn is_storable(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn load_log(path: &Path) -> Result<Vec<Transaction>, RelayError> {
    let bytes = std::fs::read(path).map_err(|source| RelayError::Store {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| RelayError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, unbounded};

    fn peer(relay: &mut Relay) -> (PeerId, Receiver<Frame>) {
        let (tx, rx) = unbounded();
        (relay.attach(tx), rx)
    }

    fn tx(actor: ActorId, seq: u64) -> Transaction {
        Transaction {
            actor,
            seq,
            label: format!("t{seq}"),
            ops: Vec::new(),
        }
    }

    #[test]
    fn hello_returns_snapshot() {
        let mut relay = Relay::new();
        let (p, rx) = peer(&mut relay);
        relay.handle(
            p,
            Frame::Hello {
                actor: ActorId::random(),
                session: "s".into(),
            },
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Frame::Snapshot {
                transactions: Vec::new()
            }
        );
    }

    #[test]
    fn push_is_acked_broadcast_and_deduplicated() {
        let mut relay = Relay::new();
        let (a, a_rx) = peer(&mut relay);
        let (b, b_rx) = peer(&mut relay);
        let actor = ActorId::random();
        relay.handle(a, Frame::Hello { actor, session: "s".into() });
        relay.handle(
            b,
            Frame::Hello {
                actor: ActorId::random(),
                session: "s".into(),
            },
        );
        a_rx.try_iter().for_each(drop);
        b_rx.try_iter().for_each(drop);

        relay.handle(a, Frame::Push { transaction: tx(actor, 1) });
        relay.handle(a, Frame::Push { transaction: tx(actor, 1) });

        let acks: Vec<_> = a_rx.try_iter().collect();
        assert_eq!(acks, vec![Frame::Ack { actor, seq: 1 }, Frame::Ack { actor, seq: 1 }]);
        let broadcasts: Vec<_> = b_rx.try_iter().collect();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(relay.session_log("s").unwrap().len(), 1);
    }

    #[test]
    fn sessions_are_isolated() {
        let mut relay = Relay::new();
        let (a, _a_rx) = peer(&mut relay);
        let (b, b_rx) = peer(&mut relay);
        let actor = ActorId::random();
        relay.handle(a, Frame::Hello { actor, session: "one".into() });
        relay.handle(
            b,
            Frame::Hello {
                actor: ActorId::random(),
                session: "two".into(),
            },
        );
        b_rx.try_iter().for_each(drop);
        relay.handle(a, Frame::Push { transaction: tx(actor, 1) });
        assert!(b_rx.try_recv().is_err());
        assert!(relay.session_log("two").unwrap().is_empty());
    }

    #[test]
    fn push_before_hello_is_rejected() {
        let mut relay = Relay::new();
        let (p, rx) = peer(&mut relay);
        relay.handle(
            p,
            Frame::Push {
                transaction: tx(ActorId::random(), 1),
            },
        );
        assert!(matches!(rx.try_recv().unwrap(), Frame::Error { .. }));
    }

    #[test]
    fn store_round_trips_session_logs() {
        let dir = tempfile::tempdir().unwrap();
        let actor = ActorId::random();
        {
            let mut relay = Relay::with_store(dir.path()).unwrap();
            let (p, _rx) = peer(&mut relay);
            relay.handle(p, Frame::Hello { actor, session: "jam".into() });
            relay.handle(p, Frame::Push { transaction: tx(actor, 1) });
            relay.handle(p, Frame::Push { transaction: tx(actor, 2) });
        }
        assert!(dir.path().join("jam.json").exists());

        let mut relay = Relay::with_store(dir.path()).unwrap();
        assert_eq!(relay.session_log("jam").unwrap().len(), 2);

        // Re-sent pushes after a restart are still recognised.
        let (p, rx) = peer(&mut relay);
        relay.handle(p, Frame::Hello { actor, session: "jam".into() });
        rx.try_iter().for_each(drop);
        relay.handle(p, Frame::Push { transaction: tx(actor, 2) });
        assert_eq!(rx.try_recv().unwrap(), Frame::Ack { actor, seq: 2 });
        assert_eq!(relay.session_log("jam").unwrap().len(), 2);
    }

    #[test]
    fn corrupt_store_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{").unwrap();
        assert!(matches!(
            Relay::with_store(dir.path()),
            Err(RelayError::Corrupt { .. })
        ));
    }
}
