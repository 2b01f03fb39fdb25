//! The document manager: commits, gestures, undo/redo and synchronization.
//!
//! # Connection state
//!
//! ```text
//!              connect()             Connected event
//! Disconnected ─────────▶ Connecting ───────────────▶ Connected ──▶ (loaded)
//!      ▲                      │                          │
//!      └──────────────────────┴──── Disconnected event ──┘
//! ```
//!
//! State changes only when the carrier reports an event; the manager drains
//! those events on the main thread in [`tick()`](DocumentManager::tick),
//! [`connect()`](DocumentManager::connect) and
//! [`disconnect()`](DocumentManager::disconnect). After `Connected` the manager
//! sends `Hello`, applies the snapshot the relay answers with, reports
//! [`ManagerEvent::Loaded`] and re-sends every unacknowledged local
//! transaction in commit order.
//!
//! # Commits
//!
//! Local edits go straight into the [`Document`]. [`commit()`] (outside a
//! gesture) or [`end_gesture()`] (closing one) turns the accumulated edits into
//! one [`Transaction`], records it in the undo history and queues it in the
//! outbox. The outbox is pushed whenever the session is loaded and trimmed by
//! the relay's acknowledgements, so commits made while offline reach the relay
//! in order, exactly once.
//!
//! # Pull
//!
//! Remote transactions are buffered as they arrive and merged at most once per
//! pull interval, never while a gesture is open. A transaction from an actor is
//! applied only after every lower `seq` of that actor; early arrivals are held
//! back and duplicates dropped. Remote writes to a field that a local
//! transaction still waiting for its acknowledgement also wrote are skipped:
//! the relay orders the local write later, so every peer converges on it.
//!
//! [`commit()`]: DocumentManager::commit
//! [`end_gesture()`]: DocumentManager::end_gesture

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::carrier::{Carrier, CarrierEvent, TransportError};
use crate::codec::Frame;
use crate::history::{Entry, History};
use crate::model::{Document, Operation, Shield, invert};
use crate::transaction::{ActorId, Transaction};

/// Default interval between two pulls.
pub const DEFAULT_PULL_INTERVAL: Duration = Duration::from_millis(50);

/// Connection state of a [`DocumentManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Connection open.
    Connected,
}

/// Notifications produced by the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// A connection attempt started.
    Connecting,
    /// The connection opened; the snapshot is on its way.
    Connected,
    /// The snapshot was applied and the outbox re-sent.
    Loaded {
        /// Snapshot transactions applied (already-known ones excluded).
        transactions: usize,
    },
    /// The connection closed.
    Disconnected {
        /// Transport error that closed it, if any.
        error: Option<TransportError>,
    },
    /// A remote transaction was merged.
    RemoteApplied {
        /// Originating actor.
        actor: ActorId,
        /// Its sequence number.
        seq: u64,
        /// Operations skipped by the merge.
        conflicts: usize,
    },
    /// The relay stored local transactions up to `seq`.
    Acknowledged {
        /// Highest stored sequence number.
        seq: u64,
    },
    /// The relay rejected a request.
    Rejected {
        /// Reason given by the relay.
        message: String,
    },
}

/// Errors returned by the manager.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The call is not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// The carrier failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug)]
struct Gesture {
    label: String,
    ops: Vec<Operation>,
}

/// Owns a document and keeps it in sync through a [`Carrier`].
pub struct DocumentManager<C: Carrier> {
    document: Document,
    carrier: C,
    state: ConnectionState,
    session: String,
    loaded: bool,
    history: History,
    gesture: Option<Gesture>,
    next_seq: u64,
    outbox: VecDeque<Transaction>,
    sent: usize,
    applied: HashMap<ActorId, u64>,
    held: HashMap<ActorId, BTreeMap<u64, Transaction>>,
    inbox: VecDeque<Frame>,
    pull_interval: Duration,
    last_pull: Option<Instant>,
    events: Vec<ManagerEvent>,
}

impl<C: Carrier> DocumentManager<C> {
    /// Creates a disconnected manager with an empty document.
    pub fn new(actor: ActorId, carrier: C) -> Self {
        Self {
            document: Document::new(actor),
            carrier,
            state: ConnectionState::Disconnected,
            session: String::new(),
            loaded: false,
            history: History::new(),
            gesture: None,
            next_seq: 1,
            outbox: VecDeque::new(),
            sent: 0,
            applied: HashMap::new(),
            held: HashMap::new(),
            inbox: VecDeque::new(),
            pull_interval: DEFAULT_PULL_INTERVAL,
            last_pull: None,
            events: Vec::new(),
        }
    }

    /// Sets the minimum interval between two pulls.
    pub fn with_pull_interval(mut self, interval: Duration) -> Self {
        self.pull_interval = interval;
        self
    }

    // --- Accessors ---

    /// Returns the local actor.
    pub fn actor(&self) -> ActorId {
        self.document.actor()
    }

    /// Returns the document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Returns the document for local edits.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Returns the undo history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true once the snapshot of the current connection is applied.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Returns the session of the current or last connection.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Returns true while a gesture is open.
    pub fn is_gesture_open(&self) -> bool {
        self.gesture.is_some()
    }

    /// Returns the number of local transactions not yet acknowledged.
    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    /// Returns the carrier.
    pub fn carrier(&self) -> &C {
        &self.carrier
    }

    /// Returns the carrier mutably.
    pub fn carrier_mut(&mut self) -> &mut C {
        &mut self.carrier
    }

    /// Drains the events produced outside of [`tick()`](Self::tick).
    pub fn take_events(&mut self) -> Vec<ManagerEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Connection ---

    /// Starts connecting to `host:port` and joining `session`.
    pub fn connect(&mut self, host: &str, port: u16, session: &str) -> Result<(), SyncError> {
        if self.state != ConnectionState::Disconnected {
            return Err(misuse("connect while not disconnected"));
        }
        self.session = session.to_string();
        tracing::info!(%host, port, %session, "connecting");
        self.carrier.connect(host, port)?;
        self.process_carrier_events();
        Ok(())
    }

    /// Closes the connection. Safe to call in any state.
    ///
    /// An open gesture is discarded and its edits reverted.
    pub fn disconnect(&mut self) {
        self.carrier.disconnect();
        self.process_carrier_events();
    }

    /// Runs one timer tick at the current time.
    pub fn tick(&mut self) -> Vec<ManagerEvent> {
        self.tick_at(Instant::now())
    }

    /// Runs one timer tick: drains carrier events, then pulls and pushes if
    /// the session is loaded, no gesture is open and the pull interval has
    /// elapsed.
    pub fn tick_at(&mut self, now: Instant) -> Vec<ManagerEvent> {
        self.process_carrier_events();

        if self.state == ConnectionState::Connected && self.gesture.is_none() {
            if !self.loaded {
                self.load();
            } else if self
                .last_pull
                .is_none_or(|last| now.saturating_duration_since(last) >= self.pull_interval)
            {
                self.last_pull = Some(now);
                self.pull();
                self.flush();
            }
        }

        self.take_events()
    }

    // --- Commits ---

    /// Commits the pending local edits as one undoable transaction.
    ///
    /// Returns the transaction's `seq`, or `None` if nothing changed.
    pub fn commit(&mut self, label: &str) -> Result<Option<u64>, SyncError> {
        if self.gesture.is_some() {
            return Err(misuse("commit while a gesture is open"));
        }
        let ops = self.document.take_pending();
        Ok(self.finish(label.to_string(), ops))
    }

    /// Opens a gesture. Gestures do not nest.
    pub fn start_gesture(&mut self, label: &str) -> Result<(), SyncError> {
        if self.gesture.is_some() {
            return Err(misuse("gesture already open"));
        }
        self.gesture = Some(Gesture {
            label: label.to_string(),
            ops: Vec::new(),
        });
        Ok(())
    }

    /// Folds the edits made so far into the open gesture and relabels it.
    ///
    /// Observers see the intermediate state; nothing is sent until
    /// [`end_gesture()`](Self::end_gesture).
    pub fn commit_gesture(&mut self, label: &str) -> Result<(), SyncError> {
        let Some(gesture) = self.gesture.as_mut() else {
            return Err(misuse("no gesture open"));
        };
        gesture.ops.extend(self.document.take_pending());
        gesture.label = label.to_string();
        Ok(())
    }

    /// Closes the gesture and commits all of its edits as one transaction.
    pub fn end_gesture(&mut self) -> Result<Option<u64>, SyncError> {
        let Some(mut gesture) = self.gesture.take() else {
            return Err(misuse("no gesture open"));
        };
        gesture.ops.extend(self.document.take_pending());
        Ok(self.finish(gesture.label, gesture.ops))
    }

    /// Closes the gesture and reverts all of its edits.
    pub fn cancel_gesture(&mut self) -> Result<(), SyncError> {
        if self.gesture.is_none() {
            return Err(misuse("no gesture open"));
        }
        self.discard_gesture();
        Ok(())
    }

    // --- History ---

    /// Undoes the last local step by committing its inverse.
    ///
    /// Returns the `seq` of the inverse transaction, or `None` if there was
    /// nothing to undo (or nothing left to revert after concurrent edits).
    pub fn undo(&mut self) -> Result<Option<u64>, SyncError> {
        self.ensure_idle()?;
        let Some(entry) = self.history.pop_undo() else {
            return Ok(None);
        };
        let (label, ops) = self.replay_inverse(entry);
        self.history.push_redo(Entry {
            label: label.clone(),
            ops: ops.clone(),
        });
        Ok(self.publish(label, ops))
    }

    /// Redoes the last undone step.
    pub fn redo(&mut self) -> Result<Option<u64>, SyncError> {
        self.ensure_idle()?;
        let Some(entry) = self.history.pop_redo() else {
            return Ok(None);
        };
        let (label, ops) = self.replay_inverse(entry);
        self.history.push_undo(Entry {
            label: label.clone(),
            ops: ops.clone(),
        });
        Ok(self.publish(label, ops))
    }

    // --- Internal: commits ---

    fn ensure_idle(&self) -> Result<(), SyncError> {
        if self.gesture.is_some() {
            return Err(misuse("history step while a gesture is open"));
        }
        if self.document.has_pending() {
            return Err(misuse("uncommitted edits pending"));
        }
        Ok(())
    }

    fn replay_inverse(&mut self, entry: Entry) -> (String, Vec<Operation>) {
        let skipped = self.document.replay(&invert(&entry.ops));
        if skipped > 0 {
            tracing::warn!(label = %entry.label, skipped, "history step partly superseded by remote edits");
        }
        (entry.label, self.document.take_pending())
    }

    fn finish(&mut self, label: String, ops: Vec<Operation>) -> Option<u64> {
        if ops.is_empty() {
            return None;
        }
        self.history.record(Entry {
            label: label.clone(),
            ops: ops.clone(),
        });
        self.publish(label, ops)
    }

    fn publish(&mut self, label: String, ops: Vec<Operation>) -> Option<u64> {
        if ops.is_empty() {
            return None;
        }
        let actor = self.actor();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.applied.insert(actor, seq);
        tracing::debug!(%actor, seq, %label, ops = ops.len(), "commit");
        self.outbox.push_back(Transaction {
            actor,
            seq,
            label,
            ops,
        });
        self.flush();
        Some(seq)
    }

    fn discard_gesture(&mut self) {
        if let Some(gesture) = self.gesture.take() {
            self.document.discard_pending();
            self.document.revert(&gesture.ops);
            tracing::warn!(label = %gesture.label, "gesture discarded");
        }
    }

    // --- Internal: transport ---

    fn process_carrier_events(&mut self) {
        while let Some(event) = self.carrier.poll() {
            match event {
                CarrierEvent::Connecting => {
                    self.state = ConnectionState::Connecting;
                    self.events.push(ManagerEvent::Connecting);
                }
                CarrierEvent::Connected => {
                    self.state = ConnectionState::Connected;
                    self.loaded = false;
                    self.sent = 0;
                    self.last_pull = None;
                    self.events.push(ManagerEvent::Connected);
                    let hello = Frame::Hello {
                        actor: self.actor(),
                        session: self.session.clone(),
                    };
                    if let Err(err) = self.carrier.send(&hello) {
                        tracing::error!(%err, "failed to send hello");
                    }
                }
                CarrierEvent::Disconnected(error) => self.on_disconnected(error),
                CarrierEvent::Frame(frame) => self.on_frame(frame),
            }
        }
    }

    fn on_disconnected(&mut self, error: Option<TransportError>) {
        match &error {
            Some(err) => tracing::warn!(%err, "disconnected"),
            None => tracing::info!("disconnected"),
        }
        self.state = ConnectionState::Disconnected;
        self.loaded = false;
        self.sent = 0;
        self.last_pull = None;
        self.inbox.clear();
        self.held.clear();
        self.discard_gesture();
        self.events.push(ManagerEvent::Disconnected { error });
    }

    fn on_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Error { message } => {
                tracing::error!(%message, "relay rejected request");
                self.events.push(ManagerEvent::Rejected { message });
            }
            // Acks stay in arrival order with broadcasts: a broadcast that
            // precedes the ack of a local commit was ordered before it.
            Frame::Snapshot { .. } | Frame::Broadcast { .. } | Frame::Ack { .. } => {
                self.inbox.push_back(frame);
            }
            Frame::Hello { .. } | Frame::Push { .. } => {
                tracing::warn!("ignoring client frame received from relay");
            }
        }
    }

    /// Applies the snapshot once it has arrived, then re-sends the outbox.
    ///
    /// Local transactions found in the snapshot count as acknowledged. When
    /// remote transactions ordered before some of them are applied late
    /// (their broadcast was lost with the connection), those local
    /// transactions are re-applied on top so the relay order holds.
    fn load(&mut self) {
        let Some(index) = self
            .inbox
            .iter()
            .position(|f| matches!(f, Frame::Snapshot { .. }))
        else {
            return;
        };
        let Some(Frame::Snapshot { transactions }) = self.inbox.remove(index) else {
            return;
        };

        let actor = self.actor();
        let stored = transactions
            .iter()
            .filter(|tx| tx.actor == actor)
            .map(|tx| tx.seq)
            .max()
            .unwrap_or(0);
        self.trim_outbox(stored);
        self.next_seq = self.next_seq.max(stored + 1);

        let shield = self.shield();
        let mut applied = 0;
        let mut reordered = false;
        for tx in &transactions {
            let known = tx.seq <= self.last_applied(tx.actor);
            if !known {
                self.apply_remote(tx);
                applied += 1;
                reordered = true;
            } else if tx.actor == actor && reordered {
                self.document.apply_shielded(tx, &shield);
            }
        }

        self.loaded = true;
        tracing::info!(session = %self.session, applied, pending = self.outbox.len(), "loaded");
        self.events.push(ManagerEvent::Loaded {
            transactions: applied,
        });
        self.flush();
    }

    fn pull(&mut self) {
        while let Some(frame) = self.inbox.pop_front() {
            match frame {
                Frame::Broadcast { transaction } => self.receive(transaction),
                Frame::Ack { actor, seq } if actor == self.actor() => {
                    self.trim_outbox(seq);
                    self.events.push(ManagerEvent::Acknowledged { seq });
                }
                Frame::Ack { .. } => {}
                other => tracing::warn!(?other, "unexpected frame after load"),
            }
        }
    }

    fn trim_outbox(&mut self, seq: u64) {
        while self.outbox.front().is_some_and(|tx| tx.seq <= seq) {
            self.outbox.pop_front();
            self.sent = self.sent.saturating_sub(1);
        }
    }

    /// Fields written by local transactions the relay has not stored yet.
    fn shield(&self) -> Shield {
        self.outbox
            .iter()
            .flat_map(|tx| tx.ops.iter())
            .filter_map(|op| match op {
                Operation::Set { id, field, .. } => Some((*id, field.clone())),
                _ => None,
            })
            .collect()
    }

    fn receive(&mut self, tx: Transaction) {
        let last = self.last_applied(tx.actor);
        if tx.seq <= last {
            tracing::debug!(actor = %tx.actor, seq = tx.seq, "duplicate dropped");
            return;
        }
        if tx.seq > last + 1 {
            tracing::debug!(actor = %tx.actor, seq = tx.seq, expected = last + 1, "held back");
            self.held.entry(tx.actor).or_default().insert(tx.seq, tx);
            return;
        }

        let actor = tx.actor;
        self.apply_remote(&tx);
        loop {
            let next = self.last_applied(actor) + 1;
            let Some(tx) = self.held.get_mut(&actor).and_then(|h| h.remove(&next)) else {
                break;
            };
            self.apply_remote(&tx);
        }
        if self.held.get(&actor).is_some_and(BTreeMap::is_empty) {
            self.held.remove(&actor);
        }
    }

    fn apply_remote(&mut self, tx: &Transaction) {
        let shield = self.shield();
        let report = self.document.apply_shielded(tx, &shield);
        self.applied.insert(tx.actor, tx.seq);
        self.events.push(ManagerEvent::RemoteApplied {
            actor: tx.actor,
            seq: tx.seq,
            conflicts: report.conflicts,
        });
    }

    fn last_applied(&self, actor: ActorId) -> u64 {
        self.applied.get(&actor).copied().unwrap_or(0)
    }

    /// Sends every outbox entry not yet sent on this connection. Stops at the
    /// first failure; the rest waits for the next tick.
    fn flush(&mut self) {
        if !self.loaded || self.state != ConnectionState::Connected {
            return;
        }
        while let Some(tx) = self.outbox.get(self.sent) {
            let frame = Frame::Push {
                transaction: tx.clone(),
            };
            if let Err(err) = self.carrier.send(&frame) {
                tracing::warn!(%err, seq = tx.seq, "push failed, will retry");
                break;
            }
            self.sent += 1;
        }
    }
}

fn misuse(reason: &'static str) -> SyncError {
    tracing::error!(reason, "document manager misuse");
    SyncError::InvalidState(reason)
}
