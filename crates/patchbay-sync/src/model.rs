//! Causal document model.
//!
//! A [`Document`] is a flat map of [`Record`]s keyed by [`ObjectId`]. Each
//! record has a class name and a set of named [`Value`] fields. Patches store
//! objects and links as records; links refer to objects through
//! [`Value::Ref`].
//!
//! Every mutation is expressed as an [`Operation`]. Local edits are recorded
//! into a pending list that the manager turns into a [`Transaction`]; remote
//! transactions are merged with [`Document::apply()`]. Both paths append
//! [`Change`] notifications that observers drain with
//! [`Document::take_changes()`].
//!
//! Change tracking is by generation: the document counter advances on every
//! operation and each field remembers the generation of its last write, so
//! "did this field change since I last looked" is a single comparison.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{ActorId, Transaction};

/// Identifier of a record, unique across every peer of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Actor that created the record.
    pub actor: ActorId,
    /// Per-actor creation counter, starting at 1.
    pub serial: u64,
}

impl core::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.actor, self.serial)
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Text(String),
    /// Reference to another record.
    Ref(ObjectId),
}

impl Value {
    /// Returns the integer, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the number as `f64`, converting integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the text, if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the referenced id, if this is a `Ref`.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::Ref(v)
    }
}

/// Field values by name.
pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
struct Field {
    value: Value,
    changed_at: u64,
}

/// One record of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    class: String,
    fields: BTreeMap<String, Field>,
}

impl Record {
    /// Returns the record's class name.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).map(|f| &f.value)
    }

    /// Returns an integer field.
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Returns a numeric field as `f64`.
    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    /// Returns a text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    /// Returns a reference field.
    pub fn object(&self, name: &str) -> Option<ObjectId> {
        self.get(name).and_then(Value::as_object)
    }

    /// Returns true if `name` was written after `generation`.
    pub fn changed_since(&self, name: &str, generation: u64) -> bool {
        self.fields
            .get(name)
            .is_some_and(|f| f.changed_at > generation)
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, f)| (k.as_str(), &f.value))
    }

    /// Returns a copy of every field value.
    pub fn values(&self) -> Fields {
        self.fields
            .iter()
            .map(|(k, f)| (k.clone(), f.value.clone()))
            .collect()
    }
}

/// One primitive document mutation.
///
/// `Set` and `Erase` carry the state they overwrite so every operation can be
/// inverted without consulting the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a record.
    Insert {
        /// New record id.
        id: ObjectId,
        /// Class name.
        class: String,
        /// Initial fields.
        fields: Fields,
    },
    /// Write or remove one field (`None` means absent).
    Set {
        /// Target record.
        id: ObjectId,
        /// Field name.
        field: String,
        /// Previous value.
        old: Option<Value>,
        /// New value.
        new: Option<Value>,
    },
    /// Delete a record.
    Erase {
        /// Deleted record id.
        id: ObjectId,
        /// Class name at deletion time.
        class: String,
        /// Fields at deletion time.
        fields: Fields,
    },
}

impl Operation {
    /// Returns the target record id.
    pub fn id(&self) -> ObjectId {
        match self {
            Operation::Insert { id, .. } | Operation::Set { id, .. } | Operation::Erase { id, .. } => {
                *id
            }
        }
    }

    /// Returns the operation that undoes this one.
    pub fn inverse(&self) -> Operation {
        match self {
            Operation::Insert { id, class, fields } => Operation::Erase {
                id: *id,
                class: class.clone(),
                fields: fields.clone(),
            },
            Operation::Erase { id, class, fields } => Operation::Insert {
                id: *id,
                class: class.clone(),
                fields: fields.clone(),
            },
            Operation::Set {
                id,
                field,
                old,
                new,
            } => Operation::Set {
                id: *id,
                field: field.clone(),
                old: new.clone(),
                new: old.clone(),
            },
        }
    }
}

/// Returns the operations undoing `ops`, in reverse order.
pub fn invert(ops: &[Operation]) -> Vec<Operation> {
    ops.iter().rev().map(Operation::inverse).collect()
}

/// A change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A record was created.
    Added {
        /// Record id.
        id: ObjectId,
        /// Class name.
        class: String,
    },
    /// A field was written or removed.
    Changed {
        /// Record id.
        id: ObjectId,
        /// Field name.
        field: String,
    },
    /// A record was deleted.
    Removed {
        /// Record id.
        id: ObjectId,
        /// The record as it was before deletion.
        record: Record,
    },
}

/// Ordered change notifications accumulated since the last drain.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of notifications.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Iterates over notifications in the order they happened.
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Appends every notification of `other`.
    pub fn extend(&mut self, other: ChangeSet) {
        self.changes.extend(other.changes);
    }

    fn push(&mut self, change: Change) {
        self.changes.push(change);
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

/// Errors raised by document mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The target record does not exist.
    #[error("object {0} not found")]
    NotFound(ObjectId),
    /// A record with this id already exists.
    #[error("object {0} already exists")]
    Exists(ObjectId),
}

/// Outcome of merging a remote transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Operations applied.
    pub applied: usize,
    /// Operations skipped because their target was missing or already present.
    pub conflicts: usize,
    /// Field writes skipped because a later local write is still in flight.
    pub superseded: usize,
}

/// `(record, field)` pairs whose remote writes must be skipped.
pub type Shield = HashSet<(ObjectId, String)>;

/// The shared document.
#[derive(Debug)]
pub struct Document {
    actor: ActorId,
    next_serial: u64,
    records: BTreeMap<ObjectId, Record>,
    generation: u64,
    pending: Vec<Operation>,
    changes: ChangeSet,
}

impl Document {
    /// Creates an empty document edited by `actor`.
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            next_serial: 1,
            records: BTreeMap::new(),
            generation: 0,
            pending: Vec::new(),
            changes: ChangeSet::default(),
        }
    }

    /// Returns the local actor.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Returns the current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the document holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns a record.
    pub fn get(&self, id: ObjectId) -> Option<&Record> {
        self.records.get(&id)
    }

    /// Returns true if the record exists.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.records.contains_key(&id)
    }

    /// Iterates over every record in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Record)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    /// Iterates over the records of one class.
    pub fn records_of<'a>(&'a self, class: &'a str) -> impl Iterator<Item = (ObjectId, &'a Record)> {
        self.iter().filter(move |(_, r)| r.class == class)
    }

    // --- Local edits ---

    /// Creates a record and returns its id.
    pub fn insert<S: Into<String>>(
        &mut self,
        class: impl Into<String>,
        fields: impl IntoIterator<Item = (S, Value)>,
    ) -> ObjectId {
        let id = ObjectId {
            actor: self.actor,
            serial: self.next_serial,
        };
        let op = Operation::Insert {
            id,
            class: class.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        };
        // A fresh local id cannot collide.
        if let Ok(done) = self.execute(&op) {
            self.pending.push(done);
        }
        id
    }

    /// Writes one field.
    pub fn set(
        &mut self,
        id: ObjectId,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ModelError> {
        self.record_local(&Operation::Set {
            id,
            field: field.into(),
            old: None,
            new: Some(value.into()),
        })
    }

    /// Removes one field.
    pub fn unset(&mut self, id: ObjectId, field: impl Into<String>) -> Result<(), ModelError> {
        self.record_local(&Operation::Set {
            id,
            field: field.into(),
            old: None,
            new: None,
        })
    }

    /// Deletes a record.
    pub fn erase(&mut self, id: ObjectId) -> Result<(), ModelError> {
        self.record_local(&Operation::Erase {
            id,
            class: String::new(),
            fields: Fields::new(),
        })
    }

    /// Applies `ops` as local edits, recording what actually happened.
    ///
    /// Operations whose target is missing (or, for inserts, already present)
    /// are skipped. Returns the number skipped.
    pub fn replay(&mut self, ops: &[Operation]) -> usize {
        ops.iter()
            .filter(|op| self.record_local(op).is_err())
            .count()
    }

    /// Returns true if local edits are waiting to be committed.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Extracts the local edits made since the last call.
    pub fn take_pending(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.pending)
    }

    /// Reverts the uncommitted local edits. Returns how many were reverted.
    pub fn discard_pending(&mut self) -> usize {
        let ops = self.take_pending();
        self.revert(&ops);
        ops.len()
    }

    /// Undoes `ops` without recording anything as pending.
    pub fn revert(&mut self, ops: &[Operation]) {
        for op in invert(ops) {
            if let Err(err) = self.execute(&op) {
                tracing::debug!(%err, "revert skipped an operation");
            }
        }
    }

    // --- Remote merge ---

    /// Merges a transaction from another peer.
    ///
    /// Field writes are last-writer-wins in arrival order. Operations on
    /// records that do not exist are skipped and counted as conflicts.
    pub fn apply(&mut self, transaction: &Transaction) -> ApplyReport {
        self.apply_shielded(transaction, &Shield::new())
    }

    /// Merges a transaction, skipping field writes listed in `shield`.
    ///
    /// The manager shields fields written by its own unacknowledged
    /// transactions: the relay orders those after anything it has already
    /// broadcast, so the local value is the one every peer ends up with.
    pub fn apply_shielded(&mut self, transaction: &Transaction, shield: &Shield) -> ApplyReport {
        let mut report = ApplyReport::default();
        for op in &transaction.ops {
            let shielded = matches!(
                op,
                Operation::Set { id, field, .. } if shield.contains(&(*id, field.clone()))
            );
            if shielded {
                report.superseded += 1;
                continue;
            }
            match self.execute(op) {
                Ok(_) => report.applied += 1,
                Err(err) => {
                    tracing::debug!(%err, actor = %transaction.actor, seq = transaction.seq, "conflict");
                    report.conflicts += 1;
                }
            }
        }
        report
    }

    // --- Observation ---

    /// Drains the change notifications accumulated so far.
    pub fn take_changes(&mut self) -> ChangeSet {
        std::mem::take(&mut self.changes)
    }

    /// Returns true if change notifications are waiting.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    // --- Internal ---

    fn record_local(&mut self, op: &Operation) -> Result<(), ModelError> {
        let done = self.execute(op)?;
        self.pending.push(done);
        Ok(())
    }

    /// Performs one operation and returns it with the state it actually
    /// overwrote.
    fn execute(&mut self, op: &Operation) -> Result<Operation, ModelError> {
        let id = op.id();
        match op {
            Operation::Insert { class, fields, .. } => {
                if self.records.contains_key(&id) {
                    return Err(ModelError::Exists(id));
                }
                let generation = self.bump();
                let record = Record {
                    class: class.clone(),
                    fields: fields
                        .iter()
                        .map(|(k, v)| {
                            (
                                k.clone(),
                                Field {
                                    value: v.clone(),
                                    changed_at: generation,
                                },
                            )
                        })
                        .collect(),
                };
                self.records.insert(id, record);
                if id.actor == self.actor {
                    self.next_serial = self.next_serial.max(id.serial + 1);
                }
                self.changes.push(Change::Added {
                    id,
                    class: class.clone(),
                });
                Ok(op.clone())
            }
            Operation::Set { field, new, .. } => {
                if !self.records.contains_key(&id) {
                    return Err(ModelError::NotFound(id));
                }
                let generation = self.bump();
                let record = self
                    .records
                    .get_mut(&id)
                    .ok_or(ModelError::NotFound(id))?;
                let old = match new {
                    Some(value) => record.fields.insert(
                        field.clone(),
                        Field {
                            value: value.clone(),
                            changed_at: generation,
                        },
                    ),
                    None => record.fields.remove(field),
                };
                self.changes.push(Change::Changed {
                    id,
                    field: field.clone(),
                });
                Ok(Operation::Set {
                    id,
                    field: field.clone(),
                    old: old.map(|f| f.value),
                    new: new.clone(),
                })
            }
            Operation::Erase { .. } => {
                let record = self.records.remove(&id).ok_or(ModelError::NotFound(id))?;
                self.bump();
                let done = Operation::Erase {
                    id,
                    class: record.class.clone(),
                    fields: record.values(),
                };
                self.changes.push(Change::Removed { id, record });
                Ok(done)
            }
        }
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(ActorId::random())
    }

    #[test]
    fn insert_assigns_sequential_serials() {
        let mut d = doc();
        let a = d.insert("object", [("text", Value::from("+ 1"))]);
        let b = d.insert("object", [("text", Value::from("print"))]);
        assert_eq!(a.serial, 1);
        assert_eq!(b.serial, 2);
        assert_eq!(d.get(a).unwrap().text("text"), Some("+ 1"));
        assert_eq!(d.take_pending().len(), 2);
    }

    #[test]
    fn set_records_previous_value() {
        let mut d = doc();
        let a = d.insert("object", [("x", Value::Int(10))]);
        d.take_pending();
        d.set(a, "x", 20i64).unwrap();
        let ops = d.take_pending();
        assert_eq!(
            ops,
            vec![Operation::Set {
                id: a,
                field: "x".into(),
                old: Some(Value::Int(10)),
                new: Some(Value::Int(20)),
            }]
        );
    }

    #[test]
    fn missing_object_is_an_error() {
        let mut d = doc();
        let ghost = ObjectId {
            actor: d.actor(),
            serial: 99,
        };
        assert_eq!(d.set(ghost, "x", 1i64), Err(ModelError::NotFound(ghost)));
        assert_eq!(d.erase(ghost), Err(ModelError::NotFound(ghost)));
        assert!(!d.has_pending());
    }

    #[test]
    fn field_generations_track_changes() {
        let mut d = doc();
        let a = d.insert("object", [("x", Value::Int(0)), ("y", Value::Int(0))]);
        let seen = d.generation();
        d.set(a, "x", 5i64).unwrap();
        let record = d.get(a).unwrap();
        assert!(record.changed_since("x", seen));
        assert!(!record.changed_since("y", seen));
    }

    #[test]
    fn discard_pending_reverts_everything() {
        let mut d = doc();
        let a = d.insert("object", [("x", Value::Int(1))]);
        d.take_pending();
        d.set(a, "x", 2i64).unwrap();
        let b = d.insert("object", Vec::<(String, Value)>::new());
        d.erase(a).unwrap();
        assert_eq!(d.discard_pending(), 3);
        assert_eq!(d.get(a).unwrap().int("x"), Some(1));
        assert!(!d.contains(b));
        assert!(!d.has_pending());
    }

    #[test]
    fn inverse_round_trip_restores_state() {
        let mut d = doc();
        let a = d.insert("object", [("x", Value::Int(1))]);
        d.set(a, "x", 2i64).unwrap();
        d.unset(a, "x").unwrap();
        let ops = d.take_pending();
        d.replay(&invert(&ops));
        assert!(!d.contains(a));
        let undo = d.take_pending();
        d.replay(&invert(&undo));
        assert!(d.contains(a));
        assert_eq!(d.get(a).unwrap().get("x"), None);
    }

    #[test]
    fn apply_remote_counts_conflicts() {
        let remote_actor = ActorId::random();
        let mut remote = Document::new(remote_actor);
        let obj = remote.insert("object", [("text", Value::from("bang"))]);
        let ops = remote.take_pending();

        let mut d = doc();
        let tx = Transaction {
            actor: remote_actor,
            seq: 1,
            label: "add".into(),
            ops,
        };
        assert_eq!(d.apply(&tx).applied, 1);
        // Applying again collides with the existing record.
        assert_eq!(d.apply(&tx).conflicts, 1);
        assert!(d.contains(obj));
        assert!(!d.has_pending());
    }

    #[test]
    fn shielded_fields_are_not_overwritten() {
        let remote_actor = ActorId::random();
        let mut d = doc();
        let a = d.insert("object", [("x", Value::Int(1)), ("y", Value::Int(1))]);
        d.take_pending();

        let tx = Transaction {
            actor: remote_actor,
            seq: 1,
            label: "move".into(),
            ops: vec![
                Operation::Set {
                    id: a,
                    field: "x".into(),
                    old: None,
                    new: Some(Value::Int(9)),
                },
                Operation::Set {
                    id: a,
                    field: "y".into(),
                    old: None,
                    new: Some(Value::Int(9)),
                },
            ],
        };
        let shield = Shield::from([(a, "x".to_string())]);
        let report = d.apply_shielded(&tx, &shield);
        assert_eq!(report.superseded, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(d.get(a).unwrap().int("x"), Some(1));
        assert_eq!(d.get(a).unwrap().int("y"), Some(9));
    }

    #[test]
    fn changes_are_reported_in_order() {
        let mut d = doc();
        let a = d.insert("object", [("x", Value::Int(1))]);
        d.set(a, "x", 3i64).unwrap();
        d.erase(a).unwrap();
        let changes: Vec<_> = d.take_changes().into_iter().collect();
        assert!(matches!(changes[0], Change::Added { id, .. } if id == a));
        assert!(matches!(&changes[1], Change::Changed { field, .. } if field == "x"));
        assert!(matches!(&changes[2], Change::Removed { record, .. } if record.int("x") == Some(3)));
        assert!(!d.has_changes());
    }

    #[test]
    fn own_ids_from_snapshot_advance_serial() {
        let actor = ActorId::random();
        let mut first = Document::new(actor);
        first.insert("object", Vec::<(String, Value)>::new());
        first.insert("object", Vec::<(String, Value)>::new());
        let tx = Transaction {
            actor,
            seq: 1,
            label: String::new(),
            ops: first.take_pending(),
        };

        let mut restarted = Document::new(actor);
        restarted.apply(&tx);
        let next = restarted.insert("object", Vec::<(String, Value)>::new());
        assert_eq!(next.serial, 3);
    }
}
