//! How boxes and links are stored in the shared document.
//!
//! A box is a record of class [`OBJECT_CLASS`]:
//!
//! | field | value |
//! |-------|-------|
//! | `text` | box text, e.g. `"+~ 0.5"` |
//! | `inlets`, `outlets` | pin counts when the box was typed |
//! | `x`, `y` | position |
//!
//! A link is a record of class [`LINK_CLASS`] with `from`/`to` references and
//! `outlet`/`inlet` indices.

use patchbay_sync::{ObjectId, Record, Value};

/// Record class of boxes.
pub const OBJECT_CLASS: &str = "object";

/// Record class of links.
pub const LINK_CLASS: &str = "link";

/// A box as stored in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpec {
    /// Box text.
    pub text: String,
    /// Number of inlets.
    pub inlets: usize,
    /// Number of outlets.
    pub outlets: usize,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl ObjectSpec {
    /// Reads a box record. Returns `None` for records of another class.
    pub fn from_record(record: &Record) -> Option<Self> {
        if record.class() != OBJECT_CLASS {
            return None;
        }
        Some(Self {
            text: record.text("text").unwrap_or_default().to_string(),
            inlets: count(record, "inlets"),
            outlets: count(record, "outlets"),
            x: record.float("x").unwrap_or(0.0),
            y: record.float("y").unwrap_or(0.0),
        })
    }

    /// Returns the record fields.
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("text", Value::from(self.text.as_str())),
            ("inlets", Value::Int(self.inlets as i64)),
            ("outlets", Value::Int(self.outlets as i64)),
            ("x", Value::Float(self.x)),
            ("y", Value::Float(self.y)),
        ]
    }
}

/// A link as stored in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkSpec {
    /// Sending box.
    pub from: ObjectId,
    /// Outlet on the sender.
    pub outlet: usize,
    /// Receiving box.
    pub to: ObjectId,
    /// Inlet on the receiver.
    pub inlet: usize,
}

impl LinkSpec {
    /// Reads a link record. Returns `None` for other classes or incomplete
    /// records.
    pub fn from_record(record: &Record) -> Option<Self> {
        if record.class() != LINK_CLASS {
            return None;
        }
        Some(Self {
            from: record.object("from")?,
            outlet: usize::try_from(record.int("outlet")?).ok()?,
            to: record.object("to")?,
            inlet: usize::try_from(record.int("inlet")?).ok()?,
        })
    }

    /// Returns the record fields.
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("from", Value::Ref(self.from)),
            ("outlet", Value::Int(self.outlet as i64)),
            ("to", Value::Ref(self.to)),
            ("inlet", Value::Int(self.inlet as i64)),
        ]
    }

    /// Returns true if either end is `id`.
    pub fn touches(&self, id: ObjectId) -> bool {
        self.from == id || self.to == id
    }
}

impl core::fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{} -> {}:{}", self.from, self.outlet, self.to, self.inlet)
    }
}

fn count(record: &Record, field: &str) -> usize {
    record
        .int(field)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}
