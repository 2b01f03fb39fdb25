//! Actors and transactions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Operation;

/// Identity of one editing client.
///
/// Every object a client creates and every transaction it commits carries its
/// actor id, so ids never collide across peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(Uuid);

impl ActorId {
    /// Creates a fresh random actor id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses an actor id from its hyphenated UUID form.
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text).ok().map(Self)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl core::fmt::Display for ActorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // First group is enough to tell peers apart in logs.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// One atomic, causally grouped unit of document change.
///
/// `seq` starts at 1 and increases by one for every transaction an actor
/// commits, so `(actor, seq)` identifies a transaction uniquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Originating actor.
    pub actor: ActorId,
    /// Per-actor sequence number.
    pub seq: u64,
    /// Undo label (e.g. "Add object").
    pub label: String,
    /// Operations in application order.
    pub ops: Vec<Operation>,
}

impl Transaction {
    /// Returns true if the transaction carries no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
