//! The replicated document: two last-writer-wins tables and the
//! transactional mutation surface.
//!
//! One [`DocState`] exists per project on every replica (each connected
//! client plus the server's room copy). It holds the object table
//! (object id → serialized record) and the settings table (fixed keys:
//! `dimensions`, `presetName`). Every write carries a [`Stamp`]; a write
//! applies iff its stamp is greater than the key's current stamp, which
//! makes merging order-independent and idempotent: replicas that see the
//! same set of updates converge regardless of delivery order.
//!
//! Deletions keep no tombstone value. Presence or absence of a key in the
//! live table is the liveness signal; only the deletion's stamp is
//! retained (the grave map) so a delete still wins against a concurrent
//! or late-arriving write of the same key.

#[cfg(test)]
#[path = "document_test.rs"]
mod document_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::clock::{LamportClock, Stamp};
use crate::update::{Update, UpdateEntry};

/// Origin tag for transactions produced by the local scene bridge.
pub const ORIGIN_LOCAL: &str = "local";

/// Origin tag for updates merged from the transport.
pub const ORIGIN_REMOTE: &str = "remote";

/// Settings key for canvas dimensions.
pub const SETTING_DIMENSIONS: &str = "dimensions";

/// Settings key for the canvas preset name.
pub const SETTING_PRESET_NAME: &str = "presetName";

/// Which of the document's two tables a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Objects,
    Settings,
}

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
}

/// One granular change notification: the key, what happened to it, and
/// the origin tag of the transaction that produced it.
#[derive(Debug, Clone)]
pub struct Change {
    pub table: Table,
    pub key: String,
    pub kind: ChangeKind,
    pub origin: String,
}

// -- LWW table ---------------------------------------------------------------

/// One last-writer-wins map: live entries plus grave stamps for deleted
/// keys. The grave map holds merge metadata only, never values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LwwTable {
    live: HashMap<String, (Stamp, Value)>,
    graves: HashMap<String, Stamp>,
}

impl LwwTable {
    fn get(&self, key: &str) -> Option<&Value> {
        self.live.get(key).map(|(_, value)| value)
    }

    /// The winning stamp currently recorded for `key`, live or grave.
    fn stamp_of(&self, key: &str) -> Option<Stamp> {
        match (self.live.get(key), self.graves.get(key)) {
            (Some((stamp, _)), None) => Some(*stamp),
            (None, Some(stamp)) => Some(*stamp),
            (None, None) => None,
            // A key is never simultaneously live and buried.
            (Some((live, _)), Some(grave)) => Some((*live).max(*grave)),
        }
    }

    /// Integrate one stamped write. `value: None` is a deletion. Returns
    /// the resulting change kind, or `None` if the write lost to an equal
    /// or newer stamp (which is also what makes re-application a no-op).
    fn integrate(&mut self, key: &str, stamp: Stamp, value: Option<Value>) -> Option<ChangeKind> {
        if let Some(current) = self.stamp_of(key) {
            if stamp <= current {
                return None;
            }
        }

        match value {
            Some(value) => {
                self.graves.remove(key);
                let kind = if self.live.contains_key(key) {
                    ChangeKind::Updated
                } else {
                    ChangeKind::Inserted
                };
                self.live.insert(key.to_owned(), (stamp, value));
                Some(kind)
            }
            None => {
                let was_live = self.live.remove(key).is_some();
                self.graves.insert(key.to_owned(), stamp);
                // Burying an unknown key records the stamp but reports no
                // change: there is nothing for observers to remove.
                was_live.then_some(ChangeKind::Removed)
            }
        }
    }

    /// All entries (live values and grave stamps) as update entries for
    /// full-state reconciliation. Graves must travel too, otherwise a
    /// deletion is lost when a replica resyncs from before the add.
    fn entries(&self, table: Table) -> impl Iterator<Item = UpdateEntry> + '_ {
        let live = self.live.iter().map(move |(key, (stamp, value))| UpdateEntry {
            table,
            key: key.clone(),
            stamp: *stamp,
            value: Some(value.clone()),
        });
        let graves = self.graves.iter().map(move |(key, stamp)| UpdateEntry {
            table,
            key: key.clone(),
            stamp: *stamp,
            value: None,
        });
        live.chain(graves)
    }
}

// -- document ----------------------------------------------------------------

/// Snapshot form of a document, as persisted by the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    clock: u64,
    objects: LwwTable,
    settings: LwwTable,
}

/// The replicated document state for one project.
#[derive(Debug, Clone)]
pub struct DocState {
    clock: LamportClock,
    objects: LwwTable,
    settings: LwwTable,
}

/// Outcome of a committed transaction: the granular changes it produced
/// and the delta update to ship to peers. Both are empty if the mutation
/// closure failed or wrote nothing.
#[derive(Debug, Default)]
pub struct TxnOutcome {
    pub changes: Vec<Change>,
    pub delta: Update,
}

impl DocState {
    /// Create an empty document owned by the given replica.
    #[must_use]
    pub fn new(replica: Uuid) -> Self {
        Self {
            clock: LamportClock::new(replica),
            objects: LwwTable::default(),
            settings: LwwTable::default(),
        }
    }

    /// Rebuild a document from a persisted snapshot under a fresh replica
    /// identity. The clock resumes at the snapshot's high-water mark so
    /// new local writes order after everything the snapshot contains.
    #[must_use]
    pub fn from_snapshot(replica: Uuid, snapshot: Snapshot) -> Self {
        Self {
            clock: LamportClock::resume(replica, snapshot.clock),
            objects: snapshot.objects,
            settings: snapshot.settings,
        }
    }

    /// Snapshot the document for persistence.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            clock: self.clock.current(),
            objects: self.objects.clone(),
            settings: self.settings.clone(),
        }
    }

    /// The replica id stamping this document's local writes.
    #[must_use]
    pub fn replica(&self) -> Uuid {
        self.clock.replica()
    }

    /// Current Lamport counter. Used by the persistence task to detect
    /// writes that landed while a flush was in flight.
    #[must_use]
    pub fn current_clock(&self) -> u64 {
        self.clock.current()
    }

    /// Look up an object-table value by id.
    #[must_use]
    pub fn object(&self, id: &str) -> Option<&Value> {
        self.objects.get(id)
    }

    /// Ids of all live objects, in no particular order.
    pub fn object_ids(&self) -> impl Iterator<Item = &str> {
        self.objects.live.keys().map(String::as_str)
    }

    /// All live object-table entries, in no particular order.
    pub fn objects(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.objects
            .live
            .iter()
            .map(|(key, (_, value))| (key.as_str(), value))
    }

    /// Number of live objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.live.len()
    }

    /// Look up a settings-table value by key.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Run `mutate` against a transaction view and commit its staged
    /// writes atomically under `origin`.
    ///
    /// Each staged write gets its own clock tick, so within one
    /// transaction later writes to a key supersede earlier ones (an
    /// add-then-delete commits as a delete that wins everywhere). A
    /// mutation closure that returns an error commits nothing; the
    /// failure is logged and an empty outcome returned, per the contract
    /// that malformed input never crashes or half-applies.
    pub fn transact<F>(&mut self, origin: &str, mutate: F) -> TxnOutcome
    where
        F: FnOnce(&mut TxnView) -> Result<(), TxnAbort>,
    {
        let mut view = TxnView { ops: Vec::new() };
        if let Err(abort) = mutate(&mut view) {
            warn!(origin, reason = %abort.0, "document transaction aborted");
            return TxnOutcome::default();
        }

        let mut changes = Vec::new();
        let mut entries = Vec::new();
        for op in view.ops {
            let stamp = self.clock.tick();
            let table = self.table_mut(op.table);
            let kind = table.integrate(&op.key, stamp, op.value.clone());
            if let Some(kind) = kind {
                changes.push(Change {
                    table: op.table,
                    key: op.key.clone(),
                    kind,
                    origin: origin.to_owned(),
                });
            }
            entries.push(UpdateEntry { table: op.table, key: op.key, stamp, value: op.value });
        }

        TxnOutcome { changes, delta: Update { entries } }
    }

    /// Merge a decoded update produced elsewhere. Idempotent: entries
    /// that lost (or already applied) produce no change.
    pub fn apply_update(&mut self, update: &Update, origin: &str) -> Vec<Change> {
        let mut changes = Vec::new();
        for entry in &update.entries {
            self.clock.observe(entry.stamp);
            let table = self.table_mut(entry.table);
            if let Some(kind) = table.integrate(&entry.key, entry.stamp, entry.value.clone()) {
                changes.push(Change {
                    table: entry.table,
                    key: entry.key.clone(),
                    kind,
                    origin: origin.to_owned(),
                });
            }
        }
        changes
    }

    /// The document's entire state as one update, graves included. Used
    /// for initial reconciliation when a connection reaches the server:
    /// both sides exchange this and merge.
    #[must_use]
    pub fn full_update(&self) -> Update {
        let entries = self
            .objects
            .entries(Table::Objects)
            .chain(self.settings.entries(Table::Settings))
            .collect();
        Update { entries }
    }

    fn table_mut(&mut self, table: Table) -> &mut LwwTable {
        match table {
            Table::Objects => &mut self.objects,
            Table::Settings => &mut self.settings,
        }
    }
}

// -- transactions ------------------------------------------------------------

/// Reason a mutation closure abandoned its transaction.
#[derive(Debug)]
pub struct TxnAbort(pub String);

impl TxnAbort {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

struct StagedOp {
    table: Table,
    key: String,
    value: Option<Value>,
}

/// Staged view handed to a mutation closure. Writes are buffered and only
/// reach the document if the closure returns `Ok`.
pub struct TxnView {
    ops: Vec<StagedOp>,
}

impl TxnView {
    /// Insert or replace an object-table entry.
    pub fn set_object(&mut self, id: impl Into<String>, value: Value) {
        self.ops.push(StagedOp { table: Table::Objects, key: id.into(), value: Some(value) });
    }

    /// Remove an object-table entry.
    pub fn remove_object(&mut self, id: impl Into<String>) {
        self.ops.push(StagedOp { table: Table::Objects, key: id.into(), value: None });
    }

    /// Set a settings-table entry.
    pub fn set_setting(&mut self, key: impl Into<String>, value: Value) {
        self.ops.push(StagedOp { table: Table::Settings, key: key.into(), value: Some(value) });
    }
}
