//! Observable document wrapper for the client side.
//!
//! [`ReplicatedDocument`] wraps a [`DocState`] with explicit subscription
//! interfaces: `observe_objects`/`observe_settings` return a
//! [`Subscription`] handle, and `unsubscribe` is an explicit teardown —
//! the scene bridge acquires its observers on attach and releases them on
//! detach like any other resource.
//!
//! Handles are `Clone` and share one underlying document; the client runs
//! a single cooperative event loop, so the shared state is `Rc`-based and
//! observers are dispatched synchronously after each commit, once the
//! internal borrow has been released. Observers must not mutate the
//! document from inside a notification (the bridge's origin-tag check
//! upholds this: its own writes come back tagged and are skipped).

#[cfg(test)]
#[path = "observable_test.rs"]
mod observable_test;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::document::{Change, DocState, Table, TxnAbort, TxnView, ORIGIN_REMOTE};
use crate::update::Update;

type Handler = Box<dyn FnMut(&[Change])>;
type UpdateSink = Box<dyn FnMut(Vec<u8>)>;

/// Handle for a registered observer. Pass back to
/// [`ReplicatedDocument::unsubscribe`] to release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    table: Table,
    id: u64,
}

#[derive(Default)]
struct Observers {
    objects: Vec<(u64, Handler)>,
    settings: Vec<(u64, Handler)>,
}

/// The client's replicated document: shared state plus observers and the
/// outgoing update sink.
#[derive(Clone)]
pub struct ReplicatedDocument {
    state: Rc<RefCell<DocState>>,
    observers: Rc<RefCell<Observers>>,
    update_sink: Rc<RefCell<Option<UpdateSink>>>,
    next_subscription: Rc<Cell<u64>>,
}

impl ReplicatedDocument {
    /// Create an empty document for the given replica id.
    #[must_use]
    pub fn new(replica: Uuid) -> Self {
        Self {
            state: Rc::new(RefCell::new(DocState::new(replica))),
            observers: Rc::new(RefCell::new(Observers::default())),
            update_sink: Rc::new(RefCell::new(None)),
            next_subscription: Rc::new(Cell::new(0)),
        }
    }

    /// Run a mutation transaction under `origin`. The delta of a
    /// non-remote transaction is forwarded to the update sink; all
    /// resulting changes are dispatched to observers.
    pub fn mutate<F>(&self, origin: &str, mutate: F)
    where
        F: FnOnce(&mut TxnView) -> Result<(), TxnAbort>,
    {
        let outcome = self.state.borrow_mut().transact(origin, mutate);

        if origin != ORIGIN_REMOTE && !outcome.delta.is_empty() {
            if let Some(sink) = self.update_sink.borrow_mut().as_mut() {
                sink(outcome.delta.encode());
            }
        }
        self.dispatch(&outcome.changes);
    }

    /// Decode and merge an update received from the transport. Malformed
    /// frames are logged and dropped; they never affect other updates.
    pub fn apply_remote(&self, bytes: &[u8]) {
        let update = match Update::decode(bytes) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "dropping malformed update frame");
                return;
            }
        };
        let changes = self.state.borrow_mut().apply_update(&update, ORIGIN_REMOTE);
        self.dispatch(&changes);
    }

    /// The document's full state as an encoded update, for initial
    /// reconciliation after (re)connecting.
    #[must_use]
    pub fn encoded_full_update(&self) -> Vec<u8> {
        self.state.borrow().full_update().encode()
    }

    /// Register an object-table observer.
    pub fn observe_objects(&self, handler: impl FnMut(&[Change]) + 'static) -> Subscription {
        self.register(Table::Objects, Box::new(handler))
    }

    /// Register a settings-table observer.
    pub fn observe_settings(&self, handler: impl FnMut(&[Change]) + 'static) -> Subscription {
        self.register(Table::Settings, Box::new(handler))
    }

    /// Release a previously registered observer.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut observers = self.observers.borrow_mut();
        let list = match subscription.table {
            Table::Objects => &mut observers.objects,
            Table::Settings => &mut observers.settings,
        };
        list.retain(|(id, _)| *id != subscription.id);
    }

    /// Install the sink that receives each non-remote transaction's
    /// encoded delta (the transport's outgoing stream).
    pub fn set_update_sink(&self, sink: impl FnMut(Vec<u8>) + 'static) {
        *self.update_sink.borrow_mut() = Some(Box::new(sink));
    }

    /// Clone an object-table value by id.
    #[must_use]
    pub fn object(&self, id: &str) -> Option<Value> {
        self.state.borrow().object(id).cloned()
    }

    /// Number of live objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.state.borrow().object_count()
    }

    /// Clone a settings-table value by key.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<Value> {
        self.state.borrow().setting(key).cloned()
    }

    /// Read access to the underlying state for callers that need more
    /// than single-key lookups.
    pub fn with_state<R>(&self, read: impl FnOnce(&DocState) -> R) -> R {
        read(&self.state.borrow())
    }

    fn register(&self, table: Table, handler: Handler) -> Subscription {
        let id = self.next_subscription.get();
        self.next_subscription.set(id + 1);
        let mut observers = self.observers.borrow_mut();
        match table {
            Table::Objects => observers.objects.push((id, handler)),
            Table::Settings => observers.settings.push((id, handler)),
        }
        Subscription { table, id }
    }

    /// Fan changes out to the per-table observer lists. Settings changes
    /// never reach object observers and vice versa.
    fn dispatch(&self, changes: &[Change]) {
        if changes.is_empty() {
            return;
        }
        let object_changes: Vec<Change> =
            changes.iter().filter(|c| c.table == Table::Objects).cloned().collect();
        let settings_changes: Vec<Change> =
            changes.iter().filter(|c| c.table == Table::Settings).cloned().collect();

        let mut observers = self.observers.borrow_mut();
        if !object_changes.is_empty() {
            for (_, handler) in &mut observers.objects {
                handler(&object_changes);
            }
        }
        if !settings_changes.is_empty() {
            for (_, handler) in &mut observers.settings {
                handler(&settings_changes);
            }
        }
    }
}
