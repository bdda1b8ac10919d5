//! The scene bridge: loop-free bidirectional sync between the local
//! scene and the replicated document.
//!
//! Local scene events are captured into the object table under the
//! `"local"` origin tag; document changes with any other origin are
//! applied back to the scene. Two guards prevent the echo loop, and both
//! are required:
//!
//! - The origin-tag check on the document side skips the bridge's own
//!   writes, but cannot stop a scene handler firing synchronously while
//!   a remote change is being applied to the scene.
//! - The `applying_remote` flag suppresses scene handlers during a
//!   remote apply, but cannot tell a late echo of our own write from a
//!   genuinely remote change.
//!
//! A per-object in-flight set additionally blocks re-entrant sync for
//! the same object id while a capture or apply for that id is running.
//!
//! Both the suppress flag and the in-flight set are scoped to the bridge
//! instance and managed by RAII guards — no ambient global state. The
//! subscriptions the bridge holds are explicit resources: acquired in
//! [`SceneBridge::attach`], released on detach or drop.

#[cfg(test)]
#[path = "bridge_test.rs"]
mod bridge_test;

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use replica::document::{SETTING_DIMENSIONS, SETTING_PRESET_NAME, ORIGIN_LOCAL};
use replica::{Change, ChangeKind, ObjectRecord, ReplicatedDocument, Subscription};
use serde_json::json;
use tracing::warn;

use crate::scene::{SceneEvent, SceneHandle, SceneKey, SceneObject, SceneSubscription};

struct BridgeShared {
    applying_remote: Cell<bool>,
    in_flight: RefCell<HashSet<String>>,
}

/// Clears the suppress flag when the remote apply that set it ends.
struct RemoteApplyGuard<'a>(&'a Cell<bool>);

impl<'a> RemoteApplyGuard<'a> {
    fn new(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RemoteApplyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Removes an object id from the in-flight set when its sync operation
/// ends. `acquire` returns `None` if a sync for that id is already
/// running.
struct InFlightGuard<'a> {
    set: &'a RefCell<HashSet<String>>,
    id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a RefCell<HashSet<String>>, id: &str) -> Option<Self> {
        if !set.borrow_mut().insert(id.to_owned()) {
            return None;
        }
        Some(Self { set, id: id.to_owned() })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.borrow_mut().remove(&self.id);
    }
}

/// Keeps one scene and one document mutually consistent for as long as
/// it is attached.
pub struct SceneBridge {
    scene: SceneHandle,
    doc: ReplicatedDocument,
    scene_subscription: Option<SceneSubscription>,
    object_subscription: Option<Subscription>,
    settings_subscription: Option<Subscription>,
}

impl SceneBridge {
    /// Wire the scene and document together. The returned bridge owns
    /// the three subscriptions it registered.
    #[must_use]
    pub fn attach(scene: SceneHandle, doc: ReplicatedDocument) -> Self {
        let shared = Rc::new(BridgeShared {
            applying_remote: Cell::new(false),
            in_flight: RefCell::new(HashSet::new()),
        });

        let scene_subscription = {
            let scene = scene.clone();
            let doc = doc.clone();
            let shared = Rc::clone(&shared);
            scene.clone().on_event(move |event| {
                if shared.applying_remote.get() {
                    return;
                }
                handle_scene_event(&scene, &doc, &shared, event);
            })
        };

        let object_subscription = {
            let scene = scene.clone();
            let doc = doc.clone();
            let shared = Rc::clone(&shared);
            doc.clone().observe_objects(move |changes| {
                for change in changes {
                    if change.origin == ORIGIN_LOCAL {
                        continue;
                    }
                    apply_object_change(&scene, &doc, &shared, change);
                }
            })
        };

        let settings_subscription = {
            let scene = scene.clone();
            let doc = doc.clone();
            let shared = Rc::clone(&shared);
            doc.clone().observe_settings(move |changes| {
                for change in changes {
                    if change.origin == ORIGIN_LOCAL {
                        continue;
                    }
                    apply_settings_change(&scene, &doc, &shared, change);
                }
            })
        };

        Self {
            scene,
            doc,
            scene_subscription: Some(scene_subscription),
            object_subscription: Some(object_subscription),
            settings_subscription: Some(settings_subscription),
        }
    }

    /// Tear the bridge down, releasing its subscriptions.
    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(subscription) = self.scene_subscription.take() {
            self.scene.off(subscription);
        }
        if let Some(subscription) = self.object_subscription.take() {
            self.doc.unsubscribe(subscription);
        }
        if let Some(subscription) = self.settings_subscription.take() {
            self.doc.unsubscribe(subscription);
        }
    }
}

impl Drop for SceneBridge {
    fn drop(&mut self) {
        self.release();
    }
}

// -- local → document --------------------------------------------------------

fn handle_scene_event(
    scene: &SceneHandle,
    doc: &ReplicatedDocument,
    shared: &BridgeShared,
    event: &SceneEvent,
) {
    match event {
        SceneEvent::ObjectAdded(key)
        | SceneEvent::ObjectModified(key)
        | SceneEvent::PathCompleted(key) => capture_object(scene, doc, shared, *key),
        SceneEvent::ObjectRemoved { id: Some(id), .. } => {
            let Some(_guard) = InFlightGuard::acquire(&shared.in_flight, id) else {
                return;
            };
            let id = id.clone();
            doc.mutate(ORIGIN_LOCAL, |tx| {
                tx.remove_object(id);
                Ok(())
            });
        }
        // An object that never got an id was never captured; nothing to
        // remove from the table.
        SceneEvent::ObjectRemoved { id: None, .. } => {}
        SceneEvent::DimensionsChanged => {
            let settings = scene.settings();
            doc.mutate(ORIGIN_LOCAL, |tx| {
                tx.set_setting(
                    SETTING_DIMENSIONS,
                    json!({"width": settings.width, "height": settings.height}),
                );
                Ok(())
            });
        }
        SceneEvent::PresetChanged => {
            let Some(preset_name) = scene.settings().preset_name else {
                return;
            };
            doc.mutate(ORIGIN_LOCAL, |tx| {
                tx.set_setting(SETTING_PRESET_NAME, json!(preset_name));
                Ok(())
            });
        }
    }
}

/// Serialize one scene object into the object table, assigning a stable
/// id first if it lacks one.
fn capture_object(scene: &SceneHandle, doc: &ReplicatedDocument, shared: &BridgeShared, key: SceneKey) {
    let Some(id) = scene.ensure_id(key) else {
        return;
    };
    let Some(_guard) = InFlightGuard::acquire(&shared.in_flight, &id) else {
        return;
    };
    let Some(object) = scene.object(key) else {
        return;
    };

    let value = object.to_record(&id).to_value();
    doc.mutate(ORIGIN_LOCAL, |tx| {
        tx.set_object(id, value);
        Ok(())
    });
}

// -- document → local --------------------------------------------------------

fn apply_object_change(
    scene: &SceneHandle,
    doc: &ReplicatedDocument,
    shared: &BridgeShared,
    change: &Change,
) {
    let id = change.key.as_str();
    let Some(_guard) = InFlightGuard::acquire(&shared.in_flight, id) else {
        return;
    };
    let _suppress = RemoteApplyGuard::new(&shared.applying_remote);

    match change.kind {
        ChangeKind::Removed => {
            if let Some(key) = scene.find_by_id(id) {
                scene.remove_object(key);
            }
        }
        ChangeKind::Inserted | ChangeKind::Updated => {
            let Some(value) = doc.object(id) else {
                return;
            };
            let record = match ObjectRecord::from_value(&value) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, object_id = id, "dropping undeserializable object record");
                    return;
                }
            };

            let object = SceneObject::from_record(record);
            if let Some(existing) = scene.find_by_id(id) {
                scene.remove_object(existing);
            }
            scene.add_object(object);
        }
    }
}

fn apply_settings_change(
    scene: &SceneHandle,
    doc: &ReplicatedDocument,
    shared: &BridgeShared,
    change: &Change,
) {
    let _suppress = RemoteApplyGuard::new(&shared.applying_remote);

    match change.key.as_str() {
        SETTING_DIMENSIONS => {
            let Some(value) = doc.setting(SETTING_DIMENSIONS) else {
                return;
            };
            let (Some(width), Some(height)) = (
                value.get("width").and_then(serde_json::Value::as_f64),
                value.get("height").and_then(serde_json::Value::as_f64),
            ) else {
                warn!(?value, "dropping malformed dimensions setting");
                return;
            };
            scene.set_dimensions(width, height);
        }
        SETTING_PRESET_NAME => {
            let Some(value) = doc.setting(SETTING_PRESET_NAME) else {
                return;
            };
            let Some(preset_name) = value.as_str() else {
                warn!(?value, "dropping malformed preset setting");
                return;
            };
            scene.set_preset(preset_name);
        }
        other => {
            warn!(key = other, "ignoring unknown settings key");
        }
    }
}
