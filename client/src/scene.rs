//! The local mutable scene graph.
//!
//! This is the rendered side of the world: live objects keyed by an
//! internal [`SceneKey`], canvas-wide settings, and an explicit event
//! subscription interface. Objects carry an optional stable id — freshly
//! drawn objects have none until the sync layer assigns one.
//!
//! Mutations go through [`SceneHandle`], which releases its internal
//! borrow before dispatching events, so handlers are free to read the
//! scene (or write the document) synchronously.

#[cfg(test)]
#[path = "scene_test.rs"]
mod scene_test;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use replica::{Fill, ObjectRecord, ShapeKind};
use uuid::Uuid;

/// Internal handle to one live scene object. Stable for the object's
/// lifetime in this scene; never shared across clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneKey(u64);

/// One live object on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    /// Stable shared id, assigned on first sync. `None` for objects that
    /// have not been captured into the document yet.
    pub id: Option<String>,
    pub kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub fill: Fill,
    pub stroke: Option<String>,
    pub stroke_width: f64,
    pub path_data: Option<String>,
    pub text: Option<String>,
}

impl SceneObject {
    /// Snapshot this object as a record under the given stable id.
    #[must_use]
    pub fn to_record(&self, id: &str) -> ObjectRecord {
        ObjectRecord {
            id: id.to_owned(),
            kind: self.kind,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            fill: self.fill.clone(),
            stroke: self.stroke.clone(),
            stroke_width: self.stroke_width,
            path_data: self.path_data.clone(),
            text: self.text.clone(),
        }
    }

    /// Rebuild a live object from a record, reattaching its id.
    #[must_use]
    pub fn from_record(record: ObjectRecord) -> Self {
        Self {
            id: Some(record.id),
            kind: record.kind,
            x: record.x,
            y: record.y,
            width: record.width,
            height: record.height,
            rotation: record.rotation,
            fill: record.fill,
            stroke: record.stroke,
            stroke_width: record.stroke_width,
            path_data: record.path_data,
            text: record.text,
        }
    }
}

/// A scene mutation, as observed by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    ObjectAdded(SceneKey),
    ObjectModified(SceneKey),
    /// Carries the removed object's stable id, if it had one — the key
    /// no longer resolves once the object is gone.
    ObjectRemoved { key: SceneKey, id: Option<String> },
    /// A free-hand drawing gesture finished and produced a path object.
    PathCompleted(SceneKey),
    DimensionsChanged,
    PresetChanged,
}

/// Canvas-wide settings, distinct from per-object state.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasSettings {
    pub width: f64,
    pub height: f64,
    pub preset_name: Option<String>,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self { width: 1280.0, height: 720.0, preset_name: None }
    }
}

/// Scene state behind the handle.
#[derive(Debug, Default)]
pub struct Scene {
    next_key: u64,
    objects: HashMap<u64, SceneObject>,
    settings: CanvasSettings,
}

type EventHandler = Box<dyn FnMut(&SceneEvent)>;

/// Handle for a subscribed scene-event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneSubscription(u64);

/// Shared handle to the scene. Clones share one underlying scene.
#[derive(Clone, Default)]
pub struct SceneHandle {
    inner: Rc<RefCell<Scene>>,
    handlers: Rc<RefCell<Vec<(u64, EventHandler)>>>,
    next_subscription: Rc<Cell<u64>>,
}

impl SceneHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- mutation ------------------------------------------------------------

    /// Add an object to the scene.
    pub fn add_object(&self, object: SceneObject) -> SceneKey {
        let key = self.insert(object);
        self.emit(&SceneEvent::ObjectAdded(key));
        key
    }

    /// Add a finished free-hand path to the scene.
    pub fn complete_path(&self, object: SceneObject) -> SceneKey {
        let key = self.insert(object);
        self.emit(&SceneEvent::PathCompleted(key));
        key
    }

    /// Mutate an object in place. Returns false if the key is gone.
    pub fn modify_object(&self, key: SceneKey, mutate: impl FnOnce(&mut SceneObject)) -> bool {
        {
            let mut scene = self.inner.borrow_mut();
            let Some(object) = scene.objects.get_mut(&key.0) else {
                return false;
            };
            mutate(object);
        }
        self.emit(&SceneEvent::ObjectModified(key));
        true
    }

    /// Remove an object, returning it if it existed.
    pub fn remove_object(&self, key: SceneKey) -> Option<SceneObject> {
        let removed = self.inner.borrow_mut().objects.remove(&key.0);
        if let Some(object) = &removed {
            self.emit(&SceneEvent::ObjectRemoved { key, id: object.id.clone() });
        }
        removed
    }

    /// Resize the canvas.
    pub fn set_dimensions(&self, width: f64, height: f64) {
        {
            let mut scene = self.inner.borrow_mut();
            scene.settings.width = width;
            scene.settings.height = height;
        }
        self.emit(&SceneEvent::DimensionsChanged);
    }

    /// Switch the canvas preset.
    pub fn set_preset(&self, preset_name: impl Into<String>) {
        self.inner.borrow_mut().settings.preset_name = Some(preset_name.into());
        self.emit(&SceneEvent::PresetChanged);
    }

    /// Return the object's stable id, assigning a fresh one first if it
    /// has none. Emits no event. Returns `None` if the key is gone.
    pub fn ensure_id(&self, key: SceneKey) -> Option<String> {
        let mut scene = self.inner.borrow_mut();
        let object = scene.objects.get_mut(&key.0)?;
        Some(
            object
                .id
                .get_or_insert_with(|| Uuid::new_v4().to_string())
                .clone(),
        )
    }

    // -- queries -------------------------------------------------------------

    /// Clone an object by key.
    #[must_use]
    pub fn object(&self, key: SceneKey) -> Option<SceneObject> {
        self.inner.borrow().objects.get(&key.0).cloned()
    }

    /// Find a live object's key by its stable id.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<SceneKey> {
        self.inner
            .borrow()
            .objects
            .iter()
            .find(|(_, object)| object.id.as_deref() == Some(id))
            .map(|(key, _)| SceneKey(*key))
    }

    /// Number of live objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.inner.borrow().objects.len()
    }

    /// Current canvas settings.
    #[must_use]
    pub fn settings(&self) -> CanvasSettings {
        self.inner.borrow().settings.clone()
    }

    // -- subscriptions -------------------------------------------------------

    /// Subscribe to scene events. The handler runs synchronously after
    /// each mutation, once the scene's internal borrow is released.
    pub fn on_event(&self, handler: impl FnMut(&SceneEvent) + 'static) -> SceneSubscription {
        let id = self.next_subscription.get();
        self.next_subscription.set(id + 1);
        self.handlers.borrow_mut().push((id, Box::new(handler)));
        SceneSubscription(id)
    }

    /// Remove a subscribed handler.
    pub fn off(&self, subscription: SceneSubscription) {
        self.handlers.borrow_mut().retain(|(id, _)| *id != subscription.0);
    }

    // -- internals -----------------------------------------------------------

    fn insert(&self, object: SceneObject) -> SceneKey {
        let mut scene = self.inner.borrow_mut();
        let key = scene.next_key;
        scene.next_key += 1;
        scene.objects.insert(key, object);
        SceneKey(key)
    }

    fn emit(&self, event: &SceneEvent) {
        let mut handlers = self.handlers.borrow_mut();
        for (_, handler) in handlers.iter_mut() {
            handler(event);
        }
    }
}
