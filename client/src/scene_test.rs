use super::*;
use std::cell::RefCell;
use std::rc::Rc;

fn rect() -> SceneObject {
    SceneObject {
        id: None,
        kind: ShapeKind::Rect,
        x: 10.0,
        y: 20.0,
        width: 100.0,
        height: 50.0,
        rotation: 0.0,
        fill: Fill::Solid("#D94B4B".into()),
        stroke: None,
        stroke_width: 1.0,
        path_data: None,
        text: None,
    }
}

fn recorded_events(scene: &SceneHandle) -> Rc<RefCell<Vec<SceneEvent>>> {
    let log: Rc<RefCell<Vec<SceneEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    scene.on_event(move |event| sink.borrow_mut().push(event.clone()));
    log
}

// =============================================================================
// Object lifecycle
// =============================================================================

#[test]
fn add_object_stores_and_emits() {
    let scene = SceneHandle::new();
    let log = recorded_events(&scene);

    let key = scene.add_object(rect());

    assert_eq!(scene.object_count(), 1);
    assert_eq!(*log.borrow(), vec![SceneEvent::ObjectAdded(key)]);
}

#[test]
fn complete_path_emits_path_event() {
    let scene = SceneHandle::new();
    let log = recorded_events(&scene);

    let mut path = rect();
    path.kind = ShapeKind::Path;
    path.path_data = Some("M 0 0 L 5 5".into());
    let key = scene.complete_path(path);

    assert_eq!(*log.borrow(), vec![SceneEvent::PathCompleted(key)]);
}

#[test]
fn modify_object_mutates_and_emits() {
    let scene = SceneHandle::new();
    let key = scene.add_object(rect());
    let log = recorded_events(&scene);

    let modified = scene.modify_object(key, |object| object.x = 42.0);

    assert!(modified);
    assert_eq!(scene.object(key).unwrap().x, 42.0);
    assert_eq!(*log.borrow(), vec![SceneEvent::ObjectModified(key)]);
}

#[test]
fn modify_missing_object_is_a_no_op() {
    let scene = SceneHandle::new();
    let key = scene.add_object(rect());
    scene.remove_object(key);
    let log = recorded_events(&scene);

    assert!(!scene.modify_object(key, |object| object.x = 1.0));
    assert!(log.borrow().is_empty());
}

#[test]
fn remove_object_emits_with_stable_id() {
    let scene = SceneHandle::new();
    let key = scene.add_object(rect());
    let id = scene.ensure_id(key).unwrap();
    let log = recorded_events(&scene);

    let removed = scene.remove_object(key);

    assert!(removed.is_some());
    assert_eq!(scene.object_count(), 0);
    assert_eq!(*log.borrow(), vec![SceneEvent::ObjectRemoved { key, id: Some(id) }]);
}

#[test]
fn remove_missing_object_emits_nothing() {
    let scene = SceneHandle::new();
    let key = scene.add_object(rect());
    scene.remove_object(key);
    let log = recorded_events(&scene);

    assert!(scene.remove_object(key).is_none());
    assert!(log.borrow().is_empty());
}

// =============================================================================
// Stable ids
// =============================================================================

#[test]
fn ensure_id_assigns_once_and_sticks() {
    let scene = SceneHandle::new();
    let key = scene.add_object(rect());

    let first = scene.ensure_id(key).unwrap();
    let second = scene.ensure_id(key).unwrap();

    assert_eq!(first, second);
    assert_eq!(scene.object(key).unwrap().id, Some(first));
}

#[test]
fn ensure_id_keeps_preassigned_id() {
    let scene = SceneHandle::new();
    let mut object = rect();
    object.id = Some("obj-keep".into());
    let key = scene.add_object(object);

    assert_eq!(scene.ensure_id(key).as_deref(), Some("obj-keep"));
}

#[test]
fn find_by_id_resolves_live_objects() {
    let scene = SceneHandle::new();
    let key = scene.add_object(rect());
    let id = scene.ensure_id(key).unwrap();

    assert_eq!(scene.find_by_id(&id), Some(key));
    assert!(scene.find_by_id("missing").is_none());
}

// =============================================================================
// Settings
// =============================================================================

#[test]
fn default_settings_have_no_preset() {
    let scene = SceneHandle::new();
    let settings = scene.settings();
    assert!(settings.preset_name.is_none());
    assert!(settings.width > 0.0);
}

#[test]
fn set_dimensions_emits_dimension_event_only() {
    let scene = SceneHandle::new();
    let log = recorded_events(&scene);

    scene.set_dimensions(1920.0, 1080.0);

    assert_eq!(scene.settings().width, 1920.0);
    assert_eq!(scene.settings().height, 1080.0);
    assert_eq!(*log.borrow(), vec![SceneEvent::DimensionsChanged]);
}

#[test]
fn set_preset_emits_preset_event() {
    let scene = SceneHandle::new();
    let log = recorded_events(&scene);

    scene.set_preset("a4-landscape");

    assert_eq!(scene.settings().preset_name.as_deref(), Some("a4-landscape"));
    assert_eq!(*log.borrow(), vec![SceneEvent::PresetChanged]);
}

// =============================================================================
// Subscriptions
// =============================================================================

#[test]
fn off_stops_event_delivery() {
    let scene = SceneHandle::new();
    let log: Rc<RefCell<Vec<SceneEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let subscription = scene.on_event(move |event| sink.borrow_mut().push(event.clone()));

    scene.off(subscription);
    scene.add_object(rect());

    assert!(log.borrow().is_empty());
}

#[test]
fn handlers_can_read_the_scene_during_dispatch() {
    let scene = SceneHandle::new();
    let observed: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&observed);
    let reader = scene.clone();
    scene.on_event(move |_| sink.borrow_mut().push(reader.object_count()));

    scene.add_object(rect());
    scene.add_object(rect());

    // The scene borrow is released before dispatch, so counts reflect
    // the completed mutation.
    assert_eq!(*observed.borrow(), vec![1, 2]);
}

// =============================================================================
// Record conversion
// =============================================================================

#[test]
fn record_round_trip_reattaches_id() {
    let mut object = rect();
    object.id = Some("obj-1".into());
    let record = object.to_record("obj-1");
    let restored = SceneObject::from_record(record);
    assert_eq!(restored, object);
}
