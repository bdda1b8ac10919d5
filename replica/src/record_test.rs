use super::*;
use serde_json::json;

fn rect(id: &str) -> ObjectRecord {
    ObjectRecord {
        id: id.into(),
        kind: ShapeKind::Rect,
        x: 10.0,
        y: 20.0,
        width: 100.0,
        height: 50.0,
        rotation: 0.0,
        fill: Fill::Solid("#D94B4B".into()),
        stroke: Some("#1F1A17".into()),
        stroke_width: 2.0,
        path_data: None,
        text: None,
    }
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn solid_rect_round_trip() {
    let record = rect("obj-1");
    let restored = ObjectRecord::from_value(&record.to_value()).unwrap();
    assert_eq!(restored, record);
}

#[test]
fn gradient_fill_round_trip() {
    let mut record = rect("obj-2");
    record.fill = Fill::Gradient {
        kind: GradientKind::Linear,
        stops: vec![
            GradientStop { offset: 0.0, color: "#FF0000".into() },
            GradientStop { offset: 1.0, color: "#0000FF".into() },
        ],
        coords: GradientCoords { x1: 0.0, y1: 0.0, x2: 100.0, y2: 0.0, r1: None, r2: None },
    };
    let restored = ObjectRecord::from_value(&record.to_value()).unwrap();
    assert_eq!(restored.fill, record.fill);
}

#[test]
fn radial_gradient_keeps_radii() {
    let mut record = rect("obj-3");
    record.fill = Fill::Gradient {
        kind: GradientKind::Radial,
        stops: vec![GradientStop { offset: 0.5, color: "#00FF00".into() }],
        coords: GradientCoords {
            x1: 50.0,
            y1: 50.0,
            x2: 50.0,
            y2: 50.0,
            r1: Some(0.0),
            r2: Some(40.0),
        },
    };
    let restored = ObjectRecord::from_value(&record.to_value()).unwrap();
    let Fill::Gradient { coords, .. } = restored.fill else {
        panic!("expected gradient fill");
    };
    assert_eq!(coords.r2, Some(40.0));
}

#[test]
fn pattern_fill_round_trip() {
    let mut record = rect("obj-4");
    record.fill = Fill::Pattern {
        source: "https://example.com/tile.png".into(),
        repeat: PatternRepeat::RepeatX,
    };
    let restored = ObjectRecord::from_value(&record.to_value()).unwrap();
    assert_eq!(restored.fill, record.fill);
}

#[test]
fn path_record_keeps_path_data() {
    let mut record = rect("obj-5");
    record.kind = ShapeKind::Path;
    record.path_data = Some("M 0 0 L 10 10 Q 20 20 30 10".into());
    let restored = ObjectRecord::from_value(&record.to_value()).unwrap();
    assert_eq!(restored.path_data.as_deref(), Some("M 0 0 L 10 10 Q 20 20 30 10"));
}

// =============================================================================
// Wire shape
// =============================================================================

#[test]
fn fill_serializes_as_tagged_sub_record() {
    let fill = Fill::Gradient {
        kind: GradientKind::Linear,
        stops: vec![],
        coords: GradientCoords { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0, r1: None, r2: None },
    };
    let value = serde_json::to_value(&fill).unwrap();
    assert_eq!(value["type"], "gradient");
    assert!(value["data"].is_object());
}

#[test]
fn solid_fill_tag_is_solid() {
    let value = serde_json::to_value(Fill::Solid("#FFFFFF".into())).unwrap();
    assert_eq!(value["type"], "solid");
    assert_eq!(value["data"], "#FFFFFF");
}

#[test]
fn pattern_repeat_uses_css_names() {
    let value = serde_json::to_value(PatternRepeat::NoRepeat).unwrap();
    assert_eq!(value, json!("no-repeat"));
}

// =============================================================================
// Malformed input
// =============================================================================

#[test]
fn unknown_shape_kind_fails_to_deserialize() {
    let mut value = rect("obj-6").to_value();
    value["kind"] = json!("hexagon");
    assert!(ObjectRecord::from_value(&value).is_err());
}

#[test]
fn malformed_fill_fails_to_deserialize() {
    let mut value = rect("obj-7").to_value();
    value["fill"] = json!({"type": "gradient", "data": "not-an-object"});
    assert!(ObjectRecord::from_value(&value).is_err());
}

#[test]
fn missing_optional_fields_use_defaults() {
    let value = json!({
        "id": "obj-8",
        "kind": "ellipse",
        "x": 1.0,
        "y": 2.0,
        "width": 3.0,
        "height": 4.0,
    });
    let record = ObjectRecord::from_value(&value).unwrap();
    assert_eq!(record.rotation, 0.0);
    assert_eq!(record.stroke_width, 1.0);
    assert!(matches!(record.fill, Fill::Solid(_)));
}
