use super::*;
use crate::document::DocState;
use serde_json::json;
use uuid::Uuid;

fn stamp(clock: u64, replica: u128) -> Stamp {
    Stamp { clock, replica: Uuid::from_u128(replica) }
}

// =============================================================================
// Update codec
// =============================================================================

#[test]
fn encode_decode_round_trip() {
    let update = Update {
        entries: vec![
            UpdateEntry {
                table: Table::Objects,
                key: "obj-1".into(),
                stamp: stamp(3, 1),
                value: Some(json!({"kind": "rect", "x": 1.0})),
            },
            UpdateEntry { table: Table::Objects, key: "obj-2".into(), stamp: stamp(4, 1), value: None },
            UpdateEntry {
                table: Table::Settings,
                key: "presetName".into(),
                stamp: stamp(5, 1),
                value: Some(json!("a4-portrait")),
            },
        ],
    };

    let decoded = Update::decode(&update.encode()).unwrap();
    assert_eq!(decoded.entries.len(), 3);
    assert_eq!(decoded.entries[0].key, "obj-1");
    assert_eq!(decoded.entries[1].value, None);
    assert_eq!(decoded.entries[2].table, Table::Settings);
    assert_eq!(decoded.entries[2].stamp, stamp(5, 1));
}

#[test]
fn empty_update_round_trip() {
    let decoded = Update::decode(&Update::default().encode()).unwrap();
    assert!(decoded.is_empty());
}

#[test]
fn decode_rejects_garbage() {
    let err = Update::decode(b"\x00\x01not json").unwrap_err();
    assert!(matches!(err, CodecError::Update(_)));
}

#[test]
fn decode_rejects_wrong_shape() {
    let err = Update::decode(br#"{"entries": "nope"}"#).unwrap_err();
    assert!(matches!(err, CodecError::Update(_)));
}

// =============================================================================
// Snapshot codec
// =============================================================================

#[test]
fn snapshot_encode_decode_round_trip() {
    let mut doc = DocState::new(Uuid::from_u128(1));
    doc.transact(crate::document::ORIGIN_LOCAL, |tx| {
        tx.set_object("obj-1", json!({"x": 1}));
        Ok(())
    });

    let bytes = encode_snapshot(&doc.snapshot());
    let restored = DocState::from_snapshot(Uuid::from_u128(2), decode_snapshot(&bytes).unwrap());
    assert_eq!(restored.object("obj-1"), Some(&json!({"x": 1})));
}

#[test]
fn decode_snapshot_rejects_garbage() {
    let err = decode_snapshot(b"{{{{").unwrap_err();
    assert!(matches!(err, CodecError::Snapshot(_)));
}
