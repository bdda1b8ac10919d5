use super::*;
use crate::scene::SceneObject;
use crate::transport::TransportConfig;
use futures_util::{SinkExt, StreamExt};
use replica::document::ORIGIN_LOCAL;
use replica::{DocState, Fill, ShapeKind, Update};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

fn rect_record_value(id: &str) -> serde_json::Value {
    SceneObject {
        id: Some(id.to_owned()),
        kind: ShapeKind::Rect,
        x: 30.0,
        y: 40.0,
        width: 10.0,
        height: 10.0,
        rotation: 0.0,
        fill: Fill::Solid("#D94B4B".into()),
        stroke: None,
        stroke_width: 1.0,
        path_data: None,
        text: None,
    }
    .to_record(id)
    .to_value()
}

/// Fake sync endpoint: accepts one connection, sends a peer update and a
/// command, then records everything the client sends.
async fn spawn_fake_server() -> (
    std::net::SocketAddr,
    tokio::sync::mpsc::UnboundedReceiver<Message>,
) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, received_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let mut peer = DocState::new(uuid::Uuid::from_u128(99));
        let delta = peer
            .transact(ORIGIN_LOCAL, |tx| {
                tx.set_object("obj-remote", rect_record_value("obj-remote"));
                Ok(())
            })
            .delta;
        ws.send(Message::Binary(delta.encode().into())).await.unwrap();

        let command = replica::CommandMessage::new("lock", serde_json::json!({"objectId": "obj-remote"}))
            .stamped("peer-user", 42);
        ws.send(Message::Text(command.to_json().into())).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if received_tx.send(msg).is_err() {
                break;
            }
        }
    });

    (addr, received_rx)
}

#[tokio::test]
async fn session_merges_remote_updates_and_surfaces_commands() {
    let (addr, mut received) = spawn_fake_server().await;
    let scene = SceneHandle::new();
    let config = TransportConfig::new(format!("ws://{addr}/sync"), "tok", uuid::Uuid::new_v4());
    let mut session = CollabSession::start(scene.clone(), config);

    let commands: Rc<RefCell<Vec<replica::CommandMessage>>> = Rc::new(RefCell::new(Vec::new()));
    let command_sink = Rc::clone(&commands);

    tokio::select! {
        () = session.run(move |command| command_sink.borrow_mut().push(command)) => {}
        () = tokio::time::sleep(Duration::from_millis(800)) => {}
    }

    // The peer's object reached the scene through the bridge.
    assert_eq!(scene.object_count(), 1);
    let key = scene.find_by_id("obj-remote").expect("remote object in scene");
    assert_eq!(scene.object(key).unwrap().x, 30.0);

    // The command arrived stamped, outside the document.
    let commands = commands.borrow();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].command, "lock");
    assert_eq!(commands[0].sender_id.as_deref(), Some("peer-user"));
    assert_eq!(session.document().object_count(), 1);

    // On sync the session pushed its state to the server as a normal
    // update frame.
    let first_sent = received.recv().await.expect("client sent its state");
    let Message::Binary(bytes) = first_sent else {
        panic!("expected binary full update");
    };
    Update::decode(&bytes).expect("well-formed update frame");
}

#[tokio::test]
async fn local_edits_flow_out_through_the_transport() {
    let (addr, mut received) = spawn_fake_server().await;
    let scene = SceneHandle::new();
    let config = TransportConfig::new(format!("ws://{addr}/sync"), "tok", uuid::Uuid::new_v4());
    let mut session = CollabSession::start(scene.clone(), config);

    let scene_for_edit = scene.clone();
    let edit = async move {
        // Let the connection come up first.
        tokio::time::sleep(Duration::from_millis(200)).await;
        scene_for_edit.add_object(SceneObject {
            id: None,
            kind: ShapeKind::Ellipse,
            x: 1.0,
            y: 2.0,
            width: 3.0,
            height: 4.0,
            rotation: 0.0,
            fill: Fill::Solid("#FFF".into()),
            stroke: None,
            stroke_width: 1.0,
            path_data: None,
            text: None,
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
    };

    tokio::select! {
        () = session.run(|_| {}) => {}
        () = edit => {}
    }

    // Skip the initial full-state update, then find our edit's delta.
    let mut saw_edit = false;
    while let Ok(msg) = received.try_recv() {
        if let Message::Binary(bytes) = msg {
            let update = Update::decode(&bytes).unwrap();
            if update.entries.iter().any(|entry| {
                entry.value.as_ref().is_some_and(|v| v["kind"] == "ellipse")
            }) {
                saw_edit = true;
            }
        }
    }
    assert!(saw_edit, "local edit should reach the wire");

    session.close();
}
