//! Session glue: one replicated document, one scene bridge, one
//! transport, wired together for a single project.
//!
//! [`CollabSession::start`] builds the pieces and connects the streams:
//! local transaction deltas flow into the transport, inbound updates are
//! merged into the document (where the bridge picks them up), and
//! inbound commands are handed to the caller. [`CollabSession::run`]
//! drives the inbound side; it must run on the client's single
//! cooperative event loop (the shared document is not `Send`).

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use replica::{CommandMessage, ReplicatedDocument};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::bridge::SceneBridge;
use crate::scene::SceneHandle;
use crate::transport::{ConnectionState, Incoming, Transport, TransportConfig};

/// A live editing session on one project.
pub struct CollabSession {
    scene: SceneHandle,
    doc: ReplicatedDocument,
    bridge: Option<SceneBridge>,
    transport: Transport,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl CollabSession {
    /// Attach a bridge to the scene, connect to the sync endpoint, and
    /// start shipping updates.
    #[must_use]
    pub fn start(scene: SceneHandle, config: TransportConfig) -> Self {
        let doc = ReplicatedDocument::new(Uuid::new_v4());
        let bridge = SceneBridge::attach(scene.clone(), doc.clone());

        let (transport, incoming) = Transport::spawn(config);
        let state_rx = transport.watch_state();

        // Local transaction deltas feed the outgoing update stream.
        {
            let transport_tx = transport.clone_sender();
            doc.set_update_sink(move |bytes| {
                let _ = transport_tx.send(crate::transport::Outgoing::Update(bytes));
            });
        }

        Self { scene, doc, bridge: Some(bridge), transport, incoming, state_rx }
    }

    /// The scene this session keeps in sync.
    #[must_use]
    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    /// The session's replicated document.
    #[must_use]
    pub fn document(&self) -> &ReplicatedDocument {
        &self.doc
    }

    /// Current transport state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Send an ephemeral command to the rest of the room.
    pub fn send_command(&self, command: CommandMessage) -> bool {
        self.transport.send_command(command)
    }

    /// Drive the inbound side: merge updates, surface commands, and
    /// push the full local state each time the connection (re)reaches
    /// `Synced`. Returns when the transport terminates.
    pub async fn run(&mut self, mut on_command: impl FnMut(CommandMessage)) {
        let mut watching = true;
        loop {
            tokio::select! {
                changed = self.state_rx.changed(), if watching => {
                    if changed.is_err() {
                        // Transport task ended; drain what remains.
                        watching = false;
                        continue;
                    }
                    let synced = *self.state_rx.borrow_and_update() == ConnectionState::Synced;
                    if synced {
                        // Initial reconciliation is just a normal update
                        // exchange: push everything we have, the server
                        // pushed everything it has.
                        self.transport.send_update(self.doc.encoded_full_update());
                    }
                }
                incoming = self.incoming.recv() => {
                    let Some(incoming) = incoming else { break };
                    match incoming {
                        Incoming::Update(bytes) => self.doc.apply_remote(&bytes),
                        Incoming::Command(command) => on_command(command),
                    }
                }
            }
        }
    }

    /// End the session: detach the bridge and drop the connection.
    pub fn close(mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.detach();
        }
        self.transport.shutdown();
    }
}
