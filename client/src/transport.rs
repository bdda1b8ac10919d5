//! The transport provider: one durable connection per (client, project).
//!
//! Owns the WebSocket to the synchronization endpoint, feeding the
//! document's outgoing update stream and draining the incoming one, plus
//! the ephemeral command traffic that shares the connection. Updates
//! travel as binary frames, commands as text frames.
//!
//! The connection state machine is `Disconnected → Connecting → Synced`,
//! back to `Disconnected` on error or close. Reconnection is automatic
//! with a fixed backoff interval and a capped retry count; exhausting
//! the cap (or being refused authentication) leaves the provider in a
//! terminal `Disconnected` state rather than retrying forever.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use replica::CommandMessage;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
}

/// Connection lifecycle state, observable via [`Transport::watch_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Synced,
}

/// Connection parameters for one (client, project) pair.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Sync endpoint, e.g. `ws://127.0.0.1:3000/sync`.
    pub endpoint: String,
    /// Session token presented in the join handshake.
    pub token: String,
    pub project_id: Uuid,
    /// Reconnect attempts before giving up.
    pub max_retries: u32,
    /// Fixed delay between reconnect attempts.
    pub retry_backoff: Duration,
}

impl TransportConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>, project_id: Uuid) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            project_id,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// The connection URL carrying the join handshake parameters.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{}?token={}&project={}",
            self.endpoint, self.token, self.project_id
        )
    }
}

/// Outbound traffic handed to the transport.
#[derive(Debug, Clone)]
pub enum Outgoing {
    Update(Vec<u8>),
    Command(CommandMessage),
}

/// Inbound traffic surfaced by the transport.
#[derive(Debug, Clone)]
pub enum Incoming {
    Update(Vec<u8>),
    Command(CommandMessage),
}

/// Handle to the running connection task.
pub struct Transport {
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl Transport {
    /// Spawn the connection task. Returns the handle and the stream of
    /// inbound messages.
    #[must_use]
    pub fn spawn(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<Incoming>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = tokio::spawn(run(config, state_tx, outgoing_rx, incoming_tx));

        (Self { outgoing_tx, state_rx, task }, incoming_rx)
    }

    /// Queue an encoded document update. Returns false once the
    /// connection task has terminated.
    pub fn send_update(&self, bytes: Vec<u8>) -> bool {
        self.outgoing_tx.send(Outgoing::Update(bytes)).is_ok()
    }

    /// Queue an ephemeral command. Returns false once the connection
    /// task has terminated.
    pub fn send_command(&self, command: CommandMessage) -> bool {
        self.outgoing_tx.send(Outgoing::Command(command)).is_ok()
    }

    /// A cloneable handle to the outgoing queue, for wiring the
    /// document's update sink.
    #[must_use]
    pub fn clone_sender(&self) -> mpsc::UnboundedSender<Outgoing> {
        self.outgoing_tx.clone()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A watcher over connection state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Tear the connection down.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

// -- connection task ---------------------------------------------------------

/// Whether a failed attempt is worth retrying. An authentication refusal
/// is terminal for this credential; trying again cannot succeed.
fn is_retryable(error: &tokio_tungstenite::tungstenite::Error) -> bool {
    match error {
        tokio_tungstenite::tungstenite::Error::Http(response) => response.status() != 401,
        _ => true,
    }
}

/// Delay before the next attempt, or `None` when the retry budget is
/// spent.
fn next_retry(attempts_so_far: u32, config: &TransportConfig) -> Option<Duration> {
    if attempts_so_far > config.max_retries {
        return None;
    }
    Some(config.retry_backoff)
}

async fn run(
    config: TransportConfig,
    state_tx: watch::Sender<ConnectionState>,
    mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
    incoming_tx: mpsc::UnboundedSender<Incoming>,
) {
    let mut attempts: u32 = 0;

    loop {
        let _ = state_tx.send(ConnectionState::Connecting);

        match connect_async(config.url()).await {
            Ok((ws, _)) => {
                attempts = 0;
                info!(project_id = %config.project_id, "transport connected");
                let _ = state_tx.send(ConnectionState::Synced);

                match run_connection(ws, &mut outgoing_rx, &incoming_tx).await {
                    Ok(CloseReason::LocalShutdown) => {
                        let _ = state_tx.send(ConnectionState::Disconnected);
                        info!("transport shut down by caller");
                        return;
                    }
                    Ok(CloseReason::Remote) => info!("transport closed by server"),
                    Err(e) => warn!(error = %e, "transport connection lost"),
                }
            }
            Err(e) => {
                warn!(error = %e, "transport connect failed");
                if !is_retryable(&e) {
                    let _ = state_tx.send(ConnectionState::Disconnected);
                    warn!("authentication refused; not retrying");
                    return;
                }
            }
        }

        let _ = state_tx.send(ConnectionState::Disconnected);

        attempts += 1;
        let Some(backoff) = next_retry(attempts, &config) else {
            warn!(attempts, "reconnect budget exhausted; staying disconnected");
            return;
        };
        tokio::time::sleep(backoff).await;
    }
}

/// Why a live connection ended without a transport error.
enum CloseReason {
    /// The server closed the connection or the stream ended.
    Remote,
    /// The caller dropped its transport handles; do not reconnect.
    LocalShutdown,
}

/// Pump one live connection until it ends.
async fn run_connection(
    ws: WsStream,
    outgoing_rx: &mut mpsc::UnboundedReceiver<Outgoing>,
    incoming_tx: &mpsc::UnboundedSender<Incoming>,
) -> Result<CloseReason, TransportError> {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    None | Some(Ok(Message::Close(_))) => return Ok(CloseReason::Remote),
                    Some(Err(e)) => return Err(TransportError::Ws(Box::new(e))),
                    Some(Ok(msg)) => msg,
                };
                match msg {
                    Message::Binary(bytes) => {
                        if incoming_tx.send(Incoming::Update(bytes.to_vec())).is_err() {
                            return Ok(CloseReason::LocalShutdown);
                        }
                    }
                    Message::Text(text) => match CommandMessage::parse(text.as_str()) {
                        Ok(command) => {
                            if incoming_tx.send(Incoming::Command(command)).is_err() {
                                return Ok(CloseReason::LocalShutdown);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "dropping malformed command frame");
                        }
                    },
                    // Pings are answered by the protocol layer.
                    _ => {}
                }
            }
            out = outgoing_rx.recv() => {
                let Some(out) = out else { return Ok(CloseReason::LocalShutdown) };
                let msg = match out {
                    Outgoing::Update(bytes) => Message::Binary(bytes.into()),
                    Outgoing::Command(command) => Message::Text(command.to_json().into()),
                };
                sink.send(msg).await.map_err(|e| TransportError::Ws(Box::new(e)))?;
            }
        }
    }
}
