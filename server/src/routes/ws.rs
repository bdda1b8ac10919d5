//! WebSocket handler — the synchronization endpoint.
//!
//! DESIGN
//! ======
//! One connection per (client, project). The upgrade request carries
//! `token` and `project` query parameters; authentication happens before
//! the upgrade, so a bad token is refused with a distinguished status
//! code and reason instead of ever reaching a room.
//!
//! After joining, the connection runs a `select!` loop over three
//! sources:
//! - Incoming binary frames → opaque document updates: merge into the
//!   room document, mark dirty, rebroadcast to the room minus the sender.
//! - Incoming text frames → ephemeral commands: stamp sender id and
//!   timestamp, broadcast to the room minus the sender. Never persisted,
//!   never merged.
//! - The per-session outbound queue → forwarded to the socket.
//!
//! A heartbeat ping detects dead connections so their sessions are
//! removed within one cycle.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → authenticate → `join` → initial full-state update
//! 2. Peers notified with a `session-joined` command
//! 3. Frame loop until close, error, or replacement
//! 4. `leave` + `session-left` broadcast → cleanup

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use replica::command::now_ms;
use replica::CommandMessage;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::auth::AuthedUser;
use crate::services::registry;
use crate::state::{AppState, Outbound, SessionHandle};

const OUTBOUND_QUEUE_CAPACITY: usize = 256;
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_sync(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.get("token") else {
        return (StatusCode::UNAUTHORIZED, "token required").into_response();
    };
    let Some(project_id) = params.get("project").and_then(|p| p.parse::<Uuid>().ok()) else {
        return (StatusCode::BAD_REQUEST, "project id required").into_response();
    };

    let user = match state.auth.authenticate(token).await {
        Ok(user) => user,
        Err(crate::services::auth::AuthError::InvalidToken) => {
            return (StatusCode::UNAUTHORIZED, "invalid or expired session token").into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "authentication backend failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "authentication error").into_response();
        }
    };

    ws.on_upgrade(move |socket| run_sync(socket, state, user, project_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_sync(mut socket: WebSocket, state: AppState, user: AuthedUser, project_id: Uuid) {
    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE_CAPACITY);

    let session = SessionHandle {
        session_id,
        user_id: user.id,
        username: user.username.clone(),
        tx,
    };

    let initial = match registry::join(&state, project_id, session).await {
        Ok(initial) => initial,
        Err(e) => {
            tracing::error!(error = %e, %project_id, "join failed");
            return;
        }
    };

    // Initial reconciliation: the room's full state, as a normal update.
    if socket.send(Message::Binary(initial.into())).await.is_err() {
        registry::leave(&state, project_id, user.id, session_id).await;
        return;
    }

    info!(%session_id, user_id = %user.id, %project_id, "sync: client connected");
    broadcast_presence(&state, project_id, &user, session_id, "session-joined").await;

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.tick().await; // first tick completes immediately

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Binary(frame) => {
                        handle_update_frame(&state, project_id, session_id, &frame).await;
                    }
                    Message::Text(text) => {
                        handle_command_frame(&state, project_id, session_id, &user, &text).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            outbound = rx.recv() => {
                // A closed queue means this session was replaced by a
                // newer connection from the same user.
                let Some(outbound) = outbound else { break };
                let message = match outbound {
                    Outbound::Update(bytes) => Message::Binary(bytes.into()),
                    Outbound::Command(cmd) => Message::Text(cmd.to_json().into()),
                };
                if socket.send(message).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    broadcast_presence(&state, project_id, &user, session_id, "session-left").await;
    registry::leave(&state, project_id, user.id, session_id).await;
    info!(%session_id, "sync: client disconnected");
}

// =============================================================================
// FRAME HANDLING
// =============================================================================

/// Merge a binary update frame and rebroadcast it to the rest of the
/// room. Malformed frames are logged and dropped; they affect nothing.
async fn handle_update_frame(state: &AppState, project_id: Uuid, session_id: Uuid, frame: &[u8]) {
    match registry::merge_update(state, project_id, frame).await {
        Ok(_changes) => {
            let outbound = Outbound::Update(frame.to_vec());
            registry::broadcast(state, project_id, &outbound, Some(session_id)).await;
        }
        Err(e) => {
            warn!(error = %e, %session_id, len = frame.len(), "sync: dropping malformed update frame");
        }
    }
}

/// Stamp an inbound command with the authenticated sender and the server
/// clock, then fan it out to the room excluding the sender.
async fn handle_command_frame(
    state: &AppState,
    project_id: Uuid,
    session_id: Uuid,
    user: &AuthedUser,
    text: &str,
) {
    let command = match CommandMessage::parse(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, %session_id, "sync: dropping malformed command frame");
            return;
        }
    };

    let stamped = command.stamped(user.id.to_string(), now_ms());
    registry::broadcast(state, project_id, &Outbound::Command(stamped), Some(session_id)).await;
}

/// Announce a presence transition to the rest of the room on the command
/// channel.
async fn broadcast_presence(
    state: &AppState,
    project_id: Uuid,
    user: &AuthedUser,
    session_id: Uuid,
    command: &str,
) {
    let payload = serde_json::json!({
        "userId": user.id,
        "username": user.username,
    });
    let message = CommandMessage::new(command, payload).stamped(user.id.to_string(), now_ms());
    registry::broadcast(state, project_id, &Outbound::Command(message), Some(session_id)).await;
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
