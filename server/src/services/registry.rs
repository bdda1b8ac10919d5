//! Session registry — room lifecycle, presence, and targeted broadcast.
//!
//! DESIGN
//! ======
//! Rooms are created lazily on first join (hydrating the project document
//! from the durable store) and evicted when the last session leaves.
//! Membership is keyed by user id: a second connection from the same user
//! replaces the first, whose outbound channel closes as the old handle is
//! dropped — last connection wins.
//!
//! All membership mutation happens under the registry's write lock, so a
//! broadcast never observes a half-removed session.
//!
//! ERROR HANDLING
//! ==============
//! On last-session leave, the document is flushed before eviction. If the
//! flush fails the room is kept in memory with its dirty flag intact so
//! the persistence task can retry instead of losing edits.

use replica::document::ORIGIN_REMOTE;
use replica::update::{decode_snapshot, encode_snapshot, Update};
use replica::{CodecError, DocState};
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::{AppState, Outbound, RoomState, SessionHandle};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("store error: {0}")]
    Store(#[from] crate::services::store::StoreError),
}

/// Presence snapshot for one room.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub project_id: Uuid,
    pub client_count: usize,
    pub clients: Vec<RoomClient>,
}

/// One connected user as reported by [`room_info`].
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomClient {
    pub user_id: Uuid,
    pub username: String,
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

/// Add a session to the room for `project_id`, creating the room (and
/// hydrating its document from the durable store) if absent. Returns the
/// room document's encoded full state for initial reconciliation.
pub async fn join(
    state: &AppState,
    project_id: Uuid,
    session: SessionHandle,
) -> Result<Vec<u8>, RegistryError> {
    // Load outside the lock; only the first join of an absent room uses it.
    let stored = state.store.load(project_id).await?;

    let mut rooms = state.rooms.write().await;
    let room = match rooms.entry(project_id) {
        std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
        std::collections::hash_map::Entry::Vacant(entry) => {
            let doc = hydrate(project_id, stored);
            entry.insert(RoomState::new(doc))
        }
    };

    let session_id = session.session_id;
    let replaced = room.sessions.insert(session.user_id, session);
    if let Some(old) = replaced {
        info!(%project_id, user_id = %old.user_id, "session replaced by newer connection");
    }

    info!(%project_id, %session_id, sessions = room.sessions.len(), "session joined room");
    Ok(room.doc.full_update().encode())
}

fn hydrate(project_id: Uuid, stored: Option<Vec<u8>>) -> DocState {
    let replica_id = Uuid::new_v4();
    match stored {
        Some(bytes) => match decode_snapshot(&bytes) {
            Ok(snapshot) => {
                let doc = DocState::from_snapshot(replica_id, snapshot);
                info!(%project_id, objects = doc.object_count(), "hydrated document from store");
                doc
            }
            Err(e) => {
                warn!(error = %e, %project_id, "stored snapshot unreadable; starting empty");
                DocState::new(replica_id)
            }
        },
        None => DocState::new(replica_id),
    }
}

/// Remove a session from its room. A stale leave — the user already
/// reconnected and the stored session id no longer matches — is a no-op.
/// If the room empties, its document is flushed and the room evicted.
pub async fn leave(state: &AppState, project_id: Uuid, user_id: Uuid, session_id: Uuid) {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(&project_id) else {
        return;
    };

    match room.sessions.get(&user_id) {
        Some(current) if current.session_id == session_id => {
            room.sessions.remove(&user_id);
        }
        _ => return,
    }
    info!(%project_id, %session_id, remaining = room.sessions.len(), "session left room");

    if !room.sessions.is_empty() {
        return;
    }

    if !room.dirty {
        rooms.remove(&project_id);
        info!(%project_id, "evicted room from memory");
        return;
    }

    // Snapshot under the lock, write without it, then re-check: a new
    // session may have joined while the flush was in flight.
    let snapshot = encode_snapshot(&room.doc.snapshot());
    let flushed_clock = room.doc.current_clock();
    drop(rooms);

    let flush_result = state.store.save(project_id, &snapshot).await;

    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(&project_id) else {
        return;
    };
    if !room.sessions.is_empty() {
        return;
    }

    match flush_result {
        Ok(()) => {
            if room.doc.current_clock() == flushed_clock {
                room.dirty = false;
            }
            if room.dirty {
                warn!(%project_id, "retaining room after final flush; newer writes exist");
            } else {
                rooms.remove(&project_id);
                info!(%project_id, "evicted room from memory");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, %project_id, "final flush failed; room retained for retry");
        }
    }
}

// =============================================================================
// UPDATES
// =============================================================================

/// Merge an update frame received from a session into the room document.
/// Returns the number of changes it produced; the caller rebroadcasts the
/// raw frame to the rest of the room regardless (peers' own merges are
/// idempotent).
pub async fn merge_update(
    state: &AppState,
    project_id: Uuid,
    frame: &[u8],
) -> Result<usize, CodecError> {
    let update = Update::decode(frame)?;
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(&project_id) else {
        return Ok(0);
    };
    let changes = room.doc.apply_update(&update, ORIGIN_REMOTE);
    if !changes.is_empty() {
        room.dirty = true;
    }
    Ok(changes.len())
}

// =============================================================================
// BROADCAST / PRESENCE
// =============================================================================

/// Send a message to every session in the room except the excluded one.
/// Best-effort: a full or closed per-session queue drops the message.
pub async fn broadcast(
    state: &AppState,
    project_id: Uuid,
    message: &Outbound,
    exclude: Option<Uuid>,
) {
    let rooms = state.rooms.read().await;
    let Some(room) = rooms.get(&project_id) else {
        return;
    };

    for session in room.sessions.values() {
        if exclude == Some(session.session_id) {
            continue;
        }
        let _ = session.tx.try_send(message.clone());
    }
}

/// Presence query: who is currently attached to the room. `None` if the
/// room does not exist.
pub async fn room_info(state: &AppState, project_id: Uuid) -> Option<RoomInfo> {
    let rooms = state.rooms.read().await;
    let room = rooms.get(&project_id)?;
    let clients = room
        .sessions
        .values()
        .map(|s| RoomClient { user_id: s.user_id, username: s.username.clone() })
        .collect::<Vec<_>>();
    Some(RoomInfo { project_id, client_count: clients.len(), clients })
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
