//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the session registry's room table plus the two external
//! seams: the durable document store and the authenticator. Each room
//! owns the server's copy of its project's replicated document, the
//! connected sessions keyed by user id, and a dirty flag for debounced
//! persistence.

use std::collections::HashMap;
use std::sync::Arc;

use replica::{CommandMessage, DocState};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::services::auth::Authenticator;
use crate::services::store::DocumentStore;

// =============================================================================
// OUTBOUND MESSAGES
// =============================================================================

/// One message queued toward a connected client. Updates go out as binary
/// WebSocket frames, commands as JSON text frames.
#[derive(Debug, Clone)]
pub enum Outbound {
    Update(Vec<u8>),
    Command(CommandMessage),
}

// =============================================================================
// SESSIONS AND ROOMS
// =============================================================================

/// One connected client session. Ephemeral: created on join, destroyed on
/// disconnect, never persisted.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Unique per-connection id. Distinguishes a session from its
    /// replacement when the same user reconnects.
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    /// Sender for outgoing frames; dropping it ends the session's
    /// connection loop.
    pub tx: mpsc::Sender<Outbound>,
}

/// Per-project live state. Exists only while sessions are attached; the
/// durable snapshot outlives it.
pub struct RoomState {
    /// The server's replica of the project document.
    pub doc: DocState,
    /// Connected sessions keyed by user id — one active session per user
    /// per room, last connection wins.
    pub sessions: HashMap<Uuid, SessionHandle>,
    /// Set when the document changed since the last successful flush.
    pub dirty: bool,
}

impl RoomState {
    #[must_use]
    pub fn new(doc: DocState) -> Self {
        Self { doc, sessions: HashMap::new(), dirty: false }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state. Clone is required by Axum — all inner fields
/// are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<Uuid, RoomState>>>,
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, auth: Arc<dyn Authenticator>) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), store, auth }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
