//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The sync server exposes a deliberately small surface: the WebSocket
//! synchronization endpoint, a presence query for collaborating
//! subsystems, and a health check. Project CRUD, auth issuance, and the
//! rest of the product API live in other services.

pub mod presence;
pub mod ws;

use axum::routing::get;
use axum::Router;
use axum::http::StatusCode;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/sync", get(ws::handle_sync))
        .route("/rooms/{project_id}", get(presence::get_room_info))
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
