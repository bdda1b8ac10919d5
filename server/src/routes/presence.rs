//! Presence query endpoint, consumed by collaborating subsystems.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::services::registry;
use crate::state::AppState;

/// `GET /rooms/{project_id}` — who is attached to the room right now.
/// 404 when no room exists for the project (nobody is connected).
pub async fn get_room_info(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Response {
    match registry::room_info(&state, project_id).await {
        Some(info) => Json(info).into_response(),
        None => (StatusCode::NOT_FOUND, "no active room").into_response(),
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
