use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::session::{SessionView, SessionsResponse},
    error::AppError,
    services::lobby_service,
    state::SharedState,
};

/// Read-only session endpoints for lobby browsers.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(get_session))
}

#[utoipa::path(
    get,
    path = "/sessions",
    tag = "lobby",
    responses((status = 200, description = "Joinable sessions, oldest first", body = SessionsResponse))
)]
/// List sessions that are waiting and not full.
pub async fn list_sessions(State(state): State<SharedState>) -> Json<SessionsResponse> {
    Json(lobby_service::list_sessions(&state))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "lobby",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Current session view", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
/// Return the current view of one session.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let payload = lobby_service::get_session(&state, id).await?;
    Ok(Json(payload))
}
