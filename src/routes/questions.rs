use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::session::CatalogResponse, services::lobby_service, state::SharedState};

/// Question bank metadata endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/questions/catalog", get(get_catalog))
}

#[utoipa::path(
    get,
    path = "/questions/catalog",
    tag = "lobby",
    responses((status = 200, description = "Pool sizes and categories", body = CatalogResponse))
)]
/// Describe the loaded question bank without revealing any question.
pub async fn get_catalog(State(state): State<SharedState>) -> Json<CatalogResponse> {
    Json(lobby_service::question_catalog(&state))
}
