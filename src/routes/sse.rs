use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/lobby",
    tag = "sse",
    responses((status = 200, description = "Lobby SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream the joinable session list to lobby browsers.
pub async fn lobby_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_lobby(&state);
    info!("New lobby SSE connection");
    let greeting = sse_service::lobby_greeting(&state);
    sse_service::to_sse_stream(greeting, receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/lobby", get(lobby_stream))
}
