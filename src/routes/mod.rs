use axum::Router;

use crate::state::SharedState;

/// Swagger UI and OpenAPI JSON.
pub mod docs;
/// Health check.
pub mod health;
/// Question catalog.
pub mod questions;
/// Lobby session browsing.
pub mod sessions;
/// Lobby SSE stream.
pub mod sse;
/// Game WebSocket upgrade.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(websocket::router())
        .merge(sessions::router())
        .merge(questions::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
