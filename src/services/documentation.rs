use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Arena Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::list_sessions,
        crate::routes::sessions::get_session,
        crate::routes::questions::get_catalog,
        crate::routes::sse::lobby_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::SessionsResponse,
            crate::dto::session::SessionListItem,
            crate::dto::session::SessionView,
            crate::dto::session::PlayerView,
            crate::dto::session::QuestionView,
            crate::dto::session::RoundView,
            crate::dto::session::Standing,
            crate::dto::session::ChatMessageView,
            crate::dto::session::CatalogResponse,
            crate::dto::session::DifficultyPool,
            crate::dto::sse::Handshake,
            crate::dto::sse::LobbySessionsEvent,
            crate::error::ReasonCode,
            crate::state::question_bank::Difficulty,
            crate::state::state_machine::SessionStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lobby", description = "Read-only session and question catalog endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "game", description = "WebSocket game protocol"),
    )
)]
/// OpenAPI description of the HTTP surface.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/healthcheck", "/sessions", "/sessions/{id}", "/questions/catalog", "/sse/lobby", "/ws"] {
            assert!(doc.paths.paths.contains_key(path), "{path}");
        }
    }
}
