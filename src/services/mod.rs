/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Read-only lobby projections and lobby SSE publishing.
pub mod lobby_service;
/// Game protocol operations and round progression.
pub mod session_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
