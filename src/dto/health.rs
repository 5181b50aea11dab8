use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status, always "ok" while the process serves requests.
    pub status: String,
    /// Number of live sessions.
    pub sessions: usize,
    /// Number of WebSocket connections bound to a session.
    pub connections: usize,
    /// RFC 3339 time the response was produced.
    pub timestamp: String,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(sessions: usize, connections: usize, timestamp: String) -> Self {
        Self {
            status: "ok".to_string(),
            sessions,
            connections,
            timestamp,
        }
    }
}
