use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::session::SessionListItem;

/// Event name carrying the joinable session list.
pub const LOBBY_SESSIONS_EVENT: &str = "lobby.sessions";

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name; `None` sends an unnamed event.
    pub event: Option<String>,
    /// Serialized JSON body.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the set of joinable sessions changes.
pub struct LobbySessionsEvent {
    /// Joinable sessions, oldest first.
    pub sessions: Vec<SessionListItem>,
}
