use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payload.
pub mod health;
/// Session, round and lobby views.
pub mod session;
/// Server-sent event payloads.
pub mod sse;
/// Input validation helpers.
pub mod validation;
/// Game WebSocket protocol.
pub mod ws;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
