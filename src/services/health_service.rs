use std::time::SystemTime;

use tracing::debug;

use crate::{
    dto::{format_system_time, health::HealthResponse},
    state::SharedState,
};

/// Report liveness together with session and connection counts.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let sessions = state.registry().len();
    let connections = state.fanout().connection_count();
    debug!(sessions, connections, "health check");
    HealthResponse::ok(sessions, connections, format_system_time(SystemTime::now()))
}
