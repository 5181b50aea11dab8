/// Per-player delivery of server messages.
pub mod fanout;
/// Players, answers and scoring.
pub mod game;
/// Connection to seat bindings.
pub mod presence;
/// Question catalog.
pub mod question_bank;
/// Live sessions and their lobby summaries.
pub mod registry;
mod sse;
/// Session transitions and guards.
pub mod state_machine;
/// Per-session round countdown.
pub mod timer;

use std::sync::Arc;

use crate::config::AppConfig;

pub use self::sse::SseHub;
use self::{
    fanout::Fanout, presence::PresenceTracker, question_bank::QuestionBank,
    registry::SessionRegistry,
};

/// Handle shared by every route and task.
pub type SharedState = Arc<AppState>;

const LOBBY_SSE_CAPACITY: usize = 16;

/// Central application state: the session registry and the connection plumbing around it.
pub struct AppState {
    config: AppConfig,
    bank: Arc<QuestionBank>,
    registry: SessionRegistry,
    fanout: Fanout,
    presence: PresenceTracker,
    lobby_sse: SseHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, bank: QuestionBank) -> SharedState {
        Arc::new(Self {
            presence: PresenceTracker::new(config.reconnect_grace),
            config,
            bank: Arc::new(bank),
            registry: SessionRegistry::new(),
            fanout: Fanout::new(),
            lobby_sse: SseHub::new(LOBBY_SSE_CAPACITY),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Read-only question catalog shared by every session.
    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    /// Every live session.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Per-session delivery of protocol messages.
    pub fn fanout(&self) -> &Fanout {
        &self.fanout
    }

    /// Connection to seat bindings.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Broadcast hub used for the lobby SSE stream.
    pub fn lobby_sse(&self) -> &SseHub {
        &self.lobby_sse
    }
}
