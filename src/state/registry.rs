use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::GameError,
    state::{
        game::SessionId,
        question_bank::Difficulty,
        state_machine::{Session, SessionSettings},
        timer::RoundTimer,
    },
};

/// One registered session: its state behind a per-session lock plus its round timer.
pub struct SessionHandle {
    id: SessionId,
    session: Mutex<Session>,
    timer: RoundTimer,
}

impl SessionHandle {
    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Acquire exclusive access to the session. All mutations go through this lock.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    /// The countdown owned by this session.
    pub fn timer(&self) -> &RoundTimer {
        &self.timer
    }
}

/// Lobby summary of a joinable session, refreshed by whoever holds its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyEntry {
    /// Session identifier.
    pub id: SessionId,
    /// Display name of the session.
    pub name: String,
    /// Difficulty fixed at creation.
    pub difficulty: Difficulty,
    /// Current roster size.
    pub player_count: usize,
    /// Roster capacity.
    pub max_players: usize,
    /// Name of the current host, if anyone joined yet.
    pub host_name: Option<String>,
    /// Creation time, used for ordering.
    pub created_at: SystemTime,
}

impl From<&Session> for LobbyEntry {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id(),
            name: session.name().to_string(),
            difficulty: session.settings().difficulty,
            player_count: session.player_count(),
            max_players: session.settings().max_players,
            host_name: session.host().map(|host| host.name.clone()),
            created_at: session.created_at(),
        }
    }
}

/// In-memory authority over every live session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    lobby: DashMap<SessionId, LobbyEntry>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh waiting session. It enters the lobby on its first [`refresh_lobby`](Self::refresh_lobby).
    pub fn create(&self, settings: SessionSettings) -> Arc<SessionHandle> {
        let id = Uuid::new_v4();
        let handle = Arc::new(SessionHandle {
            id,
            session: Mutex::new(Session::new(id, settings)),
            timer: RoundTimer::new(),
        });
        self.sessions.insert(id, handle.clone());
        debug!(session_id = %id, "session created");
        handle
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Result<Arc<SessionHandle>, GameError> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(GameError::SessionNotFound)
    }

    /// Remove a session and stop its timer. Unknown ids are ignored.
    pub fn dispose(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.lobby.remove(id);
        let (_, handle) = self.sessions.remove(id)?;
        handle.timer.cancel();
        debug!(session_id = %id, "session disposed");
        Some(handle)
    }

    /// Record the lobby summary of `session`. Call while holding its lock.
    pub fn refresh_lobby(&self, session: &Session) {
        if session.is_joinable() {
            self.lobby.insert(session.id(), LobbyEntry::from(session));
        } else {
            self.lobby.remove(&session.id());
        }
    }

    /// Every session a newcomer could join, oldest first. Takes no session lock.
    pub fn list_joinable(&self) -> Vec<LobbyEntry> {
        let mut joinable: Vec<LobbyEntry> = self
            .lobby
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        joinable.sort_by_key(|entry| entry.created_at);
        joinable
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        game::NewPlayer, question_bank::Difficulty, state_machine::tests::settings,
    };

    fn player() -> NewPlayer {
        NewPlayer {
            id: Uuid::new_v4(),
            name: "p".into(),
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn create_get_dispose() {
        let registry = SessionRegistry::new();
        let handle = registry.create(settings(Difficulty::Easy, 5));
        assert_ne!(handle.id(), registry.create(settings(Difficulty::Easy, 5)).id());
        assert_eq!(registry.len(), 2);

        let found = registry.get(&handle.id()).unwrap();
        assert_eq!(found.lock().await.id(), handle.id());

        assert!(registry.dispose(&handle.id()).is_some());
        assert!(registry.dispose(&handle.id()).is_none());
        assert!(matches!(
            registry.get(&handle.id()),
            Err(GameError::SessionNotFound)
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn list_joinable_skips_full_and_started_sessions() {
        let registry = SessionRegistry::new();
        let open = registry.create(settings(Difficulty::Easy, 5));
        {
            let mut session = open.lock().await;
            session.join(player()).unwrap();
            registry.refresh_lobby(&session);
        }

        let full = registry.create(settings(Difficulty::Easy, 5));
        {
            let mut session = full.lock().await;
            for _ in 0..8 {
                session.join(player()).unwrap();
            }
            registry.refresh_lobby(&session);
        }

        let closed = registry.create(settings(Difficulty::Easy, 5));
        {
            let mut session = closed.lock().await;
            let id = session.join(player()).unwrap().id;
            session.remove_player(&id);
            registry.refresh_lobby(&session);
        }

        let ids: Vec<_> = registry.list_joinable().into_iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![open.id()]);
        assert_eq!(registry.list_joinable()[0].player_count, 1);
    }

    #[tokio::test]
    async fn listing_does_not_wait_on_a_held_session_lock() {
        let registry = SessionRegistry::new();
        let busy = registry.create(settings(Difficulty::Medium, 5));
        let mut session = busy.lock().await;
        session.join(player()).unwrap();
        registry.refresh_lobby(&session);

        let listed = registry.list_joinable();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].host_name.as_deref(), Some("p"));
        drop(session);

        registry.dispose(&busy.id());
        assert!(registry.list_joinable().is_empty());
    }
}
