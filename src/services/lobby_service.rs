//! Read-only lobby projections for the REST routes and the lobby SSE stream.

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        session::{CatalogResponse, DifficultyPool, SessionListItem, SessionView, SessionsResponse},
        sse::{LOBBY_SESSIONS_EVENT, LobbySessionsEvent, ServerEvent},
    },
    error::{GameError, ServiceError},
    state::{SharedState, question_bank::Difficulty},
};

/// Sessions a newcomer may join, oldest first.
pub fn list_sessions(state: &SharedState) -> SessionsResponse {
    SessionsResponse {
        sessions: joinable(state),
    }
}

/// Current view of one session.
pub async fn get_session(state: &SharedState, id: Uuid) -> Result<SessionView, ServiceError> {
    let handle = state.registry().get(&id)?;
    let session = handle.lock().await;
    if session.is_closed() {
        return Err(GameError::SessionNotFound.into());
    }
    Ok(SessionView::from(&*session))
}

/// Pool sizes and categories of the loaded question bank.
pub fn question_catalog(state: &SharedState) -> CatalogResponse {
    let bank = state.bank();
    CatalogResponse {
        difficulties: Difficulty::ALL
            .into_iter()
            .map(|difficulty| DifficultyPool {
                difficulty,
                questions: bank.pool_size(difficulty),
            })
            .collect(),
        categories: bank.categories(),
    }
}

/// Push the joinable session list onto the lobby SSE stream.
pub fn broadcast_lobby_sessions(state: &SharedState) {
    let payload = LobbySessionsEvent {
        sessions: joinable(state),
    };
    send_lobby_event(state, LOBBY_SESSIONS_EVENT, &payload);
}

/// Joinable sessions as served to lobby browsers, oldest first.
pub fn joinable(state: &SharedState) -> Vec<SessionListItem> {
    state
        .registry()
        .list_joinable()
        .iter()
        .map(SessionListItem::from)
        .collect()
}

fn send_lobby_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.lobby_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize lobby SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            AppState, game::NewPlayer, question_bank::QuestionBank, state_machine::tests::settings,
        },
    };

    fn app() -> SharedState {
        AppState::new(AppConfig::default(), QuestionBank::builtin())
    }

    #[tokio::test]
    async fn lobby_stream_receives_joinable_sessions() {
        let state = app();
        let mut rx = state.lobby_sse().subscribe();
        let handle = state.registry().create(settings(Difficulty::Hard, 3));
        {
            let mut session = handle.lock().await;
            session
                .join(NewPlayer {
                    id: Uuid::new_v4(),
                    name: "ada".into(),
                    photo_url: None,
                })
                .unwrap();
            state.registry().refresh_lobby(&session);
        }

        broadcast_lobby_sessions(&state);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(LOBBY_SESSIONS_EVENT));
        let data: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(data["sessions"][0]["hostName"], "ada");
        assert_eq!(data["sessions"][0]["playerCount"], 1);
        assert_eq!(data["sessions"][0]["difficulty"], "hard");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let state = app();
        let err = get_session(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Game(GameError::SessionNotFound)));
    }

    #[test]
    fn catalog_lists_every_difficulty() {
        let catalog = question_catalog(&app());
        let sizes: Vec<_> = catalog.difficulties.iter().map(|pool| pool.questions).collect();
        assert_eq!(sizes, vec![6, 6, 6]);
        assert!(!catalog.categories.is_empty());
    }
}
