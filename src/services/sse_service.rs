use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    dto::sse::{Handshake, LOBBY_SESSIONS_EVENT, LobbySessionsEvent, ServerEvent},
    services::lobby_service,
    state::SharedState,
};

/// Subscribe to the lobby SSE stream.
pub fn subscribe_lobby(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.lobby_sse().subscribe()
}

/// Events a new lobby subscriber receives before the live feed: a handshake and
/// the current joinable list.
pub fn lobby_greeting(state: &SharedState) -> Vec<ServerEvent> {
    let sessions = lobby_service::joinable(state);

    let handshake = ServerEvent::json(
        Some("handshake".to_string()),
        &Handshake {
            stream: "lobby".into(),
            message: "lobby stream connected".into(),
        },
    );
    let snapshot = ServerEvent::json(
        Some(LOBBY_SESSIONS_EVENT.to_string()),
        &LobbySessionsEvent { sessions },
    );
    [handshake, snapshot].into_iter().filter_map(Result::ok).collect()
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    initial: Vec<ServerEvent>,
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: replays the greeting, then reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        tracing::info!("Lobby SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, question_bank::QuestionBank},
    };

    #[test]
    fn greeting_contains_handshake_and_snapshot() {
        let state = AppState::new(AppConfig::default(), QuestionBank::builtin());
        let greeting = lobby_greeting(&state);
        let names: Vec<_> = greeting.iter().map(|e| e.event.as_deref()).collect();
        assert_eq!(names, vec![Some("handshake"), Some(LOBBY_SESSIONS_EVENT)]);
        assert_eq!(greeting[1].data, r#"{"sessions":[]}"#);
    }
}
