use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, timeout_at},
};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    error::GameError,
    services::session_service,
    state::{SharedState, fanout::ClientConnection},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle of one game WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection = ClientConnection::new(outbound_tx.clone());
    let connection_id = connection.id;
    info!(%connection_id, "client connected");
    connection.send(&ServerMessage::Connected { connection_id });

    // Until the client hosts or joins a session, it must do so before this deadline.
    let ident_deadline = Instant::now() + IDENT_TIMEOUT;
    let mut identified = false;

    loop {
        let next = if identified {
            receiver.next().await
        } else {
            match timeout_at(ident_deadline, receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(%connection_id, "websocket identification timed out");
                    let _ = outbound_tx.send(Message::Close(None));
                    break;
                }
            }
        };

        let Some(message) = next else {
            break;
        };

        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection_id, payload = %text, "received client message");
                if let Err(err) = dispatch(&state, &connection, text.as_str()).await {
                    warn!(%connection_id, error = %err, "client action rejected");
                    connection.send(&ServerMessage::error(&err));
                }
                identified |= state.presence().binding(&connection_id).is_some();
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%connection_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                connection.send(&ServerMessage::error(&GameError::InvalidMessage(
                    "binary frames are not supported".into(),
                )));
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    session_service::disconnect(&state, &connection_id).await;
    info!(%connection_id, "client disconnected");

    drop(connection);
    finalize(writer_task, outbound_tx).await;
}

/// Parse one text frame and route it to the matching session operation.
async fn dispatch(
    state: &SharedState,
    connection: &ClientConnection,
    text: &str,
) -> Result<(), GameError> {
    let message = serde_json::from_str::<ClientMessage>(text)
        .map_err(|err| GameError::InvalidMessage(err.to_string()))?;

    match message {
        ClientMessage::HostGame(request) => {
            session_service::host_game(state, connection, request).await
        }
        ClientMessage::JoinSession { session_id, player } => {
            session_service::join_session(state, connection, session_id, player).await
        }
        ClientMessage::RejoinSession {
            session_id,
            player_id,
            reconnect_token,
        } => {
            session_service::rejoin_session(state, connection, session_id, player_id, reconnect_token)
                .await
        }
        ClientMessage::PlayerReady { ready } => {
            session_service::set_ready(state, connection, ready).await
        }
        ClientMessage::StartGame => session_service::start_game(state, connection).await,
        ClientMessage::SubmitAnswer {
            answer_index,
            round_index,
        } => session_service::submit_answer(state, connection, answer_index, round_index).await,
        ClientMessage::ChatMessage { text } => {
            session_service::send_chat(state, connection, &text).await
        }
        ClientMessage::LeaveSession => session_service::leave_session(state, connection).await,
        ClientMessage::Unknown => Err(GameError::InvalidMessage("unknown message type".into())),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::AppConfig,
        error::ReasonCode,
        state::{
            AppState,
            fanout::tests::{channel, received},
            question_bank::QuestionBank,
        },
    };

    fn app() -> SharedState {
        AppState::new(AppConfig::default(), QuestionBank::builtin())
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_invalid_messages() {
        let state = app();
        let (connection, _rx) = channel();

        for frame in ["{", r#"{"type": "DANCE"}"#, r#"{"type": "SUBMIT_ANSWER"}"#] {
            let err = dispatch(&state, &connection, frame).await.unwrap_err();
            assert_eq!(err.reason_code(), ReasonCode::InvalidMessage, "{frame}");
        }
    }

    #[tokio::test]
    async fn dispatch_routes_to_session_operations() {
        let state = app();
        let (connection, mut rx) = channel();

        let err = dispatch(&state, &connection, r#"{"type": "START_GAME"}"#)
            .await
            .unwrap_err();
        assert_eq!(err, GameError::NotJoined);

        let host = json!({"type": "HOST_GAME", "player": {"name": "ada"}}).to_string();
        dispatch(&state, &connection, &host).await.unwrap();
        let frames = received(&mut rx);
        assert_eq!(frames[0]["type"], "HOST_GAME_SUCCESS");
        assert_eq!(frames[0]["session"]["players"][0]["name"], "ada");
        assert_eq!(frames[0]["session"]["players"][0]["isHost"], true);
        assert_eq!(state.registry().len(), 1);

        dispatch(&state, &connection, r#"{"type": "LEAVE_SESSION"}"#)
            .await
            .unwrap();
        assert_eq!(received(&mut rx)[0]["type"], "LEFT_SESSION");
        assert!(state.registry().is_empty());
    }
}
