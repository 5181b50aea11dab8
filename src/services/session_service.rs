//! Protocol operations of the game: every client action lands here once the socket
//! layer has parsed it, and every round transition is driven from here.

use std::sync::{Arc, Weak};

use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        session::{RoundView, SessionView, chat_history, standings},
        validation::validate_chat_text,
        ws::{HostGameRequest, PlayerInput, ServerMessage},
    },
    error::GameError,
    services::lobby_service::broadcast_lobby_sessions,
    state::{
        SharedState,
        fanout::{ClientConnection, ConnectionId, Notifier},
        game::{NewPlayer, SessionId},
        presence::Binding,
        registry::SessionHandle,
        state_machine::{RoundEnd, Session, SessionSettings, SessionStatus},
    },
};

const DEFAULT_HOST_NAME: &str = "Host";
const MIN_TIME_LIMIT_SECS: u32 = 5;
const MAX_TIME_LIMIT_SECS: u32 = 120;
const MAX_QUESTION_COUNT: usize = 50;

/// Create a session with the caller as host.
pub async fn host_game(
    state: &SharedState,
    connection: &ClientConnection,
    request: HostGameRequest,
) -> Result<(), GameError> {
    ensure_unbound(state, &connection.id)?;
    let player = match request.player {
        Some(player) => new_player(player)?,
        None => NewPlayer {
            id: Uuid::new_v4(),
            name: DEFAULT_HOST_NAME.into(),
            photo_url: None,
        },
    };

    let config = state.config();
    let settings = SessionSettings {
        difficulty: request.difficulty.unwrap_or(config.default_difficulty),
        question_count: request
            .question_count
            .unwrap_or(config.question_count)
            .clamp(1, MAX_QUESTION_COUNT),
        time_limit_secs: request
            .time_limit
            .unwrap_or(config.question_time_limit_secs)
            .clamp(MIN_TIME_LIMIT_SECS, MAX_TIME_LIMIT_SECS),
        max_players: config.max_players,
        min_players: config.min_players,
        chat_history_limit: config.chat_history_limit,
    };

    let handle = state.registry().create(settings);
    {
        let mut session = handle.lock().await;
        let (player_id, reconnect_token) = {
            let host = session.join(player)?;
            (host.id, host.reconnect_token)
        };
        bind(state, connection, session.id(), player_id);

        info!(
            session_id = %session.id(),
            player_id = %player_id,
            difficulty = ?session.settings().difficulty,
            "session hosted"
        );
        connection.send(&ServerMessage::HostGameSuccess {
            session_id: session.id(),
            player_id,
            reconnect_token,
            session: SessionView::from(&*session),
        });
        publish_lobby(state, &session);
    }

    Ok(())
}

/// Add the caller to an existing waiting session.
pub async fn join_session(
    state: &SharedState,
    connection: &ClientConnection,
    session_id: SessionId,
    player: PlayerInput,
) -> Result<(), GameError> {
    ensure_unbound(state, &connection.id)?;
    let player = new_player(player)?;
    let handle = state.registry().get(&session_id)?;
    {
        let mut session = handle.lock().await;
        let (player_id, reconnect_token) = {
            let joined = session.join(player)?;
            (joined.id, joined.reconnect_token)
        };
        bind(state, connection, session_id, player_id);

        info!(%session_id, %player_id, players = session.player_count(), "player joined");
        connection.send(&ServerMessage::JoinSessionSuccess {
            session_id,
            player_id,
            reconnect_token,
            session: SessionView::from(&*session),
            chat_history: chat_history(&session),
        });
        broadcast_session_update(state, &session);
        publish_lobby(state, &session);
    }

    Ok(())
}

/// Reclaim a seat from a new connection using the player's reconnect token.
pub async fn rejoin_session(
    state: &SharedState,
    connection: &ClientConnection,
    session_id: SessionId,
    player_id: Uuid,
    reconnect_token: Uuid,
) -> Result<(), GameError> {
    ensure_unbound(state, &connection.id)?;
    let handle = state.registry().get(&session_id)?;
    let mut session = handle.lock().await;
    session.verify_rejoin(&player_id, &reconnect_token)?;
    session.set_connected(&player_id, true)?;
    if let Some(previous) = bind(state, connection, session_id, player_id) {
        debug!(%session_id, %player_id, connection_id = %previous, "previous connection evicted");
    }

    info!(%session_id, %player_id, "player rejoined");
    connection.send(&ServerMessage::RejoinSessionSuccess {
        session_id,
        player_id,
        session: SessionView::from(&*session),
        question: session
            .current_round()
            .map(|round| RoundView::new(&round, &session)),
        chat_history: chat_history(&session),
    });
    broadcast_session_update(state, &session);
    Ok(())
}

/// Toggle the caller's ready flag.
pub async fn set_ready(
    state: &SharedState,
    connection: &ClientConnection,
    ready: bool,
) -> Result<(), GameError> {
    let binding = require_binding(state, &connection.id)?;
    let handle = state.registry().get(&binding.session_id)?;
    {
        let mut session = handle.lock().await;
        session.set_ready(&binding.player_id, ready)?;
        debug!(session_id = %binding.session_id, player_id = %binding.player_id, ready, "ready toggled");
        broadcast_session_update(state, &session);
        publish_lobby(state, &session);
    }

    Ok(())
}

/// Start the game on behalf of the caller, who must be the host.
pub async fn start_game(state: &SharedState, connection: &ClientConnection) -> Result<(), GameError> {
    let binding = require_binding(state, &connection.id)?;
    let handle = state.registry().get(&binding.session_id)?;
    {
        let mut session = handle.lock().await;
        let round = session.start(&binding.player_id, state.bank())?;

        info!(
            session_id = %binding.session_id,
            rounds = session.questions().len(),
            "game started"
        );
        let notifier = state.fanout();
        notifier.broadcast(
            &binding.session_id,
            &ServerMessage::GameStarted {
                session: SessionView::from(&*session),
            },
        );
        notifier.broadcast(
            &binding.session_id,
            &ServerMessage::question(RoundView::new(&round, &session)),
        );
        start_round_timer(state, &handle, &session, round.generation);
        publish_lobby(state, &session);
    }

    Ok(())
}

/// Record the caller's answer for the open round.
pub async fn submit_answer(
    state: &SharedState,
    connection: &ClientConnection,
    answer_index: usize,
    round_index: Option<usize>,
) -> Result<(), GameError> {
    let binding = require_binding(state, &connection.id)?;
    let handle = state.registry().get(&binding.session_id)?;
    let mut session = handle.lock().await;
    let outcome = session.submit_answer(&binding.player_id, answer_index, round_index)?;

    debug!(
        session_id = %binding.session_id,
        player_id = %binding.player_id,
        round = outcome.round_index,
        correct = outcome.correct,
        "answer recorded"
    );
    let notifier = state.fanout();
    notifier.send_to_player(
        &binding.session_id,
        &binding.player_id,
        &ServerMessage::AnswerResult {
            round_index: outcome.round_index,
            correct: outcome.correct,
            points_awarded: outcome.points_awarded,
            new_score: outcome.new_score,
            new_streak: outcome.new_streak,
            multiplier: outcome.multiplier,
        },
    );
    notifier.broadcast(
        &binding.session_id,
        &ServerMessage::PlayerAnswered {
            player_id: binding.player_id,
            round_index: outcome.round_index,
        },
    );

    if outcome.round_complete {
        handle.timer().cancel();
        let generation = session.round_generation();
        finish_round(state, &handle, &mut session, generation);
    }
    Ok(())
}

/// Relay a chat line to the caller's session.
pub async fn send_chat(
    state: &SharedState,
    connection: &ClientConnection,
    text: &str,
) -> Result<(), GameError> {
    let binding = require_binding(state, &connection.id)?;
    validate_chat_text(text).map_err(|err| GameError::InvalidMessage(err.to_string()))?;
    let handle = state.registry().get(&binding.session_id)?;
    let mut session = handle.lock().await;
    let entry = session.push_chat(&binding.player_id, text.trim().to_string())?;

    state.fanout().broadcast(
        &binding.session_id,
        &ServerMessage::ChatMessage {
            message: (&entry).into(),
        },
    );
    Ok(())
}

/// Explicitly leave the caller's session.
pub async fn leave_session(state: &SharedState, connection: &ClientConnection) -> Result<(), GameError> {
    let binding = state
        .presence()
        .unbind(&connection.id)
        .ok_or(GameError::NotJoined)?;
    state
        .fanout()
        .unbind(&binding.session_id, &binding.player_id, &connection.id);
    connection.send(&ServerMessage::LeftSession {
        session_id: binding.session_id,
    });

    info!(session_id = %binding.session_id, player_id = %binding.player_id, "player left");
    remove_player(state, binding, false).await;
    Ok(())
}

/// Handle a closed socket: leave immediately, or keep the seat for the grace period.
pub async fn disconnect(state: &SharedState, connection_id: &ConnectionId) {
    let Some(binding) = state.presence().unbind(connection_id) else {
        return;
    };
    state
        .fanout()
        .unbind(&binding.session_id, &binding.player_id, connection_id);

    let grace = state.presence().grace();
    if grace.is_zero() {
        info!(session_id = %binding.session_id, player_id = %binding.player_id, "player disconnected");
        remove_player(state, binding, false).await;
        return;
    }

    let Ok(handle) = state.registry().get(&binding.session_id) else {
        return;
    };
    {
        let mut session = handle.lock().await;
        if session.set_connected(&binding.player_id, false).is_err() {
            return;
        }
        info!(
            session_id = %binding.session_id,
            player_id = %binding.player_id,
            grace_secs = grace.as_secs(),
            "player disconnected; holding seat"
        );
        broadcast_session_update(state, &session);
        complete_round_if_answered(state, &handle, &mut session);
    }

    let task_state = state.clone();
    let task = tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        task_state.presence().finish_departure(&binding.player_id);
        remove_player(&task_state, binding, true).await;
    });
    state
        .presence()
        .schedule_departure(binding.player_id, task.abort_handle());
}

/// Drop a player from the roster, disposing the session once it is empty.
async fn remove_player(state: &SharedState, binding: Binding, only_if_disconnected: bool) {
    let Ok(handle) = state.registry().get(&binding.session_id) else {
        return;
    };

    let mut session = handle.lock().await;
    if only_if_disconnected
        && session
            .player(&binding.player_id)
            .is_none_or(|player| player.connected)
    {
        return;
    }
    let Some(departure) = session.remove_player(&binding.player_id) else {
        return;
    };

    if departure.roster_empty {
        handle.timer().cancel();
        drop(session);
        dispose_session(state, &binding.session_id);
        broadcast_lobby_sessions(state);
    } else {
        if let Some(host) = departure.new_host {
            info!(session_id = %binding.session_id, player_id = %host, "host reassigned");
        }
        broadcast_session_update(state, &session);
        complete_round_if_answered(state, &handle, &mut session);
        publish_lobby(state, &session);
    }
}

/// Refresh the lobby summary of `session` and push the joinable list. Call while holding its lock.
fn publish_lobby(state: &SharedState, session: &Session) {
    state.registry().refresh_lobby(session);
    broadcast_lobby_sessions(state);
}

fn dispose_session(state: &SharedState, session_id: &SessionId) {
    if state.registry().dispose(session_id).is_some() {
        state.fanout().drop_session(session_id);
        info!(%session_id, "session disposed after last player left");
    }
}

fn complete_round_if_answered(state: &SharedState, handle: &Arc<SessionHandle>, session: &mut Session) {
    if session.all_answered() {
        handle.timer().cancel();
        let generation = session.round_generation();
        finish_round(state, handle, session, generation);
    }
}

/// Close the round stamped `generation` and announce what comes next.
///
/// Runs with the session lock held so the broadcasts keep the order of the transitions.
fn finish_round(state: &SharedState, handle: &Arc<SessionHandle>, session: &mut Session, generation: u64) {
    let Some(end) = session.end_round(generation) else {
        debug!(session_id = %session.id(), generation, "stale round completion ignored");
        return;
    };

    let session_id = session.id();
    let notifier = state.fanout();
    let reveal = match &end {
        RoundEnd::Next { reveal, .. } | RoundEnd::GameOver { reveal } => *reveal,
    };
    notifier.broadcast(
        &session_id,
        &ServerMessage::RoundEnded {
            round_index: reveal.round_index,
            correct_answer: reveal.correct_answer,
            session: SessionView::from(&*session),
        },
    );

    match end {
        RoundEnd::Next { round, .. } => {
            debug!(%session_id, round = round.round_index, "next round");
            notifier.broadcast(
                &session_id,
                &ServerMessage::question(RoundView::new(&round, session)),
            );
            start_round_timer(state, handle, session, round.generation);
        }
        RoundEnd::GameOver { .. } => {
            handle.timer().cancel();
            info!(%session_id, "game over");
            notifier.broadcast(
                &session_id,
                &ServerMessage::GameOver {
                    session: SessionView::from(&*session),
                    standings: standings(session),
                },
            );
        }
    }
}

fn start_round_timer(state: &SharedState, handle: &Arc<SessionHandle>, session: &Session, generation: u64) {
    let Some(round_index) = session.current_question_index() else {
        warn!(session_id = %session.id(), "round timer requested outside an active game");
        return;
    };
    let session_id = session.id();

    let tick_state = state.clone();
    let tick_handle = Arc::downgrade(handle);
    let expire_state = state.clone();
    let expire_handle = Arc::downgrade(handle);

    handle.timer().start(
        session.settings().time_limit_secs,
        move |time_left| {
            let state = tick_state.clone();
            let handle = tick_handle.clone();
            async move {
                let Some(handle) = handle.upgrade() else {
                    return;
                };
                let session = handle.lock().await;
                if session.round_generation() == generation {
                    state.fanout().broadcast(
                        &session_id,
                        &ServerMessage::TimeUpdate {
                            time_left,
                            round_index,
                        },
                    );
                }
            }
            .boxed()
        },
        move || expire_round(expire_state, expire_handle, generation).boxed(),
    );
}

async fn expire_round(state: SharedState, handle: Weak<SessionHandle>, generation: u64) {
    let Some(handle) = handle.upgrade() else {
        return;
    };
    let mut session = handle.lock().await;
    if session.status() != SessionStatus::Active || session.round_generation() != generation {
        debug!(session_id = %handle.id(), generation, "stale round timer ignored");
        return;
    }

    info!(
        session_id = %handle.id(),
        round = session.current_question_index(),
        "round timer expired"
    );
    finish_round(&state, &handle, &mut session, generation);
}

fn new_player(input: PlayerInput) -> Result<NewPlayer, GameError> {
    input.validate()?;
    Ok(NewPlayer {
        id: Uuid::new_v4(),
        name: input.name.trim().to_string(),
        photo_url: input.photo_url,
    })
}

fn ensure_unbound(state: &SharedState, connection_id: &ConnectionId) -> Result<(), GameError> {
    match state.presence().binding(connection_id) {
        Some(_) => Err(GameError::AlreadyJoined),
        None => Ok(()),
    }
}

fn require_binding(state: &SharedState, connection_id: &ConnectionId) -> Result<Binding, GameError> {
    state
        .presence()
        .binding(connection_id)
        .ok_or(GameError::NotJoined)
}

fn bind(
    state: &SharedState,
    connection: &ClientConnection,
    session_id: SessionId,
    player_id: Uuid,
) -> Option<ConnectionId> {
    state
        .fanout()
        .bind(session_id, player_id, connection.clone());
    state.presence().bind(
        connection.id,
        Binding {
            session_id,
            player_id,
        },
    )
}

fn broadcast_session_update(state: &SharedState, session: &Session) {
    state.fanout().broadcast(
        &session.id(),
        &ServerMessage::SessionUpdate {
            session: session.into(),
        },
    );
}
