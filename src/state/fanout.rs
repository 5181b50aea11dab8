use axum::extract::ws::Message;
use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::ws::ServerMessage,
    state::game::{PlayerId, SessionId},
};

/// Opaque identifier of one transport connection.
pub type ConnectionId = uuid::Uuid;

/// Handle used to push frames to a connected client.
#[derive(Clone, Debug)]
pub struct ClientConnection {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Writer channel feeding the socket task.
    pub tx: mpsc::UnboundedSender<Message>,
}

impl ClientConnection {
    /// Wrap a writer channel under a fresh identifier.
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            tx,
        }
    }

    /// Serialize and queue a single message. Returns false when the writer is gone.
    pub fn send(&self, message: &ServerMessage) -> bool {
        match encode(message) {
            Some(frame) => self.tx.send(frame).is_ok(),
            None => true,
        }
    }
}

/// Typed delivery interface the session logic talks to.
pub trait Notifier: Send + Sync {
    /// Deliver `message` to every bound connection of the session.
    fn broadcast(&self, session_id: &SessionId, message: &ServerMessage);
    /// Deliver `message` to one player's bound connection only.
    fn send_to_player(&self, session_id: &SessionId, player_id: &PlayerId, message: &ServerMessage);
}

/// Maps each session's players to their transport handles.
///
/// Senders are unbounded channels drained by per-socket writer tasks, so delivery
/// never blocks and messages keep the order they were handed over in.
#[derive(Default)]
pub struct Fanout {
    sessions: DashMap<SessionId, IndexMap<PlayerId, ClientConnection>>,
}

impl Fanout {
    /// Create an empty fanout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection` as the delivery target for `player_id`, replacing any previous one.
    pub fn bind(&self, session_id: SessionId, player_id: PlayerId, connection: ClientConnection) {
        self.sessions
            .entry(session_id)
            .or_default()
            .insert(player_id, connection);
    }

    /// Drop the binding of `player_id` if it still points at `connection_id`.
    pub fn unbind(&self, session_id: &SessionId, player_id: &PlayerId, connection_id: &ConnectionId) {
        if let Some(mut members) = self.sessions.get_mut(session_id) {
            if members
                .get(player_id)
                .is_some_and(|bound| bound.id == *connection_id)
            {
                members.shift_remove(player_id);
            }
        }
    }

    /// Forget every binding of a disposed session.
    pub fn drop_session(&self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }

    /// Number of bound connections across all sessions.
    pub fn connection_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Notifier for Fanout {
    fn broadcast(&self, session_id: &SessionId, message: &ServerMessage) {
        let Some(members) = self.sessions.get(session_id) else {
            return;
        };
        let Some(frame) = encode(message) else {
            return;
        };

        for (player_id, connection) in members.iter() {
            if connection.tx.send(frame.clone()).is_err() {
                debug!(%session_id, %player_id, "skipping closed connection during broadcast");
            }
        }
    }

    fn send_to_player(&self, session_id: &SessionId, player_id: &PlayerId, message: &ServerMessage) {
        let Some(connection) = self
            .sessions
            .get(session_id)
            .and_then(|members| members.get(player_id).cloned())
        else {
            debug!(%session_id, %player_id, "player has no bound connection; message dropped");
            return;
        };

        if !connection.send(message) {
            debug!(%session_id, %player_id, "private message to closed connection dropped");
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(Message::Text(payload.into())),
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::Value;
    use uuid::Uuid;

    use super::*;
    use crate::error::{GameError, ReasonCode};

    pub(crate) fn channel() -> (ClientConnection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ClientConnection::new(tx), rx)
    }

    /// Decode every queued text frame.
    pub(crate) fn received(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                frames.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        frames
    }

    pub(crate) fn types(frames: &[Value]) -> Vec<String> {
        frames
            .iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn error(code: &str) -> ServerMessage {
        ServerMessage::error(&GameError::InvalidMessage(code.into()))
    }

    #[test]
    fn broadcast_preserves_order_per_session() {
        let fanout = Fanout::new();
        let session = Uuid::new_v4();
        let (a, mut rx_a) = channel();
        let (b, mut rx_b) = channel();
        fanout.bind(session, Uuid::new_v4(), a);
        fanout.bind(session, Uuid::new_v4(), b);

        for i in 0..5 {
            fanout.broadcast(&session, &ServerMessage::TimeUpdate { time_left: 5 - i, round_index: 0 });
        }

        for rx in [&mut rx_a, &mut rx_b] {
            let left: Vec<_> = received(rx)
                .iter()
                .map(|frame| frame["timeLeft"].as_u64().unwrap())
                .collect();
            assert_eq!(left, vec![5, 4, 3, 2, 1]);
        }
    }

    #[test]
    fn broadcast_is_scoped_to_the_session() {
        let fanout = Fanout::new();
        let (a, mut rx_a) = channel();
        let (b, mut rx_b) = channel();
        let first = Uuid::new_v4();
        fanout.bind(first, Uuid::new_v4(), a);
        fanout.bind(Uuid::new_v4(), Uuid::new_v4(), b);

        fanout.broadcast(&first, &error("x"));
        assert_eq!(received(&mut rx_a).len(), 1);
        assert!(received(&mut rx_b).is_empty());
    }

    #[test]
    fn closed_or_unbound_targets_are_skipped_silently() {
        let fanout = Fanout::new();
        let session = Uuid::new_v4();
        let (gone, rx_gone) = channel();
        let (alive, mut rx_alive) = channel();
        drop(rx_gone);
        fanout.bind(session, Uuid::new_v4(), gone);
        let alive_player = Uuid::new_v4();
        fanout.bind(session, alive_player, alive);

        fanout.broadcast(&session, &error("x"));
        fanout.send_to_player(&session, &Uuid::new_v4(), &error("y"));
        fanout.send_to_player(&Uuid::new_v4(), &alive_player, &error("z"));

        let frames = received(&mut rx_alive);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["reasonCode"], serde_json::json!(ReasonCode::InvalidMessage));
    }

    #[test]
    fn private_messages_reach_only_the_target() {
        let fanout = Fanout::new();
        let session = Uuid::new_v4();
        let (a, mut rx_a) = channel();
        let (b, mut rx_b) = channel();
        let player_a = Uuid::new_v4();
        fanout.bind(session, player_a, a);
        fanout.bind(session, Uuid::new_v4(), b);

        fanout.send_to_player(&session, &player_a, &error("x"));
        assert_eq!(types(&received(&mut rx_a)), vec!["ERROR"]);
        assert!(received(&mut rx_b).is_empty());
    }

    #[test]
    fn stale_unbind_keeps_the_new_connection() {
        let fanout = Fanout::new();
        let session = Uuid::new_v4();
        let player = Uuid::new_v4();
        let (old, _rx_old) = channel();
        let (new, mut rx_new) = channel();
        let old_id = old.id;
        fanout.bind(session, player, old);
        fanout.bind(session, player, new);

        fanout.unbind(&session, &player, &old_id);
        assert_eq!(fanout.connection_count(), 1);
        fanout.send_to_player(&session, &player, &error("x"));
        assert_eq!(received(&mut rx_new).len(), 1);

        fanout.drop_session(&session);
        assert_eq!(fanout.connection_count(), 0);
    }
}
