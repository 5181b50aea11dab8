use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidateUrl, ValidationError, ValidationErrors};

use crate::{
    dto::{
        session::{ChatMessageView, RoundView, SessionView, Standing},
        validation::validate_display_name,
    },
    error::{GameError, ReasonCode},
    state::question_bank::Difficulty,
};

/// Identity a client presents when it enters a session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInput {
    /// Display name, trimmed and capped.
    pub name: String,
    /// Optional avatar URL.
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Validate for PlayerInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_display_name(&self.name) {
            errors.add("name", e);
        }

        if let Some(ref url) = self.photo_url {
            if !url.validate_url() {
                let mut err = ValidationError::new("url");
                err.message = Some("photo URL must be a valid URL".into());
                errors.add("photo_url", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Optional parameters of `HOST_GAME`; anything missing falls back to configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostGameRequest {
    /// Host identity; defaults to `Host`.
    pub player: Option<PlayerInput>,
    /// Question tier.
    pub difficulty: Option<Difficulty>,
    /// Seconds per round.
    pub time_limit: Option<u32>,
    /// Rounds to play.
    pub question_count: Option<usize>,
}

/// Messages accepted from game WebSocket clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Create a session and take its host seat.
    HostGame(HostGameRequest),
    /// Take a seat in a waiting session.
    JoinSession {
        /// Session to join.
        session_id: Uuid,
        /// Identity of the newcomer.
        player: PlayerInput,
    },
    /// Reclaim a seat after the previous connection dropped.
    RejoinSession {
        /// Session the seat belongs to.
        session_id: Uuid,
        /// Player id returned by the original join.
        player_id: Uuid,
        /// Secret returned by the original join.
        reconnect_token: Uuid,
    },
    /// Toggle the ready flag while waiting.
    PlayerReady {
        /// New value of the flag.
        ready: bool,
    },
    /// Host only: begin the first round.
    StartGame,
    /// Answer the open round.
    SubmitAnswer {
        /// Index of the chosen option.
        answer_index: usize,
        /// Round the client believes it is answering.
        #[serde(default)]
        round_index: Option<usize>,
    },
    /// Post a chat line to the session.
    ChatMessage {
        /// Message body, trimmed before storing.
        text: String,
    },
    /// Give up the seat.
    LeaveSession,
    /// Any unrecognised `type`.
    #[serde(other)]
    Unknown,
}

/// Messages pushed to game WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// First frame on every socket.
    Connected {
        /// Identifier of this transport connection.
        connection_id: Uuid,
    },
    /// Roster or status changed.
    SessionUpdate {
        /// Current session state.
        session: SessionView,
    },
    /// Reply to `HOST_GAME`.
    HostGameSuccess {
        /// Newly created session.
        session_id: Uuid,
        /// Host's player id.
        player_id: Uuid,
        /// Secret needed to rejoin after a drop.
        reconnect_token: Uuid,
        /// Current session state.
        session: SessionView,
    },
    /// Reply to `JOIN_SESSION`.
    JoinSessionSuccess {
        /// Joined session.
        session_id: Uuid,
        /// Newcomer's player id.
        player_id: Uuid,
        /// Secret needed to rejoin after a drop.
        reconnect_token: Uuid,
        /// Current session state.
        session: SessionView,
        /// Retained chat, oldest first.
        chat_history: Vec<ChatMessageView>,
    },
    /// Reply to `REJOIN_SESSION`.
    RejoinSessionSuccess {
        /// Rejoined session.
        session_id: Uuid,
        /// Reclaimed player id.
        player_id: Uuid,
        /// Current session state.
        session: SessionView,
        /// Open round, if one is running.
        #[serde(skip_serializing_if = "Option::is_none")]
        question: Option<RoundView>,
        /// Retained chat, oldest first.
        chat_history: Vec<ChatMessageView>,
    },
    /// The host started the game.
    GameStarted {
        /// Session, now active.
        session: SessionView,
    },
    /// Opening round.
    QuestionStarted(RoundView),
    /// Any round after the first.
    NextQuestion(RoundView),
    /// Once per second while a round is open.
    TimeUpdate {
        /// Seconds left.
        time_left: u32,
        /// Round being timed.
        round_index: usize,
    },
    /// Someone answered; the choice stays private.
    PlayerAnswered {
        /// Who answered.
        player_id: Uuid,
        /// Round answered.
        round_index: usize,
    },
    /// Private outcome of the recipient's own answer.
    AnswerResult {
        /// Round answered.
        round_index: usize,
        /// Whether the chosen option was right.
        correct: bool,
        /// Points added by this answer.
        points_awarded: u32,
        /// Score after the answer.
        new_score: u32,
        /// Streak after the answer.
        new_streak: u32,
        /// Multiplier after the answer.
        multiplier: u32,
    },
    /// Round closed, by timeout or because everyone answered.
    RoundEnded {
        /// Round that closed.
        round_index: usize,
        /// Index of the right option.
        correct_answer: usize,
        /// Scores after the round.
        session: SessionView,
    },
    /// Last round closed.
    GameOver {
        /// Finished session.
        session: SessionView,
        /// Final leaderboard.
        standings: Vec<Standing>,
    },
    /// New chat line.
    ChatMessage {
        /// The line as stored.
        message: ChatMessageView,
    },
    /// Reply to `LEAVE_SESSION`.
    LeftSession {
        /// Session that was left.
        session_id: Uuid,
    },
    /// A rejected action.
    Error {
        /// Human readable reason.
        message: String,
        /// Stable machine readable reason.
        reason_code: ReasonCode,
    },
}

impl ServerMessage {
    /// `ERROR` reply describing a rejected action.
    pub fn error(err: &GameError) -> Self {
        Self::Error {
            message: err.to_string(),
            reason_code: err.reason_code(),
        }
    }

    /// `QUESTION_STARTED` for the opening round, `NEXT_QUESTION` afterwards.
    pub fn question(round: RoundView) -> Self {
        if round.round_index == 0 {
            Self::QuestionStarted(round)
        } else {
            Self::NextQuestion(round)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(value: serde_json::Value) -> ClientMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_client_messages() {
        assert!(matches!(
            parse(json!({"type": "HOST_GAME"})),
            ClientMessage::HostGame(HostGameRequest { player: None, difficulty: None, .. })
        ));
        assert!(matches!(
            parse(json!({"type": "HOST_GAME", "difficulty": "hard", "questionCount": 3})),
            ClientMessage::HostGame(HostGameRequest {
                difficulty: Some(Difficulty::Hard),
                question_count: Some(3),
                ..
            })
        ));

        let session_id = Uuid::new_v4();
        match parse(json!({
            "type": "JOIN_SESSION",
            "sessionId": session_id,
            "player": {"name": "ada", "photoUrl": "https://example.com/a.png"}
        })) {
            ClientMessage::JoinSession { session_id: id, player } => {
                assert_eq!(id, session_id);
                assert_eq!(player.name, "ada");
                assert!(player.validate().is_ok());
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            parse(json!({"type": "SUBMIT_ANSWER", "answerIndex": 2})),
            ClientMessage::SubmitAnswer { answer_index: 2, round_index: None }
        ));
        assert!(matches!(parse(json!({"type": "START_GAME"})), ClientMessage::StartGame));
        assert!(matches!(parse(json!({"type": "LEAVE_SESSION"})), ClientMessage::LeaveSession));
    }

    #[test]
    fn unknown_types_and_bad_payloads() {
        assert!(matches!(parse(json!({"type": "DANCE"})), ClientMessage::Unknown));
        assert!(
            serde_json::from_value::<ClientMessage>(json!({"type": "SUBMIT_ANSWER", "answerIndex": -1}))
                .is_err()
        );
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn invalid_player_input_fails_validation() {
        let input = PlayerInput {
            name: "   ".into(),
            photo_url: Some("not a url".into()),
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
        assert!(errors.field_errors().contains_key("photo_url"));
    }

    #[test]
    fn server_messages_are_tagged() {
        let value = serde_json::to_value(ServerMessage::TimeUpdate {
            time_left: 7,
            round_index: 1,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "TIME_UPDATE", "timeLeft": 7, "roundIndex": 1}));

        let value = serde_json::to_value(ServerMessage::error(&GameError::NotHost)).unwrap();
        assert_eq!(value["type"], "ERROR");
        assert_eq!(value["reasonCode"], "NotHost");
        assert_eq!(value["message"], "only the host can start the game");
    }
}
