use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

/// Stable symbolic reasons attached to every rejected client action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum ReasonCode {
    /// Only the host may perform this action.
    NotHost,
    /// At least one player has not marked themselves ready.
    NotAllReady,
    /// Not enough players in the lobby to start.
    InsufficientPlayers,
    /// No session with this identifier exists.
    SessionNotFound,
    /// The roster is at capacity.
    SessionFull,
    /// The player already answered the current round.
    AlreadyAnswered,
    /// The action is not allowed in the current session status.
    WrongState,
    /// The player is not part of the session roster.
    PlayerNotFound,
    /// The connection has not joined a session yet.
    NotJoined,
    /// The connection (or player) is already bound to a session.
    AlreadyJoined,
    /// The answer index does not designate an option.
    InvalidAnswer,
    /// The frame could not be parsed or failed validation.
    InvalidMessage,
    /// Rejoin token does not match the player.
    InvalidToken,
    /// The question bank has nothing for the session difficulty.
    NoQuestionsAvailable,
}

/// Guard failures raised by the session state machine and the protocol layer.
///
/// None of these mutate session state; the caller must issue a corrected request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Caller is not the host.
    #[error("only the host can start the game")]
    NotHost,
    /// Someone on the roster is not ready.
    #[error("every player must be ready before the game starts")]
    NotAllReady,
    /// Roster is below the configured minimum.
    #[error("at least {required} players are needed to start")]
    InsufficientPlayers {
        /// Minimum roster size.
        required: usize,
    },
    /// Unknown or disposed session.
    #[error("session not found")]
    SessionNotFound,
    /// Roster is at capacity.
    #[error("session is full ({max} players)")]
    SessionFull {
        /// Roster capacity.
        max: usize,
    },
    /// Player already answered the round in question.
    #[error("answer already submitted for this round")]
    AlreadyAnswered,
    /// Action not legal in the session's current status.
    #[error("action not allowed while the session is {status}")]
    WrongState {
        /// Current status, lowercase.
        status: &'static str,
    },
    /// Player is not on the roster.
    #[error("player is not part of this session")]
    PlayerNotFound,
    /// Connection is not bound to a session yet.
    #[error("join or host a session first")]
    NotJoined,
    /// Connection is already bound to a session.
    #[error("already joined a session")]
    AlreadyJoined,
    /// Option index outside the question's options.
    #[error("answer index {index} is out of range")]
    InvalidAnswer {
        /// Index the client sent.
        index: usize,
    },
    /// Malformed frame or payload that failed validation.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// Reconnect token does not match the seat.
    #[error("reconnect token does not match")]
    InvalidToken,
    /// Question bank has nothing at the session's difficulty.
    #[error("no questions available for this difficulty")]
    NoQuestionsAvailable,
}

impl GameError {
    /// Symbolic reason forwarded to clients alongside the message.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            GameError::NotHost => ReasonCode::NotHost,
            GameError::NotAllReady => ReasonCode::NotAllReady,
            GameError::InsufficientPlayers { .. } => ReasonCode::InsufficientPlayers,
            GameError::SessionNotFound => ReasonCode::SessionNotFound,
            GameError::SessionFull { .. } => ReasonCode::SessionFull,
            GameError::AlreadyAnswered => ReasonCode::AlreadyAnswered,
            GameError::WrongState { .. } => ReasonCode::WrongState,
            GameError::PlayerNotFound => ReasonCode::PlayerNotFound,
            GameError::NotJoined => ReasonCode::NotJoined,
            GameError::AlreadyJoined => ReasonCode::AlreadyJoined,
            GameError::InvalidAnswer { .. } => ReasonCode::InvalidAnswer,
            GameError::InvalidMessage(_) => ReasonCode::InvalidMessage,
            GameError::InvalidToken => ReasonCode::InvalidToken,
            GameError::NoQuestionsAvailable => ReasonCode::NoQuestionsAvailable,
        }
    }
}

impl From<ValidationErrors> for GameError {
    fn from(err: ValidationErrors) -> Self {
        GameError::InvalidMessage(format!("validation failed: {err}"))
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A game rule rejected the operation.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Game(GameError::SessionNotFound) => {
                AppError::NotFound("session not found".into())
            }
            ServiceError::Game(
                err @ (GameError::InvalidMessage(_) | GameError::InvalidAnswer { .. }),
            ) => AppError::BadRequest(err.to_string()),
            ServiceError::Game(err) => AppError::Conflict(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_serialize_as_symbols() {
        let code = GameError::InsufficientPlayers { required: 2 }.reason_code();
        assert_eq!(
            serde_json::to_string(&code).unwrap(),
            "\"InsufficientPlayers\""
        );
        assert_eq!(
            serde_json::to_string(&GameError::WrongState { status: "active" }.reason_code())
                .unwrap(),
            "\"WrongState\""
        );
    }

    #[test]
    fn missing_session_maps_to_not_found() {
        let app: AppError = ServiceError::from(GameError::SessionNotFound).into();
        assert!(matches!(app, AppError::NotFound(_)));

        let app: AppError = ServiceError::from(GameError::NotHost).into();
        assert!(matches!(app, AppError::Conflict(_)));
    }
}
