use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    state::{
        game::{ChatEntry, Player},
        question_bank::{Difficulty, Question},
        registry::LobbyEntry,
        state_machine::{RoundStart, Session, SessionStatus},
    },
};

/// Public projection of a roster entry. Chosen options stay private until the game ends.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Player identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Whether the player holds the host seat.
    pub is_host: bool,
    /// Ready flag while waiting.
    pub is_ready: bool,
    /// False while the player is inside the reconnect grace period.
    pub connected: bool,
    /// Cumulative score.
    pub score: u32,
    /// Consecutive correct answers.
    pub streak: u32,
    /// Current score multiplier.
    pub multiplier: u32,
    /// Whether the player already answered the round in progress.
    pub has_answered: bool,
}

impl PlayerView {
    fn new(player: &Player, current_round: Option<usize>) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            photo_url: player.photo_url.clone(),
            is_host: player.is_host,
            is_ready: player.is_ready,
            connected: player.connected,
            score: player.score,
            streak: player.streak,
            multiplier: player.multiplier,
            has_answered: current_round.is_some_and(|round| player.has_answered(round)),
        }
    }
}

/// Full session state pushed with every `SESSION_UPDATE`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Session identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Question tier.
    pub difficulty: Difficulty,
    /// Players in join order.
    pub players: Vec<PlayerView>,
    /// Selected rounds once started, requested rounds while waiting.
    pub question_count: usize,
    /// Round in progress while active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question_index: Option<usize>,
    /// Seconds per round.
    pub question_time_limit: u32,
    /// Roster capacity.
    pub max_players: usize,
    /// Players needed to start.
    pub min_players: usize,
    /// Creation time, RFC 3339.
    pub created_at: String,
    /// Set when the game starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// Set when the game finishes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let current_round = session.current_question_index();
        let settings = session.settings();
        let question_count = if session.questions().is_empty() {
            settings.question_count
        } else {
            session.questions().len()
        };

        Self {
            id: session.id(),
            name: session.name().to_string(),
            status: session.status(),
            difficulty: settings.difficulty,
            players: session
                .players()
                .map(|player| PlayerView::new(player, current_round))
                .collect(),
            question_count,
            current_question_index: current_round,
            question_time_limit: settings.time_limit_secs,
            max_players: settings.max_players,
            min_players: settings.min_players,
            created_at: format_system_time(session.created_at()),
            start_time: session.start_time().map(format_system_time),
            end_time: session.end_time().map(format_system_time),
        }
    }
}

/// Question as shown to players; the correct answer is withheld.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    /// Question identifier.
    pub id: String,
    /// Prompt.
    pub text: String,
    /// Category label.
    pub category: String,
    /// Tier.
    pub difficulty: Difficulty,
    /// Options in display order.
    pub options: Vec<String>,
    /// Base points for a right answer.
    pub points: u32,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            category: question.category.clone(),
            difficulty: question.difficulty,
            options: question.options.clone(),
            points: question.points,
        }
    }
}

/// Payload of `QUESTION_STARTED` / `NEXT_QUESTION`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    /// The question, without its answer.
    pub question: QuestionView,
    /// Seconds allowed for this round.
    pub time_limit: u32,
    /// Zero-based round number.
    pub round_index: usize,
    /// Rounds in this game.
    pub total_rounds: usize,
}

impl RoundView {
    /// Round payload for `round` of `session`.
    pub fn new(round: &RoundStart, session: &Session) -> Self {
        Self {
            question: QuestionView::from(round.question.as_ref()),
            time_limit: session.settings().time_limit_secs,
            round_index: round.round_index,
            total_rounds: session.questions().len(),
        }
    }
}

/// One line of the final leaderboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// 1-based position; tied scores share a rank.
    pub rank: usize,
    /// Final state of the player.
    pub player: PlayerView,
    /// Chosen option per round, `null` where the player did not answer.
    pub answers: Vec<Option<usize>>,
    /// Rounds answered correctly.
    pub correct_answers: usize,
}

/// Final leaderboard: descending score, ties in join order.
pub fn standings(session: &Session) -> Vec<Standing> {
    let correct: Vec<usize> = session
        .questions()
        .iter()
        .map(|question| question.correct_answer)
        .collect();

    let mut rank = 0;
    let mut previous_score = None;
    session
        .standings()
        .into_iter()
        .enumerate()
        .map(|(position, player)| {
            if previous_score != Some(player.score) {
                rank = position + 1;
                previous_score = Some(player.score);
            }
            Standing {
                rank,
                player: PlayerView::new(player, None),
                answers: player.answers.iter().map(|answer| answer.chosen()).collect(),
                correct_answers: player.correct_answers(correct.iter().copied()),
            }
        })
        .collect()
}

/// Chat line as delivered to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageView {
    /// Message identifier.
    pub id: Uuid,
    /// Author.
    pub player_id: Uuid,
    /// Author's display name at send time.
    pub player_name: String,
    /// Message body.
    pub text: String,
    /// Send time, RFC 3339.
    pub timestamp: String,
}

impl From<&ChatEntry> for ChatMessageView {
    fn from(entry: &ChatEntry) -> Self {
        Self {
            id: entry.id,
            player_id: entry.player_id,
            player_name: entry.player_name.clone(),
            text: entry.text.clone(),
            timestamp: format_system_time(entry.timestamp),
        }
    }
}

/// Retained chat history, oldest first.
pub fn chat_history(session: &Session) -> Vec<ChatMessageView> {
    session.chat_history().map(ChatMessageView::from).collect()
}

/// Lobby browser entry for a joinable session.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionListItem {
    /// Session identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Question tier.
    pub difficulty: Difficulty,
    /// Current roster size.
    pub player_count: usize,
    /// Roster capacity.
    pub max_players: usize,
    /// Current host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    /// Creation time, RFC 3339.
    pub created_at: String,
}

impl From<&LobbyEntry> for SessionListItem {
    fn from(entry: &LobbyEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name.clone(),
            difficulty: entry.difficulty,
            player_count: entry.player_count,
            max_players: entry.max_players,
            host_name: entry.host_name.clone(),
            created_at: format_system_time(entry.created_at),
        }
    }
}

/// Response payload listing the sessions a newcomer may join.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionsResponse {
    /// Joinable sessions, oldest first.
    pub sessions: Vec<SessionListItem>,
}

/// Pool size of one difficulty tier.
#[derive(Debug, Serialize, ToSchema)]
pub struct DifficultyPool {
    /// Tier.
    pub difficulty: Difficulty,
    /// Questions available.
    pub questions: usize,
}

/// Summary of the question bank.
#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogResponse {
    /// One entry per tier.
    pub difficulties: Vec<DifficultyPool>,
    /// Distinct categories, sorted.
    pub categories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        game::NewPlayer,
        question_bank::QuestionBank,
        state_machine::{RoundEnd, tests::settings},
    };

    fn started() -> (Session, Vec<Uuid>) {
        let mut session = Session::new(Uuid::new_v4(), settings(Difficulty::Medium, 2));
        let ids: Vec<Uuid> = ["ada", "bob", "cy"]
            .into_iter()
            .map(|name| {
                let id = Uuid::new_v4();
                session
                    .join(NewPlayer {
                        id,
                        name: name.into(),
                        photo_url: None,
                    })
                    .unwrap();
                session.set_ready(&id, true).unwrap();
                id
            })
            .collect();
        session.start(&ids[0], &QuestionBank::builtin()).unwrap();
        (session, ids)
    }

    #[test]
    fn session_view_hides_choices_and_correct_answer() {
        let (mut session, ids) = started();
        session.submit_answer(&ids[1], 0, None).unwrap();

        let view = serde_json::to_value(SessionView::from(&session)).unwrap();
        assert_eq!(view["status"], "active");
        assert_eq!(view["currentQuestionIndex"], 0);
        assert_eq!(view["players"][1]["hasAnswered"], true);
        assert_eq!(view["players"][0]["hasAnswered"], false);
        assert!(view["players"][1].get("answers").is_none());

        let round = session.current_round().unwrap();
        let question = serde_json::to_value(RoundView::new(&round, &session)).unwrap();
        assert!(question["question"].get("correctAnswer").is_none());
        assert_eq!(question["totalRounds"], 2);
        assert_eq!(question["timeLimit"], 30);
    }

    #[test]
    fn standings_rank_ties_and_expose_answers() {
        let (mut session, ids) = started();
        let right = session.current_round().unwrap().question.correct_answer;
        let wrong = (right + 1) % 4;
        session.submit_answer(&ids[0], wrong, None).unwrap();
        session.submit_answer(&ids[1], right, None).unwrap();
        session.submit_answer(&ids[2], right, None).unwrap();
        session.end_round(session.round_generation()).unwrap();
        let end = session.end_round(session.round_generation()).unwrap();
        assert!(matches!(end, RoundEnd::GameOver { .. }));

        let board = standings(&session);
        let ranks: Vec<_> = board.iter().map(|s| (s.player.id, s.rank)).collect();
        assert_eq!(ranks, vec![(ids[1], 1), (ids[2], 1), (ids[0], 3)]);
        assert_eq!(board[0].answers, vec![Some(right), None]);
        assert_eq!(board[0].correct_answers, 1);
        assert_eq!(board[2].correct_answers, 0);
    }
}
