use std::{collections::VecDeque, sync::Arc, time::SystemTime};

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::GameError,
    state::{
        game::{ChatEntry, NewPlayer, Player, PlayerId, SessionId},
        question_bank::{Difficulty, Question, QuestionBank},
    },
};

/// Lifecycle of a session. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting joins and ready toggles.
    Waiting,
    /// Round loop running.
    Active,
    /// Results available, no further gameplay.
    Finished,
}

impl SessionStatus {
    /// Lowercase label used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::Finished => "finished",
        }
    }
}

/// Parameters fixed when a session is created.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Difficulty of the question pool.
    pub difficulty: Difficulty,
    /// Number of rounds requested from the question bank.
    pub question_count: usize,
    /// Seconds allowed per round.
    pub time_limit_secs: u32,
    /// Roster capacity.
    pub max_players: usize,
    /// Roster size required to start.
    pub min_players: usize,
    /// Chat messages retained.
    pub chat_history_limit: usize,
}

/// A round that just opened.
#[derive(Debug, Clone)]
pub struct RoundStart {
    /// Stamp identifying this round; timer callbacks must present it.
    pub generation: u64,
    /// Zero-based round number.
    pub round_index: usize,
    /// Question asked in this round.
    pub question: Arc<Question>,
}

/// Result of an accepted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// Round the answer was recorded for.
    pub round_index: usize,
    /// Whether the chosen option was the right one.
    pub correct: bool,
    /// Points added by this answer.
    pub points_awarded: u32,
    /// Player score after the answer.
    pub new_score: u32,
    /// Player streak after the answer.
    pub new_streak: u32,
    /// Player multiplier after the answer.
    pub multiplier: u32,
    /// Every connected player has now answered the round.
    pub round_complete: bool,
}

/// Correct answer revealed when a round closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundReveal {
    /// Round that just closed.
    pub round_index: usize,
    /// Index of the right option.
    pub correct_answer: usize,
}

/// What happened when a round closed.
#[derive(Debug, Clone)]
pub enum RoundEnd {
    /// Another round opened.
    Next {
        /// Answer of the round that closed.
        reveal: RoundReveal,
        /// Round that opened.
        round: RoundStart,
    },
    /// That was the last round; the session is now finished.
    GameOver {
        /// Answer of the last round.
        reveal: RoundReveal,
    },
}

/// Outcome of removing a player from the roster.
#[derive(Debug, Clone)]
pub struct Departure {
    /// The removed roster entry.
    pub player: Player,
    /// Player promoted to host, when the host left.
    pub new_host: Option<PlayerId>,
    /// The roster is now empty; the session must be disposed.
    pub roster_empty: bool,
}

/// Aggregate root of one game instance.
///
/// Every method is synchronous and either applies a whole transition or returns a
/// [`GameError`] without touching state. Callers serialize access per session.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    name: String,
    status: SessionStatus,
    settings: SessionSettings,
    players: IndexMap<PlayerId, Player>,
    questions: Vec<Arc<Question>>,
    current_question_index: usize,
    round_generation: u64,
    created_at: SystemTime,
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    chat: VecDeque<ChatEntry>,
    closed: bool,
}

impl Session {
    /// New waiting session with an empty roster.
    pub fn new(id: SessionId, settings: SessionSettings) -> Self {
        let short_id = id.simple().to_string();
        Self {
            id,
            name: format!("Game {}", &short_id[..8]),
            status: SessionStatus::Waiting,
            settings,
            players: IndexMap::new(),
            questions: Vec::new(),
            current_question_index: 0,
            round_generation: 0,
            created_at: SystemTime::now(),
            start_time: None,
            end_time: None,
            chat: VecDeque::new(),
            closed: false,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Creation-time parameters.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Roster in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Roster size.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Look up a roster entry.
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Current host, if the roster is not empty.
    pub fn host(&self) -> Option<&Player> {
        self.players.values().find(|player| player.is_host)
    }

    /// Questions selected at game start.
    pub fn questions(&self) -> &[Arc<Question>] {
        &self.questions
    }

    /// Round in progress, only meaningful while active.
    pub fn current_question_index(&self) -> Option<usize> {
        (self.status == SessionStatus::Active).then_some(self.current_question_index)
    }

    /// Stamp of the round in progress. Changes every time a round opens or closes.
    pub fn round_generation(&self) -> u64 {
        self.round_generation
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Set when the session became active.
    pub fn start_time(&self) -> Option<SystemTime> {
        self.start_time
    }

    /// Set when the session finished.
    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    /// Retained chat history, oldest first.
    pub fn chat_history(&self) -> impl Iterator<Item = &ChatEntry> {
        self.chat.iter()
    }

    /// True once the roster emptied; the registry is disposing of this session.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a newcomer could join right now.
    pub fn is_joinable(&self) -> bool {
        !self.closed
            && self.status == SessionStatus::Waiting
            && self.players.len() < self.settings.max_players
    }

    /// The round currently open, if any.
    pub fn current_round(&self) -> Option<RoundStart> {
        let round_index = self.current_question_index()?;
        Some(RoundStart {
            generation: self.round_generation,
            round_index,
            question: self.questions.get(round_index)?.clone(),
        })
    }

    /// Add a player to the roster. The first player becomes host.
    pub fn join(&mut self, new: NewPlayer) -> Result<&Player, GameError> {
        if self.closed {
            return Err(GameError::SessionNotFound);
        }
        self.ensure_status(SessionStatus::Waiting)?;
        if self.players.contains_key(&new.id) {
            return Err(GameError::AlreadyJoined);
        }
        if self.players.len() >= self.settings.max_players {
            return Err(GameError::SessionFull {
                max: self.settings.max_players,
            });
        }

        let id = new.id;
        let is_host = self.players.is_empty();
        self.players.insert(id, Player::new(new, is_host));
        self.players.get(&id).ok_or(GameError::PlayerNotFound)
    }

    /// Toggle a player's ready flag while waiting.
    pub fn set_ready(&mut self, player_id: &PlayerId, ready: bool) -> Result<(), GameError> {
        self.ensure_status(SessionStatus::Waiting)?;
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(GameError::PlayerNotFound)?;
        player.is_ready = ready;
        Ok(())
    }

    /// Start the game on behalf of `caller`, drawing questions from `bank`.
    pub fn start(&mut self, caller: &PlayerId, bank: &QuestionBank) -> Result<RoundStart, GameError> {
        self.ensure_status(SessionStatus::Waiting)?;
        let player = self.players.get(caller).ok_or(GameError::PlayerNotFound)?;
        if !player.is_host {
            return Err(GameError::NotHost);
        }
        if self.players.len() < self.settings.min_players {
            return Err(GameError::InsufficientPlayers {
                required: self.settings.min_players,
            });
        }
        if !self.players.values().all(|player| player.is_ready) {
            return Err(GameError::NotAllReady);
        }

        let questions = bank.select_round(self.settings.difficulty, self.settings.question_count);
        if questions.is_empty() {
            return Err(GameError::NoQuestionsAvailable);
        }

        self.questions = questions;
        self.status = SessionStatus::Active;
        self.current_question_index = 0;
        self.start_time = Some(SystemTime::now());
        self.round_generation += 1;

        self.current_round().ok_or(GameError::NoQuestionsAvailable)
    }

    /// Record `player_id`'s answer for the open round and score it.
    ///
    /// `for_round`, when given, must name the open round: an answer aimed at a round
    /// that already closed is reported as [`GameError::AlreadyAnswered`].
    pub fn submit_answer(
        &mut self,
        player_id: &PlayerId,
        answer_index: usize,
        for_round: Option<usize>,
    ) -> Result<AnswerOutcome, GameError> {
        self.ensure_status(SessionStatus::Active)?;
        let round_index = self.current_question_index;
        match for_round {
            Some(round) if round < round_index => return Err(GameError::AlreadyAnswered),
            Some(round) if round > round_index => {
                return Err(GameError::InvalidMessage(format!(
                    "round {round} has not started"
                )));
            }
            _ => {}
        }
        let question = self
            .questions
            .get(round_index)
            .cloned()
            .ok_or(GameError::WrongState {
                status: self.status.as_str(),
            })?;
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(GameError::PlayerNotFound)?;
        if player.has_answered(round_index) {
            return Err(GameError::AlreadyAnswered);
        }
        if !question.has_option(answer_index) {
            return Err(GameError::InvalidAnswer {
                index: answer_index,
            });
        }

        let correct = answer_index == question.correct_answer;
        let points_awarded = player.record_answer(round_index, answer_index, correct, question.points);
        let (new_score, new_streak, multiplier) = (player.score, player.streak, player.multiplier);

        Ok(AnswerOutcome {
            round_index,
            correct,
            points_awarded,
            new_score,
            new_streak,
            multiplier,
            round_complete: self.all_answered(),
        })
    }

    /// Every connected player has answered the open round.
    ///
    /// Players whose connection dropped are ignored. With nobody connected the
    /// round is left to the timer.
    pub fn all_answered(&self) -> bool {
        if self.status != SessionStatus::Active {
            return false;
        }
        let round = self.current_question_index;
        let mut connected = self.players.values().filter(|player| player.connected).peekable();
        connected.peek().is_some() && connected.all(|player| player.has_answered(round))
    }

    /// Close the round stamped `generation` and open the next one (or finish).
    ///
    /// Returns `None` without touching anything when `generation` no longer matches,
    /// which is how a late timer or a duplicate completion is neutralised.
    pub fn end_round(&mut self, generation: u64) -> Option<RoundEnd> {
        if self.status != SessionStatus::Active || generation != self.round_generation {
            return None;
        }

        let round_index = self.current_question_index;
        let correct_answer = self.questions.get(round_index)?.correct_answer;
        for player in self.players.values_mut() {
            if !player.has_answered(round_index) {
                player.record_miss(round_index);
            }
        }

        let reveal = RoundReveal {
            round_index,
            correct_answer,
        };
        self.round_generation += 1;

        if round_index + 1 < self.questions.len() {
            self.current_question_index += 1;
            let round = self.current_round()?;
            Some(RoundEnd::Next { reveal, round })
        } else {
            self.status = SessionStatus::Finished;
            self.end_time = Some(SystemTime::now());
            Some(RoundEnd::GameOver { reveal })
        }
    }

    /// Remove a player at any status, promoting the earliest remaining joiner to host.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> Option<Departure> {
        let player = self.players.shift_remove(player_id)?;

        let mut new_host = None;
        if player.is_host {
            if let Some(next) = self.players.values_mut().next() {
                next.is_host = true;
                new_host = Some(next.id);
            }
        }

        let roster_empty = self.players.is_empty();
        if roster_empty {
            self.closed = true;
        }

        Some(Departure {
            player,
            new_host,
            roster_empty,
        })
    }

    /// Mark a player's connection as present or gone without removing the seat.
    pub fn set_connected(&mut self, player_id: &PlayerId, connected: bool) -> Result<(), GameError> {
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(GameError::PlayerNotFound)?;
        player.connected = connected;
        Ok(())
    }

    /// Check the secret presented by a reconnecting client.
    pub fn verify_rejoin(&self, player_id: &PlayerId, token: &Uuid) -> Result<(), GameError> {
        if self.closed {
            return Err(GameError::SessionNotFound);
        }
        let player = self.players.get(player_id).ok_or(GameError::PlayerNotFound)?;
        if player.reconnect_token != *token {
            return Err(GameError::InvalidToken);
        }
        Ok(())
    }

    /// Append a chat line from a roster member, trimming the history to its limit.
    pub fn push_chat(&mut self, player_id: &PlayerId, text: String) -> Result<ChatEntry, GameError> {
        let player = self.players.get(player_id).ok_or(GameError::PlayerNotFound)?;
        let entry = ChatEntry {
            id: Uuid::new_v4(),
            player_id: *player_id,
            player_name: player.name.clone(),
            text,
            timestamp: SystemTime::now(),
        };

        self.chat.push_back(entry.clone());
        while self.chat.len() > self.settings.chat_history_limit {
            self.chat.pop_front();
        }
        Ok(entry)
    }

    /// Players by descending score; ties keep join order.
    pub fn standings(&self) -> Vec<&Player> {
        let mut ranked: Vec<&Player> = self.players.values().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    fn ensure_status(&self, expected: SessionStatus) -> Result<(), GameError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(GameError::WrongState {
                status: self.status.as_str(),
            })
        }
    }
}
