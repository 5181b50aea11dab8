use std::time::SystemTime;

use uuid::Uuid;

/// Opaque identifier of a session, minted once by the registry.
pub type SessionId = Uuid;
/// Opaque identifier of a player inside a session.
pub type PlayerId = Uuid;

/// Highest multiplier a streak can reach.
pub const MAX_MULTIPLIER: u32 = 4;

/// Score multiplier earned by a run of `streak` consecutive correct answers.
pub fn multiplier_for(streak: u32) -> u32 {
    (1 + streak / 3).min(MAX_MULTIPLIER)
}

/// What a player did in a given round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// Index of the option picked by the player.
    Chosen(usize),
    /// Round ended before the player answered.
    NoAnswer,
}

impl Answer {
    /// Option index, or `None` for the no-answer sentinel.
    pub fn chosen(self) -> Option<usize> {
        match self {
            Answer::Chosen(index) => Some(index),
            Answer::NoAnswer => None,
        }
    }
}

/// Identity supplied by the connection layer when a player enters a session.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    /// Identifier assigned to the player.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Optional avatar.
    pub photo_url: Option<String>,
}

/// Participant bound to exactly one session.
#[derive(Debug, Clone)]
pub struct Player {
    /// Identifier of the player.
    pub id: PlayerId,
    /// Display name chosen by the player.
    pub name: String,
    /// Optional avatar.
    pub photo_url: Option<String>,
    /// Secret handed to the player so a new connection can reclaim the seat.
    pub reconnect_token: Uuid,
    /// Whether this player holds start authority.
    pub is_host: bool,
    /// Ready-check flag while the session is waiting.
    pub is_ready: bool,
    /// False while the player's connection is gone but the seat is kept.
    pub connected: bool,
    /// Cumulative score for the current game.
    pub score: u32,
    /// Consecutive correct answers.
    pub streak: u32,
    /// Multiplier derived from `streak`.
    pub multiplier: u32,
    /// One entry per finished or answered round, indexed by round number.
    pub answers: Vec<Answer>,
}

impl Player {
    /// Fresh roster entry with zeroed game statistics.
    pub fn new(new: NewPlayer, is_host: bool) -> Self {
        Self {
            id: new.id,
            name: new.name,
            photo_url: new.photo_url,
            reconnect_token: Uuid::new_v4(),
            is_host,
            is_ready: false,
            connected: true,
            score: 0,
            streak: 0,
            multiplier: 1,
            answers: Vec::new(),
        }
    }

    /// Recorded answer for `round`, if any.
    pub fn answer_for(&self, round: usize) -> Option<Answer> {
        self.answers.get(round).copied()
    }

    /// Whether an answer (or the no-answer sentinel) is already stored for `round`.
    pub fn has_answered(&self, round: usize) -> bool {
        self.answers.len() > round
    }

    /// Number of rounds answered correctly, given the correct option per round.
    pub fn correct_answers(&self, correct: impl IntoIterator<Item = usize>) -> usize {
        self.answers
            .iter()
            .zip(correct)
            .filter(|(answer, right)| answer.chosen() == Some(*right))
            .count()
    }

    /// Store a choice for `round` and apply the scoring rule. Returns the points awarded.
    pub(crate) fn record_answer(&mut self, round: usize, index: usize, correct: bool, points: u32) -> u32 {
        self.fill_until(round);
        self.answers.push(Answer::Chosen(index));
        if correct {
            self.streak = self.streak.saturating_add(1);
            self.multiplier = multiplier_for(self.streak);
            let awarded = points.saturating_mul(self.multiplier);
            self.score = self.score.saturating_add(awarded);
            awarded
        } else {
            self.break_streak();
            0
        }
    }

    /// Store the no-answer sentinel for `round`, which counts as incorrect.
    pub(crate) fn record_miss(&mut self, round: usize) {
        self.fill_until(round);
        self.answers.push(Answer::NoAnswer);
        self.break_streak();
    }

    fn break_streak(&mut self) {
        self.streak = 0;
        self.multiplier = 1;
    }

    // Earlier rounds must always be filled; pad defensively so indices stay aligned.
    fn fill_until(&mut self, round: usize) {
        while self.answers.len() < round {
            self.answers.push(Answer::NoAnswer);
        }
    }
}

/// Chat line kept in the session history.
#[derive(Debug, Clone)]
pub struct ChatEntry {
    /// Unique message identifier.
    pub id: Uuid,
    /// Author.
    pub player_id: PlayerId,
    /// Author name at the time of sending.
    pub player_name: String,
    /// Message body.
    pub text: String,
    /// When the server accepted the message.
    pub timestamp: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player::new(
            NewPlayer {
                id: Uuid::new_v4(),
                name: "ada".into(),
                photo_url: None,
            },
            false,
        )
    }

    #[test]
    fn multiplier_grows_every_three_and_caps() {
        let expected = [1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4, 4, 4];
        for (streak, multiplier) in expected.into_iter().enumerate() {
            assert_eq!(multiplier_for(streak as u32), multiplier, "streak {streak}");
        }
    }

    #[test]
    fn correct_answers_accumulate_with_multiplier() {
        let mut p = player();
        let points: Vec<u32> = (0..4).map(|round| p.record_answer(round, 1, true, 100)).collect();

        assert_eq!(points, vec![100, 100, 200, 200]);
        assert_eq!(p.score, 600);
        assert_eq!(p.streak, 4);
        assert_eq!(p.multiplier, 2);
    }

    #[test]
    fn miss_resets_streak_but_keeps_score() {
        let mut p = player();
        for round in 0..3 {
            p.record_answer(round, 0, true, 100);
        }
        p.record_miss(3);

        assert_eq!(p.streak, 0);
        assert_eq!(p.multiplier, 1);
        assert_eq!(p.score, 400);
        assert_eq!(p.answer_for(3), Some(Answer::NoAnswer));

        assert_eq!(p.record_answer(4, 2, false, 100), 0);
        assert_eq!(p.score, 400);
    }

    #[test]
    fn score_saturates_instead_of_wrapping() {
        let mut p = player();
        let mut previous = 0;
        for round in 0..4 {
            p.record_answer(round, 0, true, 2_000_000_000);
            assert!(p.score >= previous);
            previous = p.score;
        }
        assert_eq!(p.score, u32::MAX);
    }

    #[test]
    fn skipped_rounds_are_padded_with_no_answer() {
        let mut p = player();
        p.record_answer(2, 3, true, 100);
        assert_eq!(
            p.answers,
            vec![Answer::NoAnswer, Answer::NoAnswer, Answer::Chosen(3)]
        );
        assert_eq!(p.correct_answers([0, 0, 3]), 1);
    }
}
