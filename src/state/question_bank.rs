use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fs,
    path::Path,
    sync::Arc,
};

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::state::game::MAX_MULTIPLIER;

/// Difficulty tier a question (and a session) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Entry-level questions.
    Easy,
    /// Intermediate questions.
    Medium,
    /// Hardest tier.
    Hard,
}

impl Difficulty {
    /// Every tier, in ascending order.
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
}

/// Immutable catalog entry. Sessions hold it behind an [`Arc`] and never mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Stable identifier, unique across the whole bank.
    pub id: String,
    /// Question prompt.
    pub text: String,
    /// Free-form category label (e.g. "Science").
    pub category: String,
    /// Tier the question is filed under.
    pub difficulty: Difficulty,
    /// Ordered answer options.
    pub options: Vec<String>,
    /// Index into `options` of the right answer.
    pub correct_answer: usize,
    /// Suggested time limit in seconds.
    pub time_limit: u32,
    /// Base score for a correct answer.
    pub points: u32,
}

impl Question {
    /// Whether `index` designates one of the options.
    pub fn has_option(&self, index: usize) -> bool {
        index < self.options.len()
    }
}

/// Read-only catalog of questions grouped by difficulty.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    pools: HashMap<Difficulty, Vec<Arc<Question>>>,
}

impl QuestionBank {
    /// Build a bank from raw questions, dropping entries that cannot be played.
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Self {
        let mut seen = HashSet::new();
        let mut pools: HashMap<Difficulty, Vec<Arc<Question>>> = HashMap::new();

        for question in questions {
            if question.options.is_empty() || !question.has_option(question.correct_answer) {
                warn!(id = %question.id, "skipping question with an out-of-range correct answer");
                continue;
            }
            if question.points.checked_mul(MAX_MULTIPLIER).is_none() {
                warn!(id = %question.id, points = question.points, "skipping question with oversized points");
                continue;
            }
            if !seen.insert(question.id.clone()) {
                warn!(id = %question.id, "skipping duplicate question id");
                continue;
            }
            pools
                .entry(question.difficulty)
                .or_default()
                .push(Arc::new(question));
        }

        Self { pools }
    }

    /// Load a bank from a JSON file, falling back to the built-in catalog on any failure.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Vec<Question>>(&contents) {
                Ok(questions) => {
                    let bank = Self::new(questions);
                    info!(
                        path = %path.display(),
                        count = bank.len(),
                        "loaded question bank"
                    );
                    bank
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse question bank; using built-in questions"
                    );
                    Self::builtin()
                }
            },
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read question bank; using built-in questions"
                );
                Self::builtin()
            }
        }
    }

    /// Built-in catalog shipped with the binary.
    pub fn builtin() -> Self {
        Self::new(builtin_questions())
    }

    /// Total number of questions across all pools.
    pub fn len(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    /// True when no pool holds any question.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of questions available for `difficulty`.
    pub fn pool_size(&self, difficulty: Difficulty) -> usize {
        self.pools.get(&difficulty).map_or(0, Vec::len)
    }

    /// Sorted list of distinct categories in the bank.
    pub fn categories(&self) -> Vec<String> {
        self.pools
            .values()
            .flatten()
            .map(|question| question.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Pick up to `count` distinct questions of `difficulty` in shuffled order.
    ///
    /// A pool smaller than `count` is returned whole (under-fill is not an error).
    pub fn select_round(&self, difficulty: Difficulty, count: usize) -> Vec<Arc<Question>> {
        self.select_round_with(&mut rand::rng(), difficulty, count)
    }

    /// Same as [`QuestionBank::select_round`] with a caller-provided RNG.
    pub fn select_round_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        difficulty: Difficulty,
        count: usize,
    ) -> Vec<Arc<Question>> {
        let Some(pool) = self.pools.get(&difficulty) else {
            return Vec::new();
        };

        let mut selection = pool.clone();
        selection.shuffle(rng);
        selection.truncate(count);
        selection
    }
}

fn question(
    id: &str,
    text: &str,
    category: &str,
    difficulty: Difficulty,
    options: [&str; 4],
    correct_answer: usize,
) -> Question {
    let (time_limit, points) = match difficulty {
        Difficulty::Easy => (30, 100),
        Difficulty::Medium => (25, 200),
        Difficulty::Hard => (20, 300),
    };
    Question {
        id: id.into(),
        text: text.into(),
        category: category.into(),
        difficulty,
        options: options.iter().map(|option| option.to_string()).collect(),
        correct_answer,
        time_limit,
        points,
    }
}

fn builtin_questions() -> Vec<Question> {
    use Difficulty::*;

    vec![
        question("e1", "What is 2 + 2?", "Math", Easy, ["3", "4", "5", "6"], 1),
        question("e2", "What is 10 × 5?", "Math", Easy, ["40", "45", "50", "55"], 2),
        question(
            "e3",
            "Which planet is known as the Red Planet?",
            "Science",
            Easy,
            ["Venus", "Mars", "Jupiter", "Saturn"],
            1,
        ),
        question(
            "e4",
            "What is the largest organ in the human body?",
            "Science",
            Easy,
            ["Heart", "Brain", "Liver", "Skin"],
            3,
        ),
        question(
            "e5",
            "What is the capital of France?",
            "Geography",
            Easy,
            ["London", "Berlin", "Madrid", "Paris"],
            3,
        ),
        question(
            "e6",
            "Which is the largest continent?",
            "Geography",
            Easy,
            ["Africa", "Asia", "Europe", "North America"],
            1,
        ),
        question(
            "m1",
            "What is the square root of 144?",
            "Math",
            Medium,
            ["10", "12", "14", "16"],
            1,
        ),
        question("m2", "What is 15% of 200?", "Math", Medium, ["25", "30", "35", "40"], 1),
        question(
            "m3",
            "Which element has the chemical symbol \"Fe\"?",
            "Science",
            Medium,
            ["Gold", "Silver", "Iron", "Copper"],
            2,
        ),
        question(
            "m4",
            "What is the speed of light (in km/s)?",
            "Science",
            Medium,
            ["299,792", "199,792", "399,792", "499,792"],
            0,
        ),
        question(
            "m5",
            "In which year did World War II end?",
            "History",
            Medium,
            ["1943", "1944", "1945", "1946"],
            2,
        ),
        question(
            "m6",
            "Who painted the Mona Lisa?",
            "History",
            Medium,
            ["Van Gogh", "Da Vinci", "Picasso", "Rembrandt"],
            1,
        ),
        question(
            "h1",
            "What is the value of π (pi) to 4 decimal places?",
            "Math",
            Hard,
            ["3.1415", "3.1416", "3.1414", "3.1417"],
            0,
        ),
        question(
            "h2",
            "What is the sum of the angles in a pentagon?",
            "Math",
            Hard,
            ["360°", "480°", "540°", "720°"],
            2,
        ),
        question(
            "h3",
            "Which particle has a negative charge?",
            "Science",
            Hard,
            ["Proton", "Neutron", "Electron", "Positron"],
            2,
        ),
        question(
            "h4",
            "What is the atomic number of Gold (Au)?",
            "Science",
            Hard,
            ["47", "79", "85", "92"],
            1,
        ),
        question(
            "h5",
            "Who wrote \"The Art of War\"?",
            "History",
            Hard,
            ["Confucius", "Sun Tzu", "Lao Tzu", "Buddha"],
            1,
        ),
        question(
            "h6",
            "In which year was the first iPhone released?",
            "History",
            Hard,
            ["2005", "2006", "2007", "2008"],
            2,
        ),
    ]
}
