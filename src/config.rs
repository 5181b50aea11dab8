//! Application-level configuration loading: lobby limits, round timing and reconnection policy.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::question_bank::Difficulty;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ARENA_BACK_CONFIG_PATH";

const DEFAULT_MAX_PLAYERS: usize = 8;
const DEFAULT_MIN_PLAYERS: usize = 2;
const DEFAULT_QUESTION_COUNT: usize = 5;
const DEFAULT_TIME_LIMIT_SECS: u32 = 30;
const DEFAULT_CHAT_HISTORY: usize = 50;

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Roster capacity of a session.
    pub max_players: usize,
    /// Minimum roster size for the host to start.
    pub min_players: usize,
    /// Questions drawn per game unless the host asks otherwise.
    pub question_count: usize,
    /// Seconds per round unless the host asks otherwise.
    pub question_time_limit_secs: u32,
    /// Difficulty used when the host does not pick one.
    pub default_difficulty: Difficulty,
    /// How long a dropped player keeps their seat before being removed.
    pub reconnect_grace: Duration,
    /// Number of chat messages retained per session.
    pub chat_history_limit: usize,
    /// Optional JSON question bank replacing the built-in catalog.
    pub question_bank_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        max_players = app_config.max_players,
                        reconnect_grace_secs = app_config.reconnect_grace.as_secs(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document, filling unspecified keys with defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    max_players: Option<usize>,
    min_players: Option<usize>,
    question_count: Option<usize>,
    question_time_limit_secs: Option<u32>,
    default_difficulty: Option<Difficulty>,
    reconnect_grace_secs: Option<u64>,
    chat_history_limit: Option<usize>,
    question_bank_path: Option<PathBuf>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let max_players = value.max_players.unwrap_or(DEFAULT_MAX_PLAYERS).max(1);
        Self {
            max_players,
            min_players: value
                .min_players
                .unwrap_or(DEFAULT_MIN_PLAYERS)
                .clamp(1, max_players),
            question_count: value.question_count.unwrap_or(DEFAULT_QUESTION_COUNT).max(1),
            question_time_limit_secs: value
                .question_time_limit_secs
                .unwrap_or(DEFAULT_TIME_LIMIT_SECS)
                .max(1),
            default_difficulty: value.default_difficulty.unwrap_or(Difficulty::Medium),
            reconnect_grace: Duration::from_secs(value.reconnect_grace_secs.unwrap_or(0)),
            chat_history_limit: value.chat_history_limit.unwrap_or(DEFAULT_CHAT_HISTORY),
            question_bank_path: value.question_bank_path,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
