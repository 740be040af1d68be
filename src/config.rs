//! Application-level configuration loading: board geometry, character
//! position table, timer default, and the animation delay table.

use std::collections::BTreeMap;
use std::time::Duration;
use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::game::GameConfig;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_BOWL_BACK_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Board geometry and character position table, embedded into the
    /// game-state document at construction.
    pub game: GameConfig,
    /// Delays sequencing the animation-coupled state mutations.
    pub delays: DelayTable,
}

#[derive(Debug, Clone)]
/// Milliseconds between the steps of the timed resolution sequences.
pub struct DelayTable {
    /// Answer (correct/incorrect) animation shown before the score applies.
    pub answer_animation_ms: u64,
    /// Gap between the score applying and the coin/shield delta animation.
    pub score_delta_ms: u64,
    /// How long the buzz overlay stays up before auto-hiding.
    pub buzz_overlay_ms: u64,
    /// Character run animation duration; `is_animating` is held for this long.
    pub movement_ms: u64,
    /// Devil attack cut-scene duration before control passes to the victim.
    pub attack_animation_ms: u64,
    /// Safety auto-clear for the full-reset reentrancy latch.
    pub reset_latch_ms: u64,
}

impl DelayTable {
    /// Answer animation delay as a [`Duration`].
    pub fn answer_animation(&self) -> Duration {
        Duration::from_millis(self.answer_animation_ms)
    }

    /// Score delta animation delay as a [`Duration`].
    pub fn score_delta(&self) -> Duration {
        Duration::from_millis(self.score_delta_ms)
    }

    /// Buzz overlay auto-hide delay as a [`Duration`].
    pub fn buzz_overlay(&self) -> Duration {
        Duration::from_millis(self.buzz_overlay_ms)
    }

    /// Character movement duration as a [`Duration`].
    pub fn movement(&self) -> Duration {
        Duration::from_millis(self.movement_ms)
    }

    /// Attack cut-scene duration as a [`Duration`].
    pub fn attack_animation(&self) -> Duration {
        Duration::from_millis(self.attack_animation_ms)
    }

    /// Reset latch auto-clear as a [`Duration`].
    pub fn reset_latch(&self) -> Duration {
        Duration::from_millis(self.reset_latch_ms)
    }
}

impl Default for DelayTable {
    fn default() -> Self {
        Self {
            answer_animation_ms: 2_500,
            score_delta_ms: 500,
            buzz_overlay_ms: 3_000,
            movement_ms: 1_200,
            attack_animation_ms: 2_000,
            reset_latch_ms: 1_000,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults when the file is absent or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        total_sets = config.game.total_sets,
                        "loaded configuration from file"
                    );
                    config
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
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            delays: DelayTable::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file; every section is optional
/// and merged over the defaults.
struct RawConfig {
    #[serde(default)]
    game: RawGameConfig,
    #[serde(default)]
    delays: RawDelayTable,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGameConfig {
    total_sets: Option<u8>,
    questions_per_set: Option<u8>,
    character_positions: Option<BTreeMap<u8, f32>>,
    timer_duration: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDelayTable {
    answer_animation_ms: Option<u64>,
    score_delta_ms: Option<u64>,
    buzz_overlay_ms: Option<u64>,
    movement_ms: Option<u64>,
    attack_animation_ms: Option<u64>,
    reset_latch_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let game_defaults = GameConfig::default();
        let delay_defaults = DelayTable::default();

        Self {
            game: GameConfig {
                total_sets: raw.game.total_sets.unwrap_or(game_defaults.total_sets),
                questions_per_set: raw
                    .game
                    .questions_per_set
                    .unwrap_or(game_defaults.questions_per_set),
                character_positions: raw
                    .game
                    .character_positions
                    .unwrap_or(game_defaults.character_positions),
                timer_duration: raw
                    .game
                    .timer_duration
                    .unwrap_or(game_defaults.timer_duration),
            },
            delays: DelayTable {
                answer_animation_ms: raw
                    .delays
                    .answer_animation_ms
                    .unwrap_or(delay_defaults.answer_animation_ms),
                score_delta_ms: raw
                    .delays
                    .score_delta_ms
                    .unwrap_or(delay_defaults.score_delta_ms),
                buzz_overlay_ms: raw
                    .delays
                    .buzz_overlay_ms
                    .unwrap_or(delay_defaults.buzz_overlay_ms),
                movement_ms: raw.delays.movement_ms.unwrap_or(delay_defaults.movement_ms),
                attack_animation_ms: raw
                    .delays
                    .attack_animation_ms
                    .unwrap_or(delay_defaults.attack_animation_ms),
                reset_latch_ms: raw
                    .delays
                    .reset_latch_ms
                    .unwrap_or(delay_defaults.reset_latch_ms),
            },
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_merges_over_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"game": {"totalSets": 8}, "delays": {"movementMs": 900}}"#)
                .unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.game.total_sets, 8);
        assert_eq!(config.game.questions_per_set, 4);
        assert_eq!(config.delays.movement_ms, 900);
        assert_eq!(config.delays.answer_animation_ms, 2_500);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.game.total_sets, 12);
        assert_eq!(config.game.character_positions.get(&1), Some(&34.0));
    }
}
