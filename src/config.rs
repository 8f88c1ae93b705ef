//! Application-level configuration loading: timings, retry bounds, room defaults, authority
//! toggles and the question catalogue.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::DurationMilliSeconds;
use tracing::{info, warn};

use crate::{
    dao::models::{GameMode, QuestionEntity, RoomConfigEntity},
    services::retry::RetryPolicy,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "HOTSEAT_CONFIG_PATH";

/// Delays and thresholds driving automatic transitions and recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    /// Pause between a transition becoming due and its mutation.
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    pub debounce: Duration,
    /// Watchdog tick period.
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    pub watchdog_interval: Duration,
    /// Silence after which registered in-flight operations trigger a replay.
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    pub liveness_threshold: Duration,
    /// How long a transition may stay due before the watchdog forces it.
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    pub condition_threshold: Duration,
    /// Upper bound on the watchdog's connectivity probe.
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    pub probe_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(600),
            watchdog_interval: Duration::from_secs(2),
            liveness_threshold: Duration::from_secs(5),
            condition_threshold: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Which authorities this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleConfig {
    /// Spawn a round controller and watchdog for every room created here.
    pub host_controllers: bool,
    /// Follow the global mutation feed and advance any room.
    pub server_trigger: bool,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            host_controllers: true,
            server_trigger: true,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Transition and watchdog timings.
    pub timing: TimingConfig,
    /// Bounds for retried storage operations.
    pub retry: RetryPolicy,
    /// Authorities run by this process.
    pub roles: RoleConfig,
    room_defaults: RoomConfigEntity,
    questions: Vec<QuestionEntity>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        questions = app_config.questions.len(),
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

    /// Rules applied to rooms created without explicit overrides.
    pub fn room_defaults(&self) -> &RoomConfigEntity {
        &self.room_defaults
    }

    /// Question catalogue in draw order.
    pub fn questions(&self) -> &[QuestionEntity] {
        &self.questions
    }

    /// Same configuration with a different timing block.
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Same configuration with different authority toggles.
    pub fn with_roles(mut self, roles: RoleConfig) -> Self {
        self.roles = roles;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            retry: RetryPolicy::default(),
            roles: RoleConfig::default(),
            room_defaults: RoomConfigEntity::default(),
            questions: default_questions(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    timing: TimingConfig,
    retry: Option<RawRetry>,
    roles: RoleConfig,
    room_defaults: Option<RawRoomDefaults>,
    questions: Vec<QuestionEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRetry {
    max_attempts: u32,
    #[serde(with = "serde_with::As::<DurationMilliSeconds<u64>>")]
    base_delay: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoomDefaults {
    base_damage: Option<u32>,
    max_temperature: Option<u32>,
    game_mode: Option<GameMode>,
    #[serde(default)]
    categories: Vec<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let retry = value
            .retry
            .map(|raw| RetryPolicy {
                max_attempts: raw.max_attempts.max(1),
                base_delay: raw.base_delay,
            })
            .unwrap_or_default();

        let mut room_defaults = RoomConfigEntity::default();
        if let Some(raw) = value.room_defaults {
            room_defaults.base_damage = raw.base_damage.unwrap_or(room_defaults.base_damage);
            room_defaults.max_temperature = raw
                .max_temperature
                .unwrap_or(room_defaults.max_temperature);
            room_defaults.game_mode = raw.game_mode.unwrap_or(room_defaults.game_mode);
            room_defaults.categories = raw.categories;
        }

        let questions = if value.questions.is_empty() {
            default_questions()
        } else {
            value.questions
        };

        Self {
            timing: value.timing,
            retry,
            roles: value.roles,
            room_defaults,
            questions,
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

fn question(prompt: &str, option_a: &str, option_b: &str, category: &str) -> QuestionEntity {
    QuestionEntity {
        prompt: prompt.into(),
        option_a: option_a.into(),
        option_b: option_b.into(),
        category: category.into(),
    }
}

/// Built-in catalogue shipped with the binary.
fn default_questions() -> Vec<QuestionEntity> {
    vec![
        question("Morning or night?", "Early bird", "Night owl", "lifestyle"),
        question("Pick a holiday", "Beach", "Mountains", "lifestyle"),
        question("Coffee or tea?", "Coffee", "Tea", "food"),
        question("Pizza topping", "Pineapple", "No pineapple", "food"),
        question("Sweet or savoury breakfast?", "Sweet", "Savoury", "food"),
        question("Pets", "Cats", "Dogs", "lifestyle"),
        question("Weekend plan", "Party", "Sofa", "lifestyle"),
        question("Movie night", "Horror", "Comedy", "culture"),
        question("Books", "Paper", "E-reader", "culture"),
        question("Music on a road trip", "Sing along", "Podcast", "culture"),
        question("Superpower", "Fly", "Invisible", "wild"),
        question("Zombie apocalypse role", "Leader", "Hide in a bunker", "wild"),
    ]
}
