// Configuration loading and parsing (league.toml, credentials.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::Deserialize;
use thiserror::Error;

use crate::league::TeamId;
use crate::schedule::window::WeeklyBoundary;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub schedule: ScheduleConfig,
    pub executor: ExecutorConfig,
    pub draft: DraftConfig,
    pub channels: ChannelsConfig,
    pub credentials: CredentialsConfig,
    pub db_path: String,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire league.toml file.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
    schedule: ScheduleSection,
    executor: ExecutorConfig,
    draft: DraftConfig,
    channels: ChannelsConfig,
    database: DatabaseSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    pub season: u32,
    /// Suppresses both window boundaries entirely.
    #[serde(default)]
    pub off_season: bool,
    /// Team that holds unassigned players.
    pub free_agent_team: TeamId,
}

#[derive(Debug, Clone, Deserialize)]
struct ScheduleSection {
    poll_interval_secs: u64,
    #[serde(default)]
    utc_offset_hours: i32,
    window_open: BoundarySection,
    window_close: BoundarySection,
}

#[derive(Debug, Clone, Deserialize)]
struct BoundarySection {
    weekday: String,
    time: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

/// The weekly transaction window, assembled from the `[schedule]` section.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub poll_interval: Duration,
    pub utc_offset: FixedOffset,
    pub window_open: WeeklyBoundary,
    pub window_close: WeeklyBoundary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Pause between consecutive store mutations.
    pub rate_limit_ms: u64,
    /// Attempts per mutation, including the first.
    pub max_attempts: u32,
    /// First retry delay; doubles on every further attempt.
    pub backoff_base_ms: u64,
}

impl ExecutorConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftConfig {
    pub pick_minutes: u32,
    pub stale_lock_secs: u64,
    pub first_warning_secs: u64,
    pub final_warning_secs: u64,
    pub poll_slow_secs: u64,
    pub poll_medium_secs: u64,
    pub poll_fast_secs: u64,
    /// sWAR ceiling for a roster's top-N players.
    pub swar_cap: f64,
    pub cap_top_n: usize,
    pub cap_tolerance: f64,
}

impl DraftConfig {
    pub fn pick_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.pick_minutes))
    }

    pub fn stale_lock_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_lock_secs as i64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    pub announcements: String,
    pub draft: String,
    /// Where failed roster mutations are reported for manual remediation.
    pub operator: String,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Relay endpoint for channel posts and direct messages. Notifications
    /// only go to the log when unset.
    pub webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- league.toml (required) ---
    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;

    let schedule = ScheduleConfig {
        poll_interval: Duration::from_secs(file.schedule.poll_interval_secs),
        utc_offset: parse_offset(file.schedule.utc_offset_hours)?,
        window_open: parse_boundary("schedule.window_open", &file.schedule.window_open)?,
        window_close: parse_boundary("schedule.window_close", &file.schedule.window_close)?,
    };

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        league: file.league,
        schedule,
        executor: file.executor,
        draft: file.draft,
        channels: file.channels,
        credentials,
        db_path: file.database.path,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn parse_boundary(field: &str, raw: &BoundarySection) -> Result<WeeklyBoundary, ConfigError> {
    let weekday = raw
        .weekday
        .parse::<Weekday>()
        .map_err(|_| ConfigError::ValidationError {
            field: format!("{field}.weekday"),
            message: format!("unknown weekday `{}`", raw.weekday),
        })?;
    let time = NaiveTime::parse_from_str(&raw.time, "%H:%M").map_err(|e| {
        ConfigError::ValidationError {
            field: format!("{field}.time"),
            message: format!("expected HH:MM, got `{}`: {e}", raw.time),
        }
    })?;
    Ok(WeeklyBoundary::new(weekday, time))
}

fn parse_offset(hours: i32) -> Result<FixedOffset, ConfigError> {
    FixedOffset::east_opt(hours * 3600).ok_or_else(|| ConfigError::ValidationError {
        field: "schedule.utc_offset_hours".into(),
        message: format!("must be between -23 and 23, got {hours}"),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.league.season == 0 {
        return Err(ConfigError::ValidationError {
            field: "league.season".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.schedule.poll_interval.is_zero() {
        return Err(ConfigError::ValidationError {
            field: "schedule.poll_interval_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.schedule.window_open == config.schedule.window_close {
        return Err(ConfigError::ValidationError {
            field: "schedule.window_close".into(),
            message: "must differ from schedule.window_open".into(),
        });
    }

    if config.executor.max_attempts == 0 {
        return Err(ConfigError::ValidationError {
            field: "executor.max_attempts".into(),
            message: "must be greater than 0".into(),
        });
    }

    let draft = &config.draft;
    let positive_fields: &[(&str, u64)] = &[
        ("draft.pick_minutes", u64::from(draft.pick_minutes)),
        ("draft.stale_lock_secs", draft.stale_lock_secs),
        ("draft.poll_slow_secs", draft.poll_slow_secs),
        ("draft.poll_medium_secs", draft.poll_medium_secs),
        ("draft.poll_fast_secs", draft.poll_fast_secs),
        ("draft.cap_top_n", draft.cap_top_n as u64),
    ];
    for (name, val) in positive_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if draft.final_warning_secs >= draft.first_warning_secs {
        return Err(ConfigError::ValidationError {
            field: "draft.final_warning_secs".into(),
            message: format!(
                "must be less than draft.first_warning_secs ({})",
                draft.first_warning_secs
            ),
        });
    }

    if draft.swar_cap <= 0.0 {
        return Err(ConfigError::ValidationError {
            field: "draft.swar_cap".into(),
            message: format!("must be > 0, got {}", draft.swar_cap),
        });
    }

    if draft.cap_tolerance < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "draft.cap_tolerance".into(),
            message: format!("must be >= 0, got {}", draft.cap_tolerance),
        });
    }

    let channels = [
        ("channels.announcements", &config.channels.announcements),
        ("channels.draft", &config.channels.draft),
        ("channels.operator", &config.channels.operator),
    ];
    for (name, val) in channels {
        if val.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
