use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // Archival policy
    pub reaction_threshold: u32,

    // History scans
    pub scan_page_size: usize,
    pub scan_pace_every: u64,
    pub scan_pace_delay: Duration,
    pub scan_progress_every: u64,
    pub scan_cursor_flush_every: u64,
    pub scan_contention_retries: u32,
    pub scan_contention_backoff: Duration,

    // Polls
    pub poll_timeout: Duration,

    // Self-reaction callouts
    pub self_react_cooldown: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        Ok(Self {
            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/messages.sqlite")),

            // Archival policy
            reaction_threshold: parse_env_u32("REACTION_THRESHOLD", 4)?,

            // History scans
            scan_page_size: parse_env_usize("SCAN_PAGE_SIZE", 100)?,
            scan_pace_every: parse_env_u64("SCAN_PACE_EVERY", 500)?,
            scan_pace_delay: Duration::from_millis(parse_env_u64("SCAN_PACE_DELAY_MS", 2000)?),
            scan_progress_every: parse_env_u64("SCAN_PROGRESS_EVERY", 1000)?,
            scan_cursor_flush_every: parse_env_u64("SCAN_CURSOR_FLUSH_EVERY", 100)?,
            scan_contention_retries: parse_env_u32("SCAN_CONTENTION_RETRIES", 3)?,
            scan_contention_backoff: Duration::from_millis(parse_env_u64(
                "SCAN_CONTENTION_BACKOFF_MS",
                500,
            )?),

            // Polls
            poll_timeout: Duration::from_secs(parse_env_u64("POLL_TIMEOUT_SECS", 30)?),

            // Self-reaction callouts
            self_react_cooldown: Duration::from_secs(parse_env_u64(
                "SELF_REACT_COOLDOWN_SECS",
                60,
            )?),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reaction_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                name: "REACTION_THRESHOLD".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.scan_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SCAN_PAGE_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.scan_pace_every == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SCAN_PACE_EVERY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.scan_cursor_flush_every == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SCAN_CURSOR_FLUSH_EVERY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Process-wide archival settings that an operator can change at runtime.
///
/// The reaction threshold is read on every policy evaluation and mutated
/// only through [`ArchiveSettings::set_threshold`]. Changes take effect for
/// subsequent evaluations; already-archived records are never re-evaluated.
#[derive(Debug)]
pub struct ArchiveSettings {
    threshold: AtomicU32,
}

impl ArchiveSettings {
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: AtomicU32::new(threshold.max(1)),
        }
    }

    /// The current reaction threshold.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Change the reaction threshold for all subsequent evaluations.
    ///
    /// Values below 1 are clamped to 1 (a zero threshold would archive
    /// every message the bot ever sees).
    pub fn set_threshold(&self, new_threshold: u32) {
        let clamped = new_threshold.max(1);
        self.threshold.store(clamped, Ordering::Relaxed);
        info!(threshold = clamped, "Reaction threshold updated");
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|source| ConfigError::ParseInt {
            name: name.to_string(),
            source,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|source| ConfigError::ParseInt {
            name: name.to_string(),
            source,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|source| ConfigError::ParseInt {
            name: name.to_string(),
            source,
        }),
        _ => Ok(default),
    }
}
