//! Runtime configuration parsed from environment variables.
//!
//! Every knob has a default; unparseable numbers fall back to it. Parsing goes
//! through a lookup function so tests can feed values without touching the
//! process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::autosave::{AutoSaveConfig, DEFAULT_DEBOUNCE_MS};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::session::{DEFAULT_RATE_LIMIT_BACKOFF_MS, SessionConfig};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_STORAGE_PATH: &str = "journal-state.json";
const API_BASE_URL_KEY: &str = "JOURNAL_API_BASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub api_base_url: String,
    pub storage_path: PathBuf,
    pub session: SessionConfig,
    pub autosave: AutoSaveConfig,
}

impl Config {
    /// Build config from the process environment.
    ///
    /// Optional:
    /// - `JOURNAL_API_BASE_URL`: default `http://127.0.0.1:3000`
    /// - `JOURNAL_STORAGE_PATH`: default `journal-state.json`
    /// - `SESSION_RATE_LIMIT_BACKOFF_MS`: default 3000
    /// - `AUTOSAVE_DEBOUNCE_MS`: default 500
    /// - `AUTOSAVE_HISTORY_CAPACITY`: default 30, minimum 1
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the base URL does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_env`], but `base_url` (when given) replaces
    /// `JOURNAL_API_BASE_URL` and is validated the same way.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the effective base URL does
    /// not parse.
    pub fn from_env_with_base_url(base_url: Option<&str>) -> Result<Self, ConfigError> {
        Self::from_lookup(with_base_url(|key| std::env::var(key).ok(), base_url))
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the base URL does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup(API_BASE_URL_KEY)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        if let Err(e) = reqwest::Url::parse(&api_base_url) {
            return Err(ConfigError::InvalidBaseUrl { url: api_base_url, reason: e.to_string() });
        }

        let storage_path = lookup("JOURNAL_STORAGE_PATH").map_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH), PathBuf::from);

        let backoff_ms = parse_or(&lookup, "SESSION_RATE_LIMIT_BACKOFF_MS", DEFAULT_RATE_LIMIT_BACKOFF_MS);
        let debounce_ms = parse_or(&lookup, "AUTOSAVE_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS);
        let history_capacity = parse_or(&lookup, "AUTOSAVE_HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY).max(1);

        Ok(Self {
            api_base_url,
            storage_path,
            session: SessionConfig { rate_limit_backoff: Duration::from_millis(backoff_ms) },
            autosave: AutoSaveConfig { debounce: Duration::from_millis(debounce_ms), history_capacity },
        })
    }
}

fn with_base_url<'a, F>(lookup: F, base_url: Option<&'a str>) -> impl Fn(&str) -> Option<String> + 'a
where
    F: Fn(&str) -> Option<String> + 'a,
{
    move |key: &str| match base_url {
        Some(url) if key == API_BASE_URL_KEY => Some(url.to_owned()),
        _ => lookup(key),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
