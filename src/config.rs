//! Runtime configuration loaded from environment variables.
//!
//! Every knob has a `DEFAULT_*` constant; unset or unparsable values fall
//! back to it. Only the API base URL is required up front; the acting
//! identity and the draft file are checked where they are used.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::draft::FileStore;
use crate::net::{Actor, ErrorCode};

const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5000;
const DEFAULT_DRAFT_THROTTLE_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing(_) => "E_CONFIG_MISSING",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// API root, e.g. `https://example.com`.
    pub base_url: String,
    /// Act as this friend when set.
    pub friend_token: Option<String>,
    pub refresh_interval: Duration,
    pub draft_throttle: Duration,
    /// JSON file for drafts.
    pub draft_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl SyncConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `WORLDSYNC_BASE_URL` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `WORLDSYNC_BASE_URL` is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let base_url = non_empty("WORLDSYNC_BASE_URL").ok_or(ConfigError::Missing("WORLDSYNC_BASE_URL"))?;
        Ok(Self {
            base_url,
            friend_token: non_empty("WORLDSYNC_FRIEND_TOKEN"),
            refresh_interval: Duration::from_millis(env_parse(
                &lookup,
                "WORLDSYNC_REFRESH_INTERVAL_MS",
                DEFAULT_REFRESH_INTERVAL_MS,
            )),
            draft_throttle: Duration::from_millis(env_parse(&lookup, "WORLDSYNC_DRAFT_THROTTLE_MS", DEFAULT_DRAFT_THROTTLE_MS)),
            draft_path: non_empty("WORLDSYNC_DRAFT_PATH").map(PathBuf::from),
            request_timeout: Duration::from_secs(env_parse(
                &lookup,
                "WORLDSYNC_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            connect_timeout: Duration::from_secs(env_parse(
                &lookup,
                "WORLDSYNC_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
        })
    }
}

impl SyncConfig {
    /// The identity requests act as: the friend when a token is set,
    /// otherwise the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` naming the id the mode needs.
    pub fn actor(&self, friend_id: Option<Uuid>, user_id: Option<Uuid>) -> Result<Actor, ConfigError> {
        match &self.friend_token {
            Some(token) => Ok(Actor::Friend {
                id: friend_id.ok_or(ConfigError::Missing("WORLDSYNC_FRIEND_ID"))?,
                access_token: token.clone(),
            }),
            None => Ok(Actor::User { id: user_id.ok_or(ConfigError::Missing("WORLDSYNC_USER_ID"))? }),
        }
    }

    /// The draft file store.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `WORLDSYNC_DRAFT_PATH` is unset.
    pub fn draft_store(&self) -> Result<FileStore, ConfigError> {
        self.draft_path
            .as_ref()
            .map(FileStore::new)
            .ok_or(ConfigError::Missing("WORLDSYNC_DRAFT_PATH"))
    }
}

pub(crate) fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
