use shared::validation::{validate_duration, VOTING_DURATION_MINUTES};
use tracing::warn;

use crate::retry::RetryPolicy;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-preview-09-2025";
pub const DEFAULT_VOTE_RATE_LIMIT: u32 = 30;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host_secret: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub voting_duration_minutes: i64,
    pub retry: RetryPolicy,
    pub vote_rate_limit_per_minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_secret: None,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            voting_duration_minutes: VOTING_DURATION_MINUTES,
            retry: RetryPolicy::default(),
            vote_rate_limit_per_minute: DEFAULT_VOTE_RATE_LIMIT,
        }
    }
}

impl Config {
    /// Builds the configuration from a key lookup such as the secret store.
    /// Blank values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        config.host_secret = get("HOST_SECRET_KEY");
        if config.host_secret.is_none() {
            warn!("HOST_SECRET_KEY not found - host controls will reject every request");
        }
        config.gemini_api_key = get("GEMINI_API_KEY");
        if config.gemini_api_key.is_none() {
            warn!("GEMINI_API_KEY not found - pitch generation will be unavailable");
        }
        if let Some(model) = get("GEMINI_MODEL") {
            config.gemini_model = model;
        }

        if let Some(raw) = get("VOTING_DURATION_MINUTES") {
            let minutes = raw
                .parse::<i64>()
                .ok()
                .filter(|m| validate_duration(*m).is_ok())
                .ok_or(ConfigError::Invalid {
                    key: "VOTING_DURATION_MINUTES",
                    expected: "a whole number of minutes between 1 and 60",
                    value: raw.clone(),
                })?;
            config.voting_duration_minutes = minutes;
        }

        if let Some(raw) = get("RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = raw.parse::<u32>().ok().filter(|n| *n >= 1).ok_or(ConfigError::Invalid {
                key: "RETRY_MAX_ATTEMPTS",
                expected: "a positive integer",
                value: raw.clone(),
            })?;
        }

        if let Some(raw) = get("VOTE_RATE_LIMIT_PER_MINUTE") {
            config.vote_rate_limit_per_minute =
                raw.parse::<u32>().ok().filter(|n| *n >= 1).ok_or(ConfigError::Invalid {
                    key: "VOTE_RATE_LIMIT_PER_MINUTE",
                    expected: "a positive integer",
                    value: raw.clone(),
                })?;
        }

        Ok(config)
    }
}
