//! Engine configuration from environment variables

use crate::pipeline::retry::{
    RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_FACTOR, DEFAULT_JITTER, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY,
};
use crate::pipeline::DEFAULT_MAX_MESSAGE_CHARS;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_ENDPOINT: &str = "CHAT_ENGINE_ENDPOINT";
pub const ENV_API_KEY: &str = "CHAT_ENGINE_API_KEY";
pub const ENV_TIMEOUT_SECS: &str = "CHAT_ENGINE_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "CHAT_ENGINE_MAX_ATTEMPTS";
pub const ENV_BACKOFF_BASE_MS: &str = "CHAT_ENGINE_BACKOFF_BASE_MS";
pub const ENV_BACKOFF_FACTOR: &str = "CHAT_ENGINE_BACKOFF_FACTOR";
pub const ENV_BACKOFF_JITTER: &str = "CHAT_ENGINE_BACKOFF_JITTER";
pub const ENV_BACKOFF_MAX_MS: &str = "CHAT_ENGINE_BACKOFF_MAX_MS";
pub const ENV_MAX_MESSAGE_CHARS: &str = "CHAT_ENGINE_MAX_MESSAGE_CHARS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the delivery transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// HTTP endpoint; `None` selects the offline echo transport
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub transport: TransportConfig,
    pub retry: RetryPolicy,
    pub max_message_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            retry: RetryPolicy::default(),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing or unparseable values
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let transport = TransportConfig {
            endpoint: non_empty(ENV_ENDPOINT),
            api_key: non_empty(ENV_API_KEY),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                ENV_TIMEOUT_SECS,
                DEFAULT_TIMEOUT.as_secs(),
            )),
        };

        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, ENV_MAX_ATTEMPTS, DEFAULT_MAX_ATTEMPTS),
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                ENV_BACKOFF_BASE_MS,
                duration_millis(DEFAULT_BASE_DELAY),
            )),
            factor: parse_or(&lookup, ENV_BACKOFF_FACTOR, DEFAULT_FACTOR),
            jitter: parse_or(&lookup, ENV_BACKOFF_JITTER, DEFAULT_JITTER),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                ENV_BACKOFF_MAX_MS,
                duration_millis(DEFAULT_MAX_DELAY),
            )),
        }
        .normalized();

        Self {
            transport,
            retry,
            max_message_chars: parse_or(&lookup, ENV_MAX_MESSAGE_CHARS, DEFAULT_MAX_MESSAGE_CHARS),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    if let Ok(value) = raw.trim().parse() {
        value
    } else {
        tracing::warn!(key, value = %raw, "Ignoring unparseable configuration value");
        default
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
