//! Environment configuration
//!
//! Every setting has a default; a value that fails to parse is reported and
//! replaced by its default rather than aborting startup.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const MODE_VAR: &str = "PHARMACY_CHAT_MODE";
pub const ENDPOINT_VAR: &str = "PHARMACY_CHAT_ENDPOINT";
pub const USER_ID_VAR: &str = "PHARMACY_CHAT_USER_ID";
pub const TIMEOUT_VAR: &str = "PHARMACY_CHAT_TIMEOUT_SECS";
pub const SCRIPTED_DELAY_VAR: &str = "PHARMACY_SCRIPTED_DELAY_MS";
pub const MOCK_PORT_VAR: &str = "PHARMACY_MOCK_PORT";

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/api/chat";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCRIPTED_DELAY_MS: u64 = 60;
const DEFAULT_MOCK_PORT: u16 = 8000;

/// Which producer backs a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProducerMode {
    /// Stream from the chat endpoint over HTTP
    Live,
    /// Replay canned sequences locally
    #[default]
    Scripted,
}

impl FromStr for ProducerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "http" => Ok(ProducerMode::Live),
            "scripted" | "mock" => Ok(ProducerMode::Scripted),
            other => Err(format!("unknown producer mode: {other}")),
        }
    }
}

impl fmt::Display for ProducerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProducerMode::Live => write!(f, "live"),
            ProducerMode::Scripted => write!(f, "scripted"),
        }
    }
}

/// Client and mock server settings
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub mode: ProducerMode,
    pub endpoint: String,
    pub user_id: Option<i64>,
    pub connect_timeout: Duration,
    pub scripted_delay: Duration,
    pub mock_port: u16,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: ProducerMode::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_id: None,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            scripted_delay: Duration::from_millis(DEFAULT_SCRIPTED_DELAY_MS),
            mock_port: DEFAULT_MOCK_PORT,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let endpoint = lookup(ENDPOINT_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.endpoint);

        Self {
            mode: parse_or(&lookup, MODE_VAR, defaults.mode),
            endpoint,
            user_id: parse_opt(&lookup, USER_ID_VAR),
            connect_timeout: Duration::from_secs(parse_or(
                &lookup,
                TIMEOUT_VAR,
                DEFAULT_TIMEOUT_SECS,
            )),
            scripted_delay: Duration::from_millis(parse_or(
                &lookup,
                SCRIPTED_DELAY_VAR,
                DEFAULT_SCRIPTED_DELAY_MS,
            )),
            mock_port: parse_or(&lookup, MOCK_PORT_VAR, defaults.mock_port),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    parse_opt(lookup, key).unwrap_or(default)
}

/// Parsed value of `key`; `None` when unset or invalid
fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Invalid setting, using default");
            None
        }
    }
}
