use std::time::Duration;

use thiserror::Error;

use crate::quiz::loader::{BlockPolicy, Source};

pub const QUESTIONS_VAR: &str = "QUIZ_QUESTIONS";
pub const LOAD_TIMEOUT_VAR: &str = "QUIZ_LOAD_TIMEOUT_SECS";
pub const RESET_ON_WRAP_VAR: &str = "QUIZ_RESET_ON_WRAP";
pub const BLOCK_POLICY_VAR: &str = "QUIZ_BLOCK_POLICY";

const DEFAULT_QUESTIONS: &str = "questions.txt";
const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub questions: Source,
    pub load_timeout: Duration,
    /// Start the score over each time the deck wraps back to the first question.
    pub reset_on_wrap: bool,
    pub block_policy: BlockPolicy,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be a positive number of seconds, got `{1}`")]
    Timeout(&'static str, String),
    #[error("{0} must be true or false, got `{1}`")]
    Flag(&'static str, String),
    #[error("{0} must be `skip` or `reject`, got `{1}`")]
    Policy(&'static str, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let questions = Source::parse(&get(QUESTIONS_VAR).unwrap_or_else(|| DEFAULT_QUESTIONS.to_string()));

        let load_timeout = match get(LOAD_TIMEOUT_VAR) {
            None => Duration::from_secs(DEFAULT_LOAD_TIMEOUT_SECS),
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::Timeout(LOAD_TIMEOUT_VAR, value)),
            },
        };

        let reset_on_wrap = match get(RESET_ON_WRAP_VAR) {
            None => false,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(ConfigError::Flag(RESET_ON_WRAP_VAR, value)),
            },
        };

        let block_policy = match get(BLOCK_POLICY_VAR) {
            None => BlockPolicy::default(),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "skip" => BlockPolicy::Skip,
                "reject" => BlockPolicy::Reject,
                _ => return Err(ConfigError::Policy(BLOCK_POLICY_VAR, value)),
            },
        };

        Ok(Self {
            questions,
            load_timeout,
            reset_on_wrap,
            block_policy,
        })
    }
}
