//! Process configuration loaded from the environment
use crate::constants::{
    DEFAULT_DEBUG_LOCK_PATH, DEFAULT_LOG_FILTER, UNWOUND_DEBUG_LOCK_VAR,
    UNWOUND_IGNORE_SIGPIPE_VAR, UNWOUND_LOG_VAR,
};
use crate::errors::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Effective configuration for one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// `tracing` filter directive for the stderr subscriber
    pub log_filter: String,
    /// File used to serialize debug prints across processes
    pub debug_lock_path: PathBuf,
    /// Whether SIGPIPE is ignored before the program body runs
    pub ignore_sigpipe: bool,
    /// Where the configuration came from
    pub source: ConfigSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            debug_lock_path: PathBuf::from(DEFAULT_DEBUG_LOCK_PATH),
            ignore_sigpipe: true,
            source: ConfigSource::Default,
        }
    }
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default configuration
    Default,
    /// At least one environment variable overrode a default
    EnvironmentVariable(String),
}

impl Config {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::load_from(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn load_from<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut overridden = Vec::new();

        if let Some(filter) = lookup(UNWOUND_LOG_VAR) {
            if filter.trim().is_empty() {
                return Err(Error::invalid_value(
                    UNWOUND_LOG_VAR,
                    filter,
                    "filter must not be empty",
                ));
            }
            config.log_filter = filter;
            overridden.push(UNWOUND_LOG_VAR);
        }

        if let Some(path) = lookup(UNWOUND_DEBUG_LOCK_VAR) {
            if path.is_empty() {
                return Err(Error::invalid_value(
                    UNWOUND_DEBUG_LOCK_VAR,
                    path,
                    "lock path must not be empty",
                ));
            }
            config.debug_lock_path = PathBuf::from(path);
            overridden.push(UNWOUND_DEBUG_LOCK_VAR);
        }

        if let Some(value) = lookup(UNWOUND_IGNORE_SIGPIPE_VAR) {
            config.ignore_sigpipe = parse_bool(UNWOUND_IGNORE_SIGPIPE_VAR, &value)?;
            overridden.push(UNWOUND_IGNORE_SIGPIPE_VAR);
        }

        if !overridden.is_empty() {
            config.source = ConfigSource::EnvironmentVariable(overridden.join(","));
        }

        Ok(config)
    }

    /// Render the configuration as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("rendering configuration")
    }
}

fn parse_bool(variable: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid_value(variable, value, "expected a boolean")),
    }
}
