//! Engine configuration
//!
//! All settings come from the environment. Parsing goes through a key lookup
//! function so tests can supply a map instead of mutating process state.

use crate::error::ConfigError;
use crate::scheduler::SchedulerConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use wse_core::ScriptSettings;

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected `text` or `json`, got `{other}`")),
        }
    }
}

/// Resolved engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Watched root (`DATA_DIR`)
    pub data_dir: PathBuf,
    pub debounce: Duration,
    pub heartbeat: Duration,
    /// Change-detection poll interval
    pub poll: Duration,
    /// Task queue pool size, at least 1
    pub workers: usize,
    /// Mode tag written into apply manifests
    pub mode: String,
    pub python: PathBuf,
    pub script_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// `EnvFilter` directives
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/mnt/data"),
            debounce: Duration::from_millis(2000),
            heartbeat: Duration::from_secs(60),
            poll: Duration::from_millis(500),
            workers: 2,
            mode: "A_FAST".to_string(),
            python: PathBuf::from("python3"),
            script_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_millis(5000),
            log_filter: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl EngineConfig {
    /// Read from the process environment
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first unusable variable
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from a map of variables
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first unusable variable
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Read through an arbitrary lookup; unset or blank keys keep defaults
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first unusable variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let workers = match get("ENGINE_WORKERS") {
            Some(raw) => {
                let n: usize = parse("ENGINE_WORKERS", &raw)?;
                if n == 0 {
                    return Err(ConfigError::invalid("ENGINE_WORKERS", &raw, "must be at least 1"));
                }
                n
            }
            None => defaults.workers,
        };

        let log_format = match get("ENGINE_LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|reason: String| ConfigError::invalid("ENGINE_LOG_FORMAT", &raw, reason))?,
            None => defaults.log_format,
        };

        Ok(Self {
            data_dir: get("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            debounce: millis(get("ENGINE_DEBOUNCE_MS"), "ENGINE_DEBOUNCE_MS", defaults.debounce)?,
            heartbeat: nonzero(
                secs(get("ENGINE_HEARTBEAT_SECS"), "ENGINE_HEARTBEAT_SECS", defaults.heartbeat)?,
                "ENGINE_HEARTBEAT_SECS",
            )?,
            poll: nonzero(
                millis(get("ENGINE_POLL_MS"), "ENGINE_POLL_MS", defaults.poll)?,
                "ENGINE_POLL_MS",
            )?,
            workers,
            mode: get("ENGINE_MODE").unwrap_or(defaults.mode),
            python: get("ENGINE_PYTHON").map_or(defaults.python, PathBuf::from),
            script_timeout: secs(
                get("ENGINE_SCRIPT_TIMEOUT_SECS"),
                "ENGINE_SCRIPT_TIMEOUT_SECS",
                defaults.script_timeout,
            )?,
            shutdown_timeout: millis(
                get("ENGINE_SHUTDOWN_TIMEOUT_MS"),
                "ENGINE_SHUTDOWN_TIMEOUT_MS",
                defaults.shutdown_timeout,
            )?,
            log_filter: get("ENGINE_LOG").unwrap_or(defaults.log_filter),
            log_format,
        })
    }

    /// Timing for the debounce/heartbeat loop
    #[must_use]
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            debounce: self.debounce,
            heartbeat: self.heartbeat,
        }
    }

    /// Settings for script-backed operations
    #[must_use]
    pub fn scripts(&self) -> ScriptSettings {
        ScriptSettings {
            python: self.python.clone(),
            default_timeout: self.script_timeout,
            working_dir: None,
        }
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::invalid(var, raw, e))
}

fn millis(raw: Option<String>, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    raw.map_or(Ok(default), |raw| parse(var, &raw).map(Duration::from_millis))
}

fn secs(raw: Option<String>, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    raw.map_or(Ok(default), |raw| parse(var, &raw).map(Duration::from_secs))
}

// a zero period would spin the heartbeat loop and panics `tokio::time::interval`
fn nonzero(value: Duration, var: &'static str) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::invalid(var, "0", "must be at least 1"));
    }
    Ok(value)
}
