//! Logging
//!
//! Two sinks:
//! - `tracing` events, formatted as text or JSON by `tracing-subscriber`
//! - the engine journal, an append-only JSON-lines file under `_logs/` with
//!   one line per lifecycle event (`start`, `pipeline`, `heartbeat`, `stop`)

use crate::config::{EngineConfig, LogFormat};
use crate::error::ConfigError;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wse_artifact::{append_line, iso_stamp};

/// Journal file name under the logs directory
pub const JOURNAL_FILE: &str = "engine_heartbeat.jsonl";

/// Install the global subscriber
///
/// Returns `false` if a subscriber was already installed (tests, embedding).
///
/// # Errors
/// - `ConfigError::Invalid` if `ENGINE_LOG` is not a valid filter
pub fn init_tracing(config: &EngineConfig) -> Result<bool, ConfigError> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|e| ConfigError::invalid("ENGINE_LOG", &config.log_filter, e))?;

    let installed = match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
            .is_ok(),
    };
    Ok(installed)
}

/// One journal line
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEvent {
    pub ts: String,
    pub event: String,
    pub fields: Map<String, Value>,
}

impl JournalEvent {
    /// Event stamped now
    #[must_use]
    pub fn now(event: impl Into<String>) -> Self {
        Self {
            ts: iso_stamp(Utc::now()),
            event: event.into(),
            fields: Map::new(),
        }
    }

    /// Add a field
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// `{"ts", "event", ...fields}` on a single line
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut object = Map::new();
        object.insert("ts".to_string(), Value::String(self.ts.clone()));
        object.insert("event".to_string(), Value::String(self.event.clone()));
        for (key, value) in &self.fields {
            if key != "ts" && key != "event" {
                object.insert(key.clone(), value.clone());
            }
        }
        Value::Object(object).to_string()
    }
}

/// Append-only JSON-lines journal
///
/// Writes never fail the caller: an unwritable journal is reported through
/// `tracing` and otherwise ignored.
#[derive(Debug)]
pub struct EventJournal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl EventJournal {
    /// Journal at `<logs_dir>/engine_heartbeat.jsonl`
    #[must_use]
    pub fn in_dir(logs_dir: &Path) -> Self {
        Self::at(logs_dir.join(JOURNAL_FILE))
    }

    /// Journal at an explicit path
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event; returns whether the line was written
    pub fn record(&self, event: &JournalEvent) -> bool {
        let line = event.to_line();
        let _guard = self.write_lock.lock();
        match append_line(&self.path, &line) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Journal write failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn line_has_ts_and_event_first_class() {
        let event = JournalEvent::now("start").with("data_dir", "/mnt/data");
        let parsed: Value = serde_json::from_str(&event.to_line()).unwrap();
        assert_eq!(parsed["event"], "start");
        assert_eq!(parsed["data_dir"], "/mnt/data");
        assert!(parsed["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn fields_cannot_shadow_reserved_keys() {
        let event = JournalEvent::now("heartbeat").with("event", "spoofed");
        let parsed: Value = serde_json::from_str(&event.to_line()).unwrap();
        assert_eq!(parsed["event"], "heartbeat");
    }

    #[test]
    fn journal_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = EventJournal::in_dir(&dir.path().join("_logs"));

        assert!(journal.record(&JournalEvent::now("start")));
        assert!(journal.record(&JournalEvent::now("pipeline").with("ok", true)));

        let text = std::fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["ok"], json!(true));
    }

    #[test]
    fn unwritable_journal_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // a directory squatting on the journal path makes the open fail
        let path = dir.path().join("journal.jsonl");
        std::fs::create_dir(&path).unwrap();
        let journal = EventJournal::at(&path);
        assert!(!journal.record(&JournalEvent::now("stop")));
    }

    #[test]
    fn bad_filter_is_config_error() {
        let config = EngineConfig {
            log_filter: "wse_core=loud".to_string(),
            ..EngineConfig::default()
        };
        assert!(init_tracing(&config).is_err());
    }
}
