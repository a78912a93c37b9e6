//! Configuration resolution for feedlink.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (`--config` path, or the global
//!    `<config dir>/feedlink/settings.json` when present)
//! 3. Environment variables and CLI arguments (applied by the binary)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};

/// Complete feedlink configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub logging: LogSettings,
}

/// Relay settings as they appear in the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Even if the process starts, should the relay run?
    pub enabled: bool,
    /// Source identity written to the `src` field of every envelope.
    pub src_name: String,
    pub upstream_host: String,
    pub upstream_port: u16,
    pub downstream_host: String,
    pub downstream_port: u16,
    /// Fixed delay before reconnecting a session that went down.
    pub connect_delay_ms: u64,
    /// Upper bound on a single connect attempt.
    pub connect_timeout_ms: u64,
    pub watchdog_tick_ms: u64,
    /// Upstream is declared stalled after this long without a line.
    pub upstream_timeout_ms: u64,
    /// Downstream is declared stalled after this long without a ping.
    /// Defaults to twice the keepalive interval.
    pub downstream_timeout_ms: Option<u64>,
    /// Cadence of outbound pings to the aggregator.
    pub keepalive_interval_ms: u64,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub stall_policy: StallPolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            src_name: "feedlink".to_string(),
            upstream_host: "127.0.0.1".to_string(),
            upstream_port: 30002,
            downstream_host: "127.0.0.1".to_string(),
            downstream_port: 9999,
            connect_delay_ms: 5_000,
            connect_timeout_ms: 10_000,
            watchdog_tick_ms: 1_000,
            upstream_timeout_ms: 30_000,
            downstream_timeout_ms: None,
            keepalive_interval_ms: 30_000,
            queue_capacity: 1024,
            overflow_policy: OverflowPolicy::default(),
            stall_policy: StallPolicy::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// What happens to a new envelope when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the incoming envelope, keep the backlog.
    #[default]
    DropNewest,
    /// Evict the oldest queued envelope to make room.
    DropOldest,
}

impl OverflowPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DropNewest => "drop-newest",
            Self::DropOldest => "drop-oldest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop-newest" => Ok(Self::DropNewest),
            "drop-oldest" => Ok(Self::DropOldest),
            other => Err(Error::Config(format!(
                "unknown overflow policy '{other}' (expected drop-newest or drop-oldest)"
            ))),
        }
    }
}

/// What the relay does after the watchdog detects a stalled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StallPolicy {
    /// Tear the session down and reconnect it like any transient failure.
    #[default]
    Reconnect,
    /// Tear the session down and stop the relay so a process manager can
    /// restart it.
    Exit,
}

impl StallPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reconnect => "reconnect",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for StallPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StallPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reconnect" => Ok(Self::Reconnect),
            "exit" => Ok(Self::Exit),
            other => Err(Error::Config(format!(
                "unknown stall policy '{other}' (expected reconnect or exit)"
            ))),
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit path must exist; the global settings file is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }

    match global_config_path() {
        Some(global_path) if global_path.exists() => load_config_file(&global_path),
        _ => Ok(Config::default()),
    }
}

/// Get the global settings file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("feedlink").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    debug!(path = %path.display(), "Loading settings file");
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert!(config.relay.enabled);
        assert_eq!(config.relay.upstream_port, 30002);
        assert_eq!(config.relay.connect_delay_ms, 5_000);
        assert_eq!(config.relay.watchdog_tick_ms, 1_000);
        assert!(config.relay.downstream_timeout_ms.is_none());
        assert_eq!(config.relay.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(config.relay.stall_policy, StallPolicy::Reconnect);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = write_settings(
            r#"{"relay": {"src_name": "northwind", "upstream_port": 40001, "overflow_policy": "drop-oldest"}}"#,
        );
        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(config.relay.src_name, "northwind");
        assert_eq!(config.relay.upstream_port, 40001);
        assert_eq!(config.relay.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.relay.upstream_host, "127.0.0.1");
        assert_eq!(config.relay.queue_capacity, 1024);
        assert!(!config.logging.json);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let file = write_settings(r#"{"relay": {"enabled": false, "dedupe": 3}, "extra": 1}"#);
        let config = load_config(Some(file.path())).unwrap();
        assert!(!config.relay.enabled);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let file = write_settings("{relay");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn policies_parse_from_cli_strings() {
        assert_eq!(
            "drop-oldest".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::DropOldest
        );
        assert_eq!("exit".parse::<StallPolicy>().unwrap(), StallPolicy::Exit);
        assert!("sometimes".parse::<StallPolicy>().is_err());
        assert_eq!(StallPolicy::Reconnect.to_string(), "reconnect");
    }
}
