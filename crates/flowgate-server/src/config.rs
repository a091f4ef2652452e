//! Server configuration.
//!
//! Loading flow: compiled defaults, deep-merged with an optional JSON
//! settings file, then `FLOWGATE_*` environment overrides (highest
//! priority). Invalid env values are ignored with a warning rather than
//! aborting startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for the gateway server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent client channels; further upgrades are refused.
    pub max_connections: usize,
    /// Interval between server Ping frames, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a client that has not answered a ping for this long.
    pub heartbeat_timeout_secs: u64,
    /// Capacity of each channel's outbound queue.
    pub send_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 500,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            send_queue_size: 1024,
        }
    }
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file exists but could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file or merged result is not valid configuration.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ServerConfig {
    /// Load configuration: defaults ← file (if present) ← env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = serde_json::to_value(Self::default())?;

        let merged = match path {
            Some(path) if path.exists() => {
                debug!(?path, "loading config file");
                let content = std::fs::read_to_string(path)?;
                let user: Value = serde_json::from_str(&content)?;
                deep_merge(defaults, user)
            }
            Some(path) => {
                debug!(?path, "config file not found, using defaults");
                defaults
            }
            None => defaults,
        };

        let mut config: Self = serde_json::from_value(merged)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `FLOWGATE_*` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = read_env_string("FLOWGATE_HOST") {
            self.host = v;
        }
        if let Some(v) = read_env_u64("FLOWGATE_PORT", 0, 65_535) {
            self.port = v as u16;
        }
        if let Some(v) = read_env_u64("FLOWGATE_MAX_CONNECTIONS", 1, 1_000_000) {
            self.max_connections = v as usize;
        }
        if let Some(v) = read_env_u64("FLOWGATE_HEARTBEAT_INTERVAL_SECS", 1, 3_600) {
            self.heartbeat_interval_secs = v;
        }
        if let Some(v) = read_env_u64("FLOWGATE_HEARTBEAT_TIMEOUT_SECS", 1, 86_400) {
            self.heartbeat_timeout_secs = v;
        }
        if let Some(v) = read_env_u64("FLOWGATE_SEND_QUEUE_SIZE", 1, 1_048_576) {
            self.send_queue_size = v as usize;
        }
    }
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per-key (source wins); arrays and primitives are
/// replaced entirely; nulls in source are skipped, preserving target.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse_bounded_u64(&raw, min, max);
    if parsed.is_none() {
        warn!(name, value = raw, min, max, "env override invalid or out of range, ignored");
    }
    parsed
}

/// Parse a decimal integer within `[min, max]`; anything else is `None`.
fn parse_bounded_u64(raw: &str, min: u64, max: u64) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.max_connections, 500);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.heartbeat_timeout_secs, 90);
        assert_eq!(cfg.send_queue_size, 1024);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = ServerConfig::load(Some(Path::new("/nonexistent/flowgate.json"))).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 8080, "max_connections": 10}}"#).unwrap();
        let cfg = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_connections, 10);
        // Untouched keys keep their defaults.
        assert_eq!(cfg.heartbeat_interval_secs, 30);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(ServerConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn partial_file_with_unknown_keys_still_loads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"host": "0.0.0.0", "future_knob": true}}"#).unwrap();
        let cfg = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
    }

    #[test]
    fn deep_merge_source_wins_per_key() {
        let target = serde_json::json!({"a": 1, "b": {"c": 2, "d": 3}});
        let source = serde_json::json!({"b": {"c": 9}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"]["c"], 9);
        assert_eq!(merged["b"]["d"], 3);
    }

    #[test]
    fn deep_merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let target = serde_json::json!({"a": [1, 2, 3]});
        let source = serde_json::json!({"a": [9]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], serde_json::json!([9]));
    }

    #[test]
    fn bounded_parse_accepts_in_range() {
        assert_eq!(parse_bounded_u64("8080", 0, 65_535), Some(8080));
        assert_eq!(parse_bounded_u64(" 42 ", 1, 100), Some(42));
    }

    #[test]
    fn bounded_parse_rejects_out_of_range_and_garbage() {
        assert_eq!(parse_bounded_u64("0", 1, 100), None);
        assert_eq!(parse_bounded_u64("101", 1, 100), None);
        assert_eq!(parse_bounded_u64("-3", 1, 100), None);
        assert_eq!(parse_bounded_u64("8080n", 0, 65_535), None);
        assert_eq!(parse_bounded_u64("", 0, 65_535), None);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port, cfg.port);
        assert_eq!(back.max_connections, cfg.max_connections);
    }
}
