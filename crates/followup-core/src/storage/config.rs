//! TOML-based engine configuration.
//!
//! Holds process-wide settings only:
//! - Engine fallbacks (default timezone, sweep thresholds, search horizon)
//! - Popup defaults (TTL, priority)
//! - Logging level
//!
//! Per-user behavior lives in the preference rows, not here.
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use super::json_path::{display_value, get_by_path, set_by_path};
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// IANA timezone used when a user has none or an unparseable one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// How late a pending reminder must be before it is flagged overdue.
    #[serde(default = "default_overdue_grace")]
    pub overdue_grace_minutes: i64,
    /// Days without any event before a user is considered inactive.
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: i64,
    /// Upper bound for the next-attempt search.
    #[serde(default = "default_search_horizon")]
    pub search_horizon_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopupConfig {
    #[serde(default = "default_ttl_minutes")]
    pub default_ttl_minutes: i64,
    #[serde(default = "default_priority")]
    pub default_priority: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `FOLLOWUP_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub popups: PopupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_timezone() -> String {
    "UTC".into()
}
fn default_overdue_grace() -> i64 {
    15
}
fn default_inactivity_days() -> i64 {
    3
}
fn default_search_horizon() -> i64 {
    14
}
fn default_ttl_minutes() -> i64 {
    24 * 60
}
fn default_priority() -> u8 {
    5
}
fn default_log_level() -> String {
    "warn".into()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            overdue_grace_minutes: default_overdue_grace(),
            inactivity_days: default_inactivity_days(),
            search_horizon_days: default_search_horizon(),
        }
    }
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            default_ttl_minutes: default_ttl_minutes(),
            default_priority: default_priority(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default config");
            Self::default()
        })
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        get_by_path(&json, key).map(display_value)
    }

    /// Set a config value by key without persisting.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        set_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Set a config value by key and persist. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.engine.default_timezone, "UTC");
        assert_eq!(parsed.popups.default_ttl_minutes, 1440);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[engine]\ndefault_timezone = \"Europe/Berlin\"\n").unwrap();
        assert_eq!(parsed.engine.default_timezone, "Europe/Berlin");
        assert_eq!(parsed.engine.overdue_grace_minutes, 15);
        assert_eq!(parsed.logging.level, "warn");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("engine.inactivity_days").as_deref(), Some("3"));
        assert_eq!(cfg.get("logging.level").as_deref(), Some("warn"));
        assert!(cfg.get("engine.missing").is_none());
    }

    #[test]
    fn apply_updates_and_validates() {
        let mut cfg = Config::default();
        cfg.apply("popups.default_priority", "8").unwrap();
        assert_eq!(cfg.popups.default_priority, 8);
        assert!(cfg.apply("popups.default_priority", "loud").is_err());
        assert!(cfg.apply("popups.nope", "1").is_err());
        // u8 overflow is caught by the typed round-trip
        assert!(cfg.apply("popups.default_priority", "900").is_err());
    }
}
