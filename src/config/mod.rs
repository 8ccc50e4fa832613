//! Daemon configuration for hhd-settings
//!
//! Configuration is read from `<config dir>/daemon.json` when present, then
//! overridden by environment variables:
//!
//! | Variable           | Field                                     |
//! |--------------------|-------------------------------------------|
//! | `HHD_CONFIG_DIR`   | config directory (default `~/.config/hhd`)|
//! | `HHD_STATE_FILE`   | `state_file`                              |
//! | `HHD_SCHEMA_DIRS`  | `schema_dirs` (`:`-separated)             |
//! | `HHD_QUEUE_CAPACITY` | `queue_capacity`                        |
//! | `HHD_DEBOUNCE_MS`  | `debounce_ms`                             |
//! | `HHD_LOG_JSON`     | `log_json`                                |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SettingsError};
use crate::reconcile::{ReconcilerOptions, WatchOptions, DEFAULT_QUEUE_CAPACITY};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "HHD_CONFIG_DIR";

const CONFIG_FILE: &str = "daemon.json";
const STATE_FILE: &str = "state.yml";
const SCHEMA_DIR: &str = "schemas";
const PROFILE_DIR: &str = "profiles";

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// State document. Defaults to `<config dir>/state.yml`.
    pub state_file: Option<PathBuf>,
    /// Directories scanned for schema definition files. Defaults to
    /// `<config dir>/schemas`.
    pub schema_dirs: Vec<PathBuf>,
    /// Per-subscriber change queue capacity.
    pub queue_capacity: usize,
    /// Quiet period before an edited state file is reloaded.
    pub debounce_ms: u64,
    /// Polling interval used when native file watching is unavailable.
    pub poll_interval_ms: u64,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_file: None,
            schema_dirs: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            debounce_ms: 250,
            poll_interval_ms: 2000,
            log_json: false,
        }
    }
}

impl Config {
    /// The config directory: `$HHD_CONFIG_DIR`, else `~/.config/hhd`.
    pub fn dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hhd")
    }

    /// Path of the daemon config file.
    pub fn path() -> PathBuf {
        Self::dir().join(CONFIG_FILE)
    }

    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No daemon config, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SettingsError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply `HHD_*` overrides. `lookup` resolves a variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("HHD_STATE_FILE").filter(|v| !v.is_empty()) {
            self.state_file = Some(PathBuf::from(path));
        }
        if let Some(dirs) = lookup("HHD_SCHEMA_DIRS").filter(|v| !v.is_empty()) {
            self.schema_dirs = std::env::split_paths(&dirs).collect();
        }
        if let Some(raw) = lookup("HHD_QUEUE_CAPACITY") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => self.queue_capacity = n,
                _ => warn!(value = %raw, "Ignoring invalid HHD_QUEUE_CAPACITY"),
            }
        }
        if let Some(raw) = lookup("HHD_DEBOUNCE_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => self.debounce_ms = ms,
                Err(_) => warn!(value = %raw, "Ignoring invalid HHD_DEBOUNCE_MS"),
            }
        }
        if let Some(raw) = lookup("HHD_LOG_JSON") {
            self.log_json = matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    /// Resolved state file path.
    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| Self::dir().join(STATE_FILE))
    }

    /// Resolved schema directories.
    pub fn schema_dirs(&self) -> Vec<PathBuf> {
        if self.schema_dirs.is_empty() {
            vec![Self::dir().join(SCHEMA_DIR)]
        } else {
            self.schema_dirs.clone()
        }
    }

    /// Directory holding saved profiles.
    pub fn profile_dir(&self) -> PathBuf {
        Self::dir().join(PROFILE_DIR)
    }

    pub fn reconciler_options(&self) -> ReconcilerOptions {
        ReconcilerOptions {
            queue_capacity: self.queue_capacity.max(1),
            ..ReconcilerOptions::default()
        }
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(100)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.watch_options().debounce, Duration::from_millis(250));
        assert!(!config.log_json);
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(&tmp.path().join("daemon.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("daemon.json");
        std::fs::write(&path, r#"{"queue_capacity": 8, "state_file": "/tmp/s.json"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.state_file(), PathBuf::from("/tmp/s.json"));
        assert_eq!(config.debounce_ms, 250);
    }

    #[test]
    fn test_load_invalid_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("daemon.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(SettingsError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HHD_STATE_FILE", "/var/lib/hhd/state.yml"),
            ("HHD_SCHEMA_DIRS", "/a:/b"),
            ("HHD_QUEUE_CAPACITY", "0"),
            ("HHD_DEBOUNCE_MS", "100"),
            ("HHD_LOG_JSON", "true"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.state_file(), PathBuf::from("/var/lib/hhd/state.yml"));
        assert_eq!(config.schema_dirs(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        // Zero capacity is rejected.
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.debounce_ms, 100);
        assert!(config.log_json);
    }
}
