//! Persistent configuration for skiff.
//!
//! Stores user settings in `~/.skiff/config.json`. Every field is optional in
//! the file; missing fields take their defaults.
//!
//! # Example
//!
//! ```no_run
//! use skiff_core::config::SkiffConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = SkiffConfig::load();
//! println!("connect timeout: {:?}", config.connect_timeout());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::guard::ProtectedPaths;

const CONFIG_DIR: &str = ".skiff";
const CONFIG_FILENAME: &str = "config.json";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Persistent skiff configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkiffConfig {
    /// TCP connect timeout for `CONNECT`, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Remote paths `DELETE` must skip, on top of the built-in list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected_paths: Vec<String>,
}

impl Default for SkiffConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            protected_paths: Vec::new(),
        }
    }
}

/// `~/.skiff`, or `None` when there is no home directory.
fn skiff_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR))
}

impl SkiffConfig {
    /// Load config from `~/.skiff/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        skiff_dir()
            .map(|dir| Self::load_from(&dir.join(CONFIG_FILENAME)))
            .unwrap_or_default()
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Write config as JSON to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Built-in protected paths plus the configured extras.
    pub fn protected(&self) -> ProtectedPaths {
        ProtectedPaths::new(&self.protected_paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SkiffConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.protected_paths.is_empty());
    }

    #[test]
    fn deserialize_empty_json() {
        let loaded: SkiffConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded, SkiffConfig::default());
    }

    #[test]
    fn extra_protected_paths_are_honoured() {
        let config: SkiffConfig =
            serde_json::from_str(r#"{"protected_paths": ["/srv/data"]}"#).unwrap();
        let protected = config.protected();
        assert!(protected.contains("/srv/data"));
        assert!(protected.contains("/etc"));
    }

    #[test]
    fn save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_DIR).join(CONFIG_FILENAME);
        let config = SkiffConfig {
            connect_timeout_ms: 2500,
            protected_paths: vec!["/opt/app".to_string()],
        };
        config.save_to(&path).unwrap();
        assert_eq!(SkiffConfig::load_from(&path), config);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(SkiffConfig::load_from(&path), SkiffConfig::default());
        assert_eq!(
            SkiffConfig::load_from(&dir.path().join("missing.json")),
            SkiffConfig::default()
        );
    }
}
