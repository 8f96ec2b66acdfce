//! Configuration management
//!
//! Settings live in `settings.json` inside the tally directory:
//! ```json
//! {
//!   "app": { "databaseFile": "tally.duckdb", "eventLog": true }
//! }
//! ```
//! Keys this crate does not manage are kept untouched on save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_DATABASE_FILE: &str = "tally.duckdb";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    database_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_log: Option<bool>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Tally configuration (resolved view of the settings)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Database file name, relative to the tally directory unless absolute
    pub database_file: String,
    /// Whether commands are recorded in logs.duckdb
    pub event_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            event_log: true,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    // Unreadable JSON falls back to defaults
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

impl Config {
    /// Load config from the tally directory
    ///
    /// `TALLY_DATABASE_FILE` and `TALLY_EVENT_LOG` override the file.
    pub fn load(tally_dir: &Path) -> Result<Self> {
        let raw = read_settings(&tally_dir.join(SETTINGS_FILE))?;
        Ok(Self::resolve(&raw, |key| std::env::var(key).ok()))
    }

    fn resolve(raw: &SettingsFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let database_file = env("TALLY_DATABASE_FILE")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| raw.app.database_file.clone())
            .unwrap_or(defaults.database_file);

        let event_log = env("TALLY_EVENT_LOG")
            .as_deref()
            .and_then(parse_flag)
            .or(raw.app.event_log)
            .unwrap_or(defaults.event_log);

        Self {
            database_file,
            event_log,
        }
    }

    /// Save config to the tally directory, preserving unmanaged keys
    pub fn save(&self, tally_dir: &Path) -> Result<()> {
        let settings_path = tally_dir.join(SETTINGS_FILE);
        let mut settings = read_settings(&settings_path)?;

        settings.app.database_file = Some(self.database_file.clone());
        settings.app.event_log = Some(self.event_log);

        std::fs::create_dir_all(tally_dir)?;
        std::fs::write(&settings_path, serde_json::to_string_pretty(&settings)?)?;
        Ok(())
    }

    /// Full path of the database file
    pub fn database_path(&self, tally_dir: &Path) -> PathBuf {
        let file = Path::new(&self.database_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            tally_dir.join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempdir().unwrap();
        let raw = read_settings(&dir.path().join(SETTINGS_FILE)).unwrap();
        let config = Config::resolve(&raw, no_env);

        assert_eq!(config, Config::default());
        assert_eq!(config.database_path(dir.path()), dir.path().join("tally.duckdb"));
    }

    #[test]
    fn test_env_overrides_file() {
        let raw: SettingsFile =
            serde_json::from_str(r#"{"app": {"databaseFile": "a.duckdb", "eventLog": true}}"#).unwrap();

        let config = Config::resolve(&raw, |key| match key {
            "TALLY_DATABASE_FILE" => Some("b.duckdb".to_string()),
            "TALLY_EVENT_LOG" => Some("off".to_string()),
            _ => None,
        });
        assert_eq!(config.database_file, "b.duckdb");
        assert!(!config.event_log);

        // Unrecognized flag values leave the file setting in place
        let config = Config::resolve(&raw, |key| (key == "TALLY_EVENT_LOG").then(|| "maybe".to_string()));
        assert!(config.event_log);
        assert_eq!(config.database_file, "a.duckdb");
    }

    #[test]
    fn test_save_preserves_unmanaged_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"app": {"theme": "dark"}, "profiles": {"x": 1}}"#).unwrap();

        let config = Config {
            database_file: "other.duckdb".to_string(),
            event_log: false,
        };
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["app"]["theme"], "dark");
        assert_eq!(saved["profiles"]["x"], 1);
        assert_eq!(saved["app"]["databaseFile"], "other.duckdb");
        assert_eq!(saved["app"]["eventLog"], false);

        let raw = read_settings(&path).unwrap();
        assert_eq!(Config::resolve(&raw, no_env), config);
    }

    #[test]
    fn test_absolute_database_path() {
        let dir = tempdir().unwrap();
        let absolute = dir.path().join("elsewhere.duckdb");
        let config = Config {
            database_file: absolute.display().to_string(),
            event_log: true,
        };
        assert_eq!(config.database_path(Path::new("/unused")), absolute);
    }
}
