//! Configuration management for the Ditto client
//!
//! Settings are layered, later layers winning:
//! 1. Built-in defaults
//! 2. Settings file (`<config_dir>/ditto/config.json`)
//! 3. Environment variables (`DITTO_BASE_URL`, `DITTO_TOKEN`, `DITTO_USER_ID`, `DITTO_DEVICE_ID`)
//! 4. CLI parameters
//!
//! Only the settings file layer is ever written back.

pub mod settings;

use std::path::{Path, PathBuf};

pub use self::settings::{Settings, DEFAULT_BASE_URL};
use crate::error::Result;

/// Loaded configuration and where it came from
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,

    /// File the settings were read from and are saved to
    pub path: PathBuf,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
}

impl Config {
    /// Load the settings file alone, creating it on first use
    ///
    /// Only the file layer is read here, so saving the result never writes
    /// values that came from the environment or the command line. A missing
    /// file is written with the defaults to keep the generated device id.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be parsed or created
    pub fn load_stored(path: &Path) -> Result<Self> {
        let config = Self {
            settings: Settings::load_from_path(path)?,
            path: path.to_path_buf(),
        };
        if !path.exists() {
            config.save()?;
        }
        Ok(config)
    }

    /// Apply environment variables resolved through `env`
    #[must_use]
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base_url) = env("DITTO_BASE_URL") {
            self.settings.base_url = base_url;
        }
        if let Some(token) = env("DITTO_TOKEN") {
            self.settings.token = Some(token);
        }
        if let Some(user_id) = env("DITTO_USER_ID") {
            self.settings.user_id = Some(user_id);
        }
        if let Some(device_id) = env("DITTO_DEVICE_ID") {
            self.settings.device_id = device_id;
        }
        self
    }

    /// Apply CLI overrides on top of everything else
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(base_url) = overrides.base_url {
            self.settings.base_url = base_url;
        }
        if let Some(token) = overrides.token {
            self.settings.token = Some(token);
        }
        if let Some(user_id) = overrides.user_id {
            self.settings.user_id = Some(user_id);
        }
        self
    }

    /// Get the configuration directory path
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ditto")
    }

    /// Get the settings file path
    #[must_use]
    pub fn settings_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Save the settings back to [`Config::path`]
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save(&self) -> Result<()> {
        self.settings.save_to_path(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_settings_path() {
        assert!(Config::settings_path().ends_with("ditto/config.json"));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"baseUrl": "https://file.example", "token": "file-token"}"#)
            .unwrap();

        let env: HashMap<&str, &str> = [("DITTO_TOKEN", "env-token"), ("DITTO_DEVICE_ID", "dev-9")]
            .into_iter()
            .collect();
        let config = Config::load_stored(&path)
            .unwrap()
            .with_env(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.settings.base_url, "https://file.example");
        assert_eq!(config.settings.token.as_deref(), Some("env-token"));
        assert_eq!(config.settings.device_id, "dev-9");
    }

    #[test]
    fn test_cli_overrides_win() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let config = Config::load_stored(&path)
            .unwrap()
            .with_env(|_| Some("from-env".to_string()))
            .with_overrides(Overrides {
                base_url: Some("https://cli.example".to_string()),
                ..Overrides::default()
            });

        assert_eq!(config.settings.base_url, "https://cli.example");
        assert_eq!(config.settings.user_id.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_first_load_persists_only_file_layer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let stored = Config::load_stored(&path).unwrap();
        assert!(path.exists());
        let effective = stored
            .clone()
            .with_env(|k| (k == "DITTO_TOKEN").then(|| "env-secret".to_string()))
            .with_overrides(Overrides {
                base_url: Some("https://cli.example".to_string()),
                ..Overrides::default()
            });
        assert_eq!(effective.settings.token.as_deref(), Some("env-secret"));

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("env-secret"));
        assert!(!written.contains("cli.example"));

        let reloaded = Config::load_stored(&path).unwrap();
        assert!(reloaded.settings.token.is_none());
        assert_eq!(reloaded.settings.device_id, stored.settings.device_id);
    }

    #[test]
    fn test_saving_file_layer_keeps_env_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");

        let mut stored = Config::load_stored(&path).unwrap();
        stored.settings.base_url = "https://set.example".to_string();
        stored.save().unwrap();
        let effective = stored
            .clone()
            .with_env(|k| (k == "DITTO_TOKEN").then(|| "env-secret".to_string()));
        assert_eq!(effective.settings.base_url, "https://set.example");

        let reloaded = Config::load_stored(&path).unwrap();
        assert_eq!(reloaded.settings.base_url, "https://set.example");
        assert!(reloaded.settings.token.is_none());
    }
}
