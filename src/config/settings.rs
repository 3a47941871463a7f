//! Persisted client settings

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{DittoError, Result};

/// Backend used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "https://api.heyditto.ai";

/// Settings file contents (stored in `<config_dir>/ditto/config.json`)
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Backend root URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Identifier of this device, sent with every chat turn
    #[serde(rename = "deviceID", default = "new_device_id")]
    pub device_id: String,

    #[serde(rename = "userID", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Ask the backend to search older memories for each turn
    #[serde(default)]
    pub deep_search_memories: bool,

    /// Connect timeout for backend requests
    #[serde(default = "default_request_timeout", skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> Option<u64> {
    Some(30)
}

fn new_device_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            device_id: new_device_id(),
            user_id: None,
            token: None,
            deep_search_memories: false,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("device_id", &self.device_id)
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("deep_search_memories", &self.deep_search_memories)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Settings {
    /// Load settings from a specific path
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| DittoError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| DittoError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save settings to a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
