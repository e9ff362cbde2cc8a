//! Persistent user settings.
//!
//! Stores user preferences in ~/.safe-sentinel/settings.json.
//! Settings are loaded with env var > settings.json > default priority.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Values the user may pin on disk. Every field is optional; unset fields
/// fall through to the built-in defaults in `config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Safe Transaction Service base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_transaction_api_url: Option<String>,

    /// Analyzer backend base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer_api_url: Option<String>,

    /// Signing backend base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub etherscan_api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_app_url: Option<String>,

    /// EIP-3770 chain prefix used in Safe app links (e.g. `sep`, `eth`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_prefix: Option<String>,

    /// Safe address pre-filled in the transaction list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_safe: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_idle_timeout_secs: Option<u64>,
}

impl Settings {
    /// Get the default settings file path (~/.safe-sentinel/settings.json).
    pub fn default_path() -> PathBuf {
        crate::bootstrap::sentinel_home().join("settings.json")
    }

    /// Load settings from disk, returning default if not found.
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path.
    ///
    /// A missing file yields defaults silently; an unreadable or invalid one
    /// is logged and also yields defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!("Ignoring invalid settings file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!("Failed to read settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write settings as pretty JSON, creating the parent directory.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::default_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = Settings {
            default_safe: Some("0xabc".to_string()),
            network_prefix: Some("eth".to_string()),
            stream_idle_timeout_secs: Some(0),
            ..Default::default()
        };
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded, settings);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("analyzer_api_url"));
    }

    #[test]
    fn invalid_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"default_safe":"0x1","theme":"dark"}"#).unwrap();
        assert_eq!(Settings::load_from(&path).default_safe.as_deref(), Some("0x1"));
    }
}
