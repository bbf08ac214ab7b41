//! Configuration management

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::m3u_parser::FetchOptions;
use crate::player::PlayerConfig;

pub const DEFAULT_PLAYLIST_URL: &str = "https://iptv-org.github.io/iptv/index.m3u";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_playlist_url")]
    pub playlist_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_debounce")]
    pub search_debounce_ms: u64,
    #[serde(default = "default_controls_hide")]
    pub controls_hide_secs: u64,
    /// Viewports narrower than this get landscape simulation in fullscreen
    #[serde(default = "default_narrow_width")]
    pub narrow_viewport_width: u32,
    #[serde(default = "default_true")]
    pub low_latency: bool,
    #[serde(default)]
    pub autoplay: bool,
    #[serde(default = "default_external_player")]
    pub external_player: String,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
}

fn default_playlist_url() -> String { DEFAULT_PLAYLIST_URL.to_string() }
fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_fetch_timeout() -> u64 { 10 }
fn default_debounce() -> u64 { 300 }
fn default_controls_hide() -> u64 { 3 }
fn default_narrow_width() -> u32 { 1024 }
fn default_true() -> bool { true }
fn default_external_player() -> String { "mpv".to_string() }
fn default_viewport_width() -> u32 { 1280 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            playlist_url: default_playlist_url(),
            user_agent: default_user_agent(),
            fetch_timeout_secs: 10,
            search_debounce_ms: 300,
            controls_hide_secs: 3,
            narrow_viewport_width: 1024,
            low_latency: true,
            autoplay: false,
            external_player: default_external_player(),
            viewport_width: 1280,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("iptv_viewer");
        path.push("config.json");
        path
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            user_agent: self.user_agent.clone(),
            ..FetchOptions::default()
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            controls_hide_after: Duration::from_secs(self.controls_hide_secs),
            narrow_viewport_width: self.narrow_viewport_width,
            low_latency: self.low_latency,
            autoplay: self.autoplay,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"autoplay": true}"#).unwrap();
        assert!(config.autoplay);
        assert_eq!(config.playlist_url, DEFAULT_PLAYLIST_URL);
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.search_debounce_ms, 300);
        assert_eq!(config.controls_hide_secs, 3);
        assert_eq!(config.narrow_viewport_width, 1024);
        assert!(config.low_latency);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.playlist_url = "http://example.com/list.m3u".to_string();
        config.external_player = "vlc".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_derived_options() {
        let config = AppConfig {
            fetch_timeout_secs: 4,
            controls_hide_secs: 7,
            ..AppConfig::default()
        };
        assert_eq!(config.fetch_options().timeout, Duration::from_secs(4));
        assert_eq!(config.player_config().controls_hide_after, Duration::from_secs(7));
        assert_eq!(config.search_debounce(), Duration::from_millis(300));
    }
}
