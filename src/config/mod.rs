//! Configuration management for Courseware.
//!
//! Configuration is read from `~/.config/courseware/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::VideoQuality;

/// How access tokens are presented to the LMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Bearer,
    Jwt,
}

impl TokenType {
    /// Prefix used in the `Authorization` header and the `token_type` form field.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Bearer => "Bearer",
            TokenType::Jwt => "JWT",
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the LMS, e.g. `https://courses.example.org`
    pub api_host_url: String,
    pub oauth_client_id: String,
    pub token_type: TokenType,
    /// Read/write timeout for API calls in seconds (default: 60)
    pub timeout_secs: u64,
    /// Wait after a rejected refresh before re-reading the stored token (default: 1500)
    pub refresh_backoff_ms: u64,
    /// Where downloaded course media is written; defaults to the data directory
    pub download_dir: Option<PathBuf>,
    /// Encoding saved for videos: auto, 360p, 540p or 720p
    pub video_download_quality: VideoQuality,
    /// Never touch the network; serve cached data only
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host_url: "http://localhost:8000".to_string(),
            oauth_client_id: String::new(),
            token_type: TokenType::Jwt,
            timeout_secs: 60,
            refresh_backoff_ms: 1500,
            download_dir: None,
            video_download_quality: VideoQuality::Auto,
            offline: false,
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/courseware/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("courseware").join("config.toml"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_backoff(&self) -> Duration {
        Duration::from_millis(self.refresh_backoff_ms)
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# Courseware Configuration

# Base URL of the LMS
api_host_url = "http://localhost:8000"

# OAuth2 client id registered for this application
oauth_client_id = ""

# Token type: "jwt" or "bearer"
token_type = "jwt"

# Read/write timeout for API calls in seconds
timeout_secs = 60

# Wait after a rejected token refresh before re-reading the stored token (ms)
refresh_backoff_ms = 1500

# Directory for downloaded videos and pages (default: data directory)
# download_dir = "/home/me/Videos/courseware"

# Video quality to download: "auto" (smallest available), "360p", "540p" or "720p"
video_download_quality = "auto"

# Serve cached data only, never touch the network
offline = false
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
