//! Configuration file handling for ugc-studio.
//!
//! Loads configuration from `~/.config/ugc-studio/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::{FallbackPolicy, OrchestratorSettings};
use crate::provider::{PollPolicy, PROVIDER_API_BASE_URL};

/// Configuration file structure for ugc-studio.
/// Loaded from ~/.config/ugc-studio/config.toml (or custom path via --config).
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub credits: CreditsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_max_consecutive_poll_errors")]
    pub max_consecutive_poll_errors: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default = "default_fallback_video_url")]
    pub fallback_video_url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            max_consecutive_poll_errors: default_max_consecutive_poll_errors(),
            timeout_secs: default_timeout_secs(),
            fallback_enabled: true,
            fallback_video_url: default_fallback_video_url(),
        }
    }
}

impl GenerationConfig {
    /// Build the poll policy described by this section.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
            max_consecutive_errors: self.max_consecutive_poll_errors,
            deadline: Duration::from_secs(self.timeout_secs),
        }
    }

    /// Build the full orchestrator settings described by this section.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            poll: self.poll_policy(),
            fallback: FallbackPolicy {
                enabled: self.fallback_enabled,
                placeholder_url: self.fallback_video_url.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreditsConfig {
    #[serde(default = "default_starting_grant")]
    pub starting_grant: u32,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            starting_grant: default_starting_grant(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Directory holding the selection store and profile records.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    PROVIDER_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_poll_attempts() -> u32 {
    120
}

fn default_max_consecutive_poll_errors() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    900
}

fn default_fallback_video_url() -> String {
    "https://example.com/video.mp4".to_string()
}

fn default_starting_grant() -> u32 {
    10
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?;
            config.validate().map_err(|(field, reason)| ConfigError::Invalid {
                path: path.clone(),
                field,
                reason,
            })?;
            log::debug!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}

impl Config {
    /// Check values that parse but cannot drive a job.
    fn validate(&self) -> Result<(), (&'static str, &'static str)> {
        let non_zero = [
            ("provider.request_timeout_secs", self.provider.request_timeout_secs),
            ("generation.poll_interval_ms", self.generation.poll_interval_ms),
            (
                "generation.max_poll_attempts",
                u64::from(self.generation.max_poll_attempts),
            ),
            (
                "generation.max_consecutive_poll_errors",
                u64::from(self.generation.max_consecutive_poll_errors),
            ),
            ("generation.timeout_secs", self.generation.timeout_secs),
        ];
        match non_zero.iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err((*field, "must be greater than 0")),
            None => Ok(()),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {field} in '{}': {reason}", path.display())]
    Invalid {
        path: PathBuf,
        field: &'static str,
        reason: &'static str,
    },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("ugc-studio").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/ugc-studio/config.toml")
        })
}

/// Get the default data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("ugc-studio")
}

/// Contents written by `config init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# ugc-studio configuration

[provider]
# Video provider API base URL
base_url = "https://api.heygen.com/v1"
# Per-request timeout in seconds
request_timeout_secs = 30

[generation]
# Delay between status polls
poll_interval_ms = 5000
# Give up after this many polls
max_poll_attempts = 120
# Give up after this many consecutive transport errors while polling
max_consecutive_poll_errors = 5
# Wall-clock limit for a single job
timeout_secs = 900
# Resolve with a placeholder video when the provider cannot be reached
fallback_enabled = true
fallback_video_url = "https://example.com/video.mp4"

[credits]
# Balance granted to new accounts
starting_grant = 10

[storage]
# data_dir = "/path/to/data"
"#;
