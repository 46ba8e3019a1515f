//! Configuration management for the publishing engine

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::types::{MediaType, Platform};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Per-platform rate-limit rules; platforms without an entry get
    /// `RateLimitRule::default_for` at load time.
    #[serde(default)]
    pub rate_limits: BTreeMap<Platform, RateLimitRule>,
    /// Per-platform validation overrides (constraints are configuration,
    /// not hard-coded logic).
    #[serde(default)]
    pub constraints: BTreeMap<Platform, ConstraintOverride>,
    /// Static channel roster for the bundled channel directory.
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Timeout applied to each external publish call, in seconds
    pub publish_timeout_secs: u64,
    /// Attempts the job runner makes before giving up on a fired job
    pub job_max_attempts: u32,
    /// Base of the exponential backoff between job attempts, in seconds
    pub job_backoff_base_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            publish_timeout_secs: 30,
            job_max_attempts: 3,
            job_backoff_base_secs: 5,
        }
    }
}

/// Request ceilings over rolling windows, at both scopes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Max requests per window across all channels on the platform
    pub platform_max: u32,
    pub platform_window_secs: u64,
    /// Max requests per window for a single channel
    pub channel_max: u32,
    pub channel_window_secs: u64,
}

impl RateLimitRule {
    /// Conservative defaults per platform, all overridable in config
    pub fn default_for(platform: Platform) -> Self {
        match platform {
            Platform::X => Self {
                platform_max: 300,
                platform_window_secs: 3 * 3600,
                channel_max: 100,
                channel_window_secs: 24 * 3600,
            },
            Platform::Mastodon => Self {
                platform_max: 300,
                platform_window_secs: 3600,
                channel_max: 100,
                channel_window_secs: 3600,
            },
            Platform::Instagram => Self {
                platform_max: 200,
                platform_window_secs: 3600,
                channel_max: 25,
                channel_window_secs: 24 * 3600,
            },
            Platform::Linkedin => Self {
                platform_max: 150,
                platform_window_secs: 24 * 3600,
                channel_max: 50,
                channel_window_secs: 24 * 3600,
            },
            Platform::Youtube => Self {
                platform_max: 50,
                platform_window_secs: 24 * 3600,
                channel_max: 20,
                channel_window_secs: 24 * 3600,
            },
            Platform::Facebook => Self {
                platform_max: 200,
                platform_window_secs: 3600,
                channel_max: 50,
                channel_window_secs: 24 * 3600,
            },
        }
    }
}

/// Partial override of a platform's publishing constraints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintOverride {
    pub max_chars: Option<usize>,
    pub min_media: Option<usize>,
    pub max_media: Option<usize>,
    pub allowed_media: Option<Vec<MediaType>>,
}

/// One connected channel in the static roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub id: String,
    pub workspace_id: String,
    pub platform: Platform,
    pub platform_account_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// File holding the decrypted bearer token for this channel
    pub token_file: String,
    #[serde(default = "default_true")]
    pub connected: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.fill_rate_limit_defaults();
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        let mut config = Self {
            database: DatabaseConfig {
                path: "~/.local/share/syndicate/posts.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            rate_limits: BTreeMap::new(),
            constraints: BTreeMap::new(),
            channels: Vec::new(),
        };
        config.fill_rate_limit_defaults();
        config
    }

    /// Effective rate-limit rule for a platform
    pub fn rate_limit_rule(&self, platform: Platform) -> RateLimitRule {
        self.rate_limits
            .get(&platform)
            .copied()
            .unwrap_or_else(|| RateLimitRule::default_for(platform))
    }

    fn fill_rate_limit_defaults(&mut self) {
        for platform in Platform::ALL {
            self.rate_limits
                .entry(platform)
                .or_insert_with(|| RateLimitRule::default_for(platform));
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SYNDICATE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("syndicate").join("config.toml"))
}

/// Resolve the database path, preferring an explicit config value
pub fn resolve_db_path(configured: Option<&str>) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SYNDICATE_DB_PATH") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    if let Some(path) = configured {
        return Ok(PathBuf::from(shellexpand::tilde(path).to_string()));
    }

    let data_dir =
        dirs::data_dir().ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("syndicate").join("posts.db"))
}
