// Configuration management module
// Handles loading, saving, and validating configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between two polls of the Jellyfin sessions endpoint
    pub refresh_interval: u64,

    /// Timeout in seconds for each HTTP request made during a poll
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Where published artwork URLs are remembered between runs
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    pub jellyfin: JellyfinConfig,

    pub discord: DiscordConfig,

    #[serde(default)]
    pub artwork: ArtworkConfig,

    /// Text cleanup configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JellyfinConfig {
    pub server_url: String,
    pub api_key: String,
    pub user_id: String,
}

impl JellyfinConfig {
    /// Server address without a trailing slash, ready for path joins
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkConfig {
    /// Multipart upload endpoint of the public image host
    pub upload_url: String,

    /// Image key shown when no public artwork URL is available
    pub placeholder: String,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            upload_url: "https://catbox.moe/user/api.php".to_string(),
            placeholder: "jellyfin_logo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Enable text cleanup
    pub enabled: bool,

    /// Regex patterns to remove from track/album/artist names
    /// Applied in order, each pattern is removed from the text
    pub patterns: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            patterns: vec![
                r"\s*\[Explicit\]".to_string(),
                r"\s*\(Explicit\)".to_string(),
                r"\s*\[Remastered\]".to_string(),
                r"\s*- Remastered( \d{4})?".to_string(),
            ],
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("art_cache.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval: 15,
            request_timeout: default_request_timeout(),
            cache_path: default_cache_path(),
            jellyfin: JellyfinConfig {
                server_url: "http://localhost:8096".to_string(),
                ..Default::default()
            },
            discord: DiscordConfig::default(),
            artwork: ArtworkConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl Config {
    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;

        Ok(config_dir.join("jellyfin_presence.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            log::info!("Config file not found, creating default at {:?}", config_path);
            let default_config = Self::default();
            default_config.save_to(config_path)?;
            default_config.validate().with_context(|| {
                format!("Fill in the generated config at {}", config_path.display())
            })?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, content).context("Failed to write config file")?;

        log::info!("Config saved to {:?}", config_path);

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval == 0 {
            anyhow::bail!("refresh_interval must be greater than 0");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.jellyfin.server_url.trim().is_empty() {
            anyhow::bail!("jellyfin.server_url is required");
        }
        if self.jellyfin.api_key.is_empty() {
            anyhow::bail!("jellyfin.api_key is required");
        }
        if self.jellyfin.user_id.is_empty() {
            anyhow::bail!("jellyfin.user_id is required");
        }

        if self.discord.client_id.is_empty() {
            anyhow::bail!("discord.client_id is required");
        }

        if self.artwork.upload_url.is_empty() {
            anyhow::bail!("artwork.upload_url is required");
        }
        if self.artwork.placeholder.is_empty() {
            log::warn!("artwork.placeholder is empty, tracks without artwork will show no image");
        }

        Ok(())
    }
}
