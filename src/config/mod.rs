// src/config/mod.rs - TOML configuration with environment overrides for credentials

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::time::Duration;

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub core: CoreConfig,
    pub moderation: ModerationConfig,
    pub storage: StorageConfig,
    pub twitch: TwitchConfig,
    pub poller: PollerConfig,
}

/// Event loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Bounded wait on the event queue
    pub poll_interval_ms: u64,
    pub tick_interval_secs: u64,
    /// Reconnect after this long without any inbound event
    pub idle_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub reachability_interval_secs: u64,
    /// Delay between failed connection attempts
    pub retry_delay_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            tick_interval_secs: 5,
            idle_timeout_secs: 60,
            heartbeat_interval_secs: 20,
            reachability_interval_secs: 5,
            retry_delay_secs: 10,
        }
    }
}

impl CoreConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reachability_interval(&self) -> Duration {
        Duration::from_secs(self.reachability_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Moderation rule switches and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub links: bool,
    pub words: bool,
    pub symbols: bool,
    pub caps: bool,
    pub emotes: bool,
    pub length: bool,
    pub fake_subscriptions: bool,
    /// Accept Hangul in the character allow-list
    pub allow_korean: bool,
    pub caps_max_percent: u32,
    pub caps_min_letters: usize,
    pub max_emotes: usize,
    /// Character limit for normal users
    pub max_length: usize,
    /// Character limit for regulars and subscribers
    pub max_length_privileged: usize,
    /// Extra timeout (seconds) applied on top of escalation for banned words
    pub banned_word_timeout: Option<u64>,
    /// `{user}` and `{word}` are substituted
    pub banned_word_response: String,
    pub spam_phrase: Option<String>,
    pub spam_phrase_ban: bool,
    pub spam_phrase_duration: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            links: true,
            words: true,
            symbols: true,
            caps: true,
            emotes: true,
            length: true,
            fake_subscriptions: true,
            allow_korean: false,
            caps_max_percent: 70,
            caps_min_letters: 10,
            max_emotes: 8,
            max_length: 300,
            max_length_privileged: 500,
            banned_word_timeout: None,
            banned_word_response: "{user}, \"{word}\" is not allowed here".to_string(),
            spam_phrase: None,
            spam_phrase_ban: false,
            spam_phrase_duration: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the autosaved lists and the custom command table
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

/// Chat network credentials and endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitchConfig {
    pub username: String,
    /// oauth:your_token_here
    pub oauth_token: String,
    pub channel: String,
    pub server_url: String,
    /// host:port checked for reachability before connecting
    pub reachability_address: String,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            oauth_token: String::new(),
            channel: String::new(),
            server_url: "wss://irc-ws.chat.twitch.tv:443".to_string(),
            reachability_address: "irc-ws.chat.twitch.tv:443".to_string(),
        }
    }
}

impl TwitchConfig {
    /// Credentials from the environment take precedence over the file
    pub fn apply_env(&mut self) {
        if let Ok(username) = env::var("TWITCH_USERNAME") {
            self.username = username;
        }
        if let Ok(token) = env::var("TWITCH_OAUTH_TOKEN") {
            self.oauth_token = token;
        }
        if let Ok(channel) = env::var("TWITCH_CHANNEL") {
            self.channel = channel;
        }
        self.channel = self.channel.trim().trim_start_matches('#').to_lowercase();
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            anyhow::bail!("Twitch username not set (twitch.username or TWITCH_USERNAME)");
        }
        if self.channel.is_empty() {
            anyhow::bail!("Twitch channel not set (twitch.channel or TWITCH_CHANNEL)");
        }
        if !self.oauth_token.starts_with("oauth:") {
            anyhow::bail!(
                "Twitch OAuth token must start with 'oauth:' - got: {}...",
                self.oauth_token.chars().take(6).collect::<String>()
            );
        }
        Ok(())
    }
}

/// Stream status polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub enabled: bool,
    pub client_id: String,
    pub api_base: String,
    pub poll_interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: String::new(),
            api_base: "https://api.twitch.tv/helix".to_string(),
            poll_interval_secs: 60,
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl BotConfig {
    /// Load from a TOML file, falling back to defaults if it does not exist,
    /// then apply environment overrides
    pub async fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config = Self::from_toml(&content)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            warn!("No configuration at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env(&mut self) {
        self.twitch.apply_env();
        if let Ok(client_id) = env::var("TWITCH_CLIENT_ID") {
            self.poller.client_id = client_id;
        }
    }

    /// Sanity checks that do not depend on credentials
    pub fn validate(&self) -> Result<()> {
        if self.core.poll_interval_ms == 0 {
            anyhow::bail!("core.poll_interval_ms must be greater than zero");
        }
        if self.core.idle_timeout_secs <= self.core.heartbeat_interval_secs {
            anyhow::bail!("core.idle_timeout_secs must exceed core.heartbeat_interval_secs");
        }
        if self.moderation.caps_max_percent > 100 {
            anyhow::bail!("moderation.caps_max_percent must be between 0 and 100");
        }
        if self.poller.enabled && self.poller.client_id.is_empty() {
            anyhow::bail!("poller.client_id (or TWITCH_CLIENT_ID) is required when the poller is enabled");
        }
        debug!("Configuration validated");
        Ok(())
    }
}
