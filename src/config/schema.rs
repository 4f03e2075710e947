use crate::mention::DEFAULT_TRIGGERS;
use crate::relay::{DEFAULT_ACTION_PATH, DEFAULT_PROJECT_ID, DEFAULT_PROJECT_NAME};
use crate::responder::DEFAULT_ACK_MESSAGE;
use crate::teamwork::client::DEFAULT_TIMEOUT_SECS;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "MENTION_RELAY_CONFIG";
const DEFAULT_DB_PATH: &str = "~/.mention-relay/events.db";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("gateway.port must be non-zero")]
    ZeroPort,
    #[error("gateway.request_timeout_secs must be non-zero")]
    ZeroRequestTimeout,
    #[error("{section}.timeout_secs must be between 1 and 120, got {value}")]
    Timeout { section: &'static str, value: u64 },
    #[error("relay.enabled is true but relay.base_url is empty")]
    RelayWithoutUrl,
    #[error("mention.triggers has no non-empty entry")]
    NoTriggers,
    #[error("teamwork.ack_message is empty")]
    EmptyAck,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Path the config was loaded from. Not serialized.
    #[serde(skip)]
    #[schemars(skip)]
    pub config_path: PathBuf,
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
    pub teamwork: TeamworkConfig,
    pub mention: MentionConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret expected in `X-Webhook-Secret` on `/webhook/*`.
    pub webhook_secret: Option<String>,
    /// Allow binding to a non-loopback address.
    pub allow_public_bind: bool,
    /// Per-request timeout. Raised automatically to cover the outbound calls
    /// of one webhook (see [`Config::outbound_budget`]).
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8088,
            webhook_secret: None,
            allow_public_bind: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file. `~` and `$VARS` are expanded.
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.into(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(self.db_path.trim())
            .with_context(|| format!("failed to expand storage.db_path '{}'", self.db_path))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TeamworkConfig {
    /// Site URL, e.g. `https://example.teamwork.com`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Posted on every addressed event; also the loop-guard marker.
    pub ack_message: String,
    /// Teamwork user the relay posts as. Events authored by it are skipped.
    pub bot_user_id: Option<i64>,
    pub timeout_secs: u64,
}

impl Default for TeamworkConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            ack_message: DEFAULT_ACK_MESSAGE.into(),
            bot_user_id: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MentionConfig {
    pub triggers: Vec<String>,
}

impl Default for MentionConfig {
    fn default() -> Self {
        Self {
            triggers: DEFAULT_TRIGGERS.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    pub base_url: String,
    pub action_path: String,
    /// Sent as `X-API-Key`.
    pub api_key: Option<String>,
    pub project_id: i64,
    pub project_name: String,
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            action_path: DEFAULT_ACTION_PATH.into(),
            api_key: None,
            project_id: DEFAULT_PROJECT_ID,
            project_name: DEFAULT_PROJECT_NAME.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Default config location: `$CONFIG_DIR/mention-relay/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mention-relay").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `--config`, then `MENTION_RELAY_CONFIG`, then the default
    /// location. A missing file yields defaults. Environment overrides are
    /// applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env_value(CONFIG_ENV).map(PathBuf::from))
            .or_else(Self::default_path)
            .unwrap_or_else(|| PathBuf::from("config.toml"));

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        } else {
            if explicit.is_some() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.config_path = path;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML, warning about keys that are not part of the schema.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let value: toml::Value = toml::from_str(contents).context("invalid TOML")?;
        let mut unknown = Vec::new();
        let config: Config = serde_ignored::deserialize(value, |path| unknown.push(path.to_string()))
            .context("config does not match schema")?;
        for key in &unknown {
            tracing::warn!(key = %key, "ignoring unknown config key");
        }
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(env_value);
    }

    /// Apply overrides from an arbitrary lookup. Blank values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MENTION_RELAY_TEAMWORK_URL") {
            self.teamwork.base_url = url;
        }
        if let Some(key) = lookup("MENTION_RELAY_TEAMWORK_API_KEY") {
            self.teamwork.api_key = Some(key);
        }
        if let Some(url) = lookup("MENTION_RELAY_RELAY_URL") {
            self.relay.base_url = url;
            self.relay.enabled = true;
        }
        if let Some(key) = lookup("MENTION_RELAY_RELAY_API_KEY") {
            self.relay.api_key = Some(key);
        }
        if let Some(secret) = lookup("MENTION_RELAY_WEBHOOK_SECRET") {
            self.gateway.webhook_secret = Some(secret);
        }
        if let Some(path) = lookup("MENTION_RELAY_DB_PATH") {
            self.storage.db_path = path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        for (section, value) in [
            ("teamwork", self.teamwork.timeout_secs),
            ("relay", self.relay.timeout_secs),
        ] {
            if value == 0 || value > 120 {
                return Err(ConfigError::Timeout { section, value });
            }
        }
        if self.relay.enabled && self.relay.base_url.trim().is_empty() {
            return Err(ConfigError::RelayWithoutUrl);
        }
        if self.mention.triggers.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::NoTriggers);
        }
        if self.teamwork.ack_message.trim().is_empty() {
            return Err(ConfigError::EmptyAck);
        }
        Ok(())
    }

    /// Worst-case time one webhook spends on outbound calls. A message reply
    /// runs the parent lookup, the acknowledgement, the relay call and the
    /// answer post back to back, each bounded by its client timeout.
    pub fn outbound_budget(&self) -> Duration {
        let teamwork = self.teamwork.timeout_secs;
        let secs = if self.relay.enabled {
            3 * teamwork + self.relay.timeout_secs
        } else {
            2 * teamwork
        };
        Duration::from_secs(secs)
    }

    /// Copy with API keys and the webhook secret masked, for display.
    pub fn redacted(&self) -> Self {
        fn mask(value: &Option<String>) -> Option<String> {
            value.as_ref().map(|_| "***".to_string())
        }
        let mut copy = self.clone();
        copy.gateway.webhook_secret = mask(&self.gateway.webhook_secret);
        copy.teamwork.api_key = mask(&self.teamwork.api_key);
        copy.relay.api_key = mask(&self.relay.api_key);
        copy
    }

    /// JSON schema of the config file.
    pub fn json_schema() -> Result<String> {
        serde_json::to_string_pretty(&schemars::schema_for!(Config))
            .context("failed to render config schema")
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
