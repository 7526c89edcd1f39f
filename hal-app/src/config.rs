//! HAL bridge configuration loader.
//!
//! Built once at startup and passed by reference; components never read the
//! environment themselves.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HalConfig {
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    /// Our own WhatsApp address, e.g. `whatsapp:+14155238886`.
    #[serde(default)]
    pub whatsapp_from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_opencode_path")]
    pub opencode_path: String,
    /// Extra arguments placed before `run`.
    #[serde(default)]
    pub launcher_args: Vec<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default = "default_agent_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Literal prefix that marks a token as a conversation handle rather than an alias.
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
    /// opencode's storage root; sessions live at `<storage_dir>/session/*/<id>.json`.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
}

fn default_opencode_path() -> String {
    "opencode".to_string()
}

fn default_model() -> String {
    "openai/gpt-5.2".to_string()
}

fn default_variant() -> String {
    "medium".to_string()
}

fn default_agent_timeout_seconds() -> u64 {
    120
}

fn default_session_prefix() -> String {
    "ses_".to_string()
}

fn default_storage_dir() -> String {
    "~/.local/share/opencode/storage".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            opencode_path: default_opencode_path(),
            launcher_args: Vec::new(),
            model: default_model(),
            variant: default_variant(),
            timeout_seconds: default_agent_timeout_seconds(),
            session_prefix: default_session_prefix(),
            storage_dir: default_storage_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_state_path")]
    pub state_path: String,
    #[serde(default = "default_audit_path")]
    pub audit_path: String,
    #[serde(default = "default_identity_path")]
    pub identity_path: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How far behind the watermark each poll looks, to absorb transport clock skew.
    #[serde(default = "default_lookback_seconds")]
    pub lookback_seconds: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Pause after each outbound chunk.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

fn default_state_path() -> String {
    "~/.hal/agent_state.json".to_string()
}

fn default_audit_path() -> String {
    "~/.hal/trail.jsonl".to_string()
}

fn default_identity_path() -> String {
    "~/.hal/HAL_IDENTITY.md".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_lookback_seconds() -> u64 {
    300
}

fn default_page_size() -> usize {
    50
}

fn default_chunk_delay_ms() -> u64 {
    1000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            audit_path: default_audit_path(),
            identity_path: default_identity_path(),
            poll_interval_ms: default_poll_interval_ms(),
            lookback_seconds: default_lookback_seconds(),
            page_size: default_page_size(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lookback_seconds.min(i64::MAX as u64) as i64)
    }
}

impl HalConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::load_with_path(path).await?.0)
    }

    /// Read the TOML file (a missing file means "all defaults"), then apply
    /// environment overrides and validate.
    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::from_toml_str(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    config_path = %path.display(),
                    "config file not found; using defaults and environment"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!("read config {}: {e}", path.display()));
            }
        };

        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok((cfg, path))
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("TWILIO_ACCOUNT_SID") {
            self.twilio.account_sid = v;
        }
        if let Some(v) = non_empty("TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = v;
        }
        if let Some(v) = non_empty("TWILIO_WHATSAPP_FROM") {
            self.twilio.whatsapp_from = v;
        }
        if let Some(v) = non_empty("HAL_MODEL") {
            self.agent.model = v;
        }
        if let Some(v) = non_empty("HAL_OPENCODE_PATH") {
            self.agent.opencode_path = v;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.twilio.account_sid.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "twilio.account_sid is required (or set TWILIO_ACCOUNT_SID)"
            ));
        }
        if self.twilio.auth_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "twilio.auth_token is required (or set TWILIO_AUTH_TOKEN)"
            ));
        }
        if self.twilio.whatsapp_from.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "twilio.whatsapp_from is required (or set TWILIO_WHATSAPP_FROM)"
            ));
        }
        if self.agent.model.trim().is_empty() {
            return Err(anyhow::anyhow!("agent.model is required"));
        }
        if self.agent.session_prefix.is_empty() {
            return Err(anyhow::anyhow!("agent.session_prefix must not be empty"));
        }
        if self.agent.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("agent.timeout_seconds must be > 0"));
        }
        if self.bridge.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("bridge.poll_interval_ms must be > 0"));
        }
        if self.bridge.page_size == 0 {
            return Err(anyhow::anyhow!("bridge.page_size must be > 0"));
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_seconds)
    }

    pub fn state_path(&self) -> anyhow::Result<PathBuf> {
        expand_home(&self.bridge.state_path)
    }

    pub fn audit_path(&self) -> anyhow::Result<PathBuf> {
        expand_home(&self.bridge.audit_path)
    }

    pub fn identity_path(&self) -> anyhow::Result<PathBuf> {
        expand_home(&self.bridge.identity_path)
    }

    pub fn agent_storage_dir(&self) -> anyhow::Result<PathBuf> {
        expand_home(&self.agent.storage_dir)
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(home_dir()?.join(".hal").join("config.toml"))
}

/// Load `config/twilio.env` and `.env` into the process environment when present.
pub fn load_env_files() {
    for path in [Path::new("config").join("twilio.env"), PathBuf::from(".env")] {
        match dotenvy::from_path(&path) {
            Ok(()) => tracing::info!(env_file = %path.display(), "loaded env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(env_file = %path.display(), %e, "failed to load env file"),
        }
    }
}

pub fn expand_home(raw: &str) -> anyhow::Result<PathBuf> {
    let raw = raw.trim();
    if raw == "~" {
        return home_dir();
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(PathBuf::from(raw))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("HOME is not set; cannot resolve ~ paths"))
}
