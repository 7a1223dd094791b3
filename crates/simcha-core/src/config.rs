//! Configuration loaded from a TOML file, with defaults for everything.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SimchaError;

/// Top-level simcha configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub simcha: AppConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL the personalized RSVP links point at, e.g.
    /// `https://our-wedding.web.app`.
    #[serde(default)]
    pub base_url: String,
    /// Invitation text with `{name}` and `{link}` placeholders.
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            base_url: String::new(),
            message_template: default_message_template(),
        }
    }
}

/// SMS gateway credentials (sms4free).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    /// Sender label shown to recipients.
    #[serde(default)]
    pub sender: String,
}

impl SmsConfig {
    /// All credentials present. Missing credentials disable the SMS feature
    /// up front; they never cause a crash or a network call.
    pub fn is_configured(&self) -> bool {
        !self.key.is_empty()
            && !self.user.is_empty()
            && !self.pass.is_empty()
            && !self.sender.is_empty()
    }
}

/// WhatsApp relay settings.
///
/// Session data is stored at `{data_dir}/whatsapp_session/`. Pairing is done
/// by scanning a QR code (like WhatsApp Web).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Lower bound of the anti-throttling pause after each successful send.
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,
    /// Upper bound (exclusive) of the anti-throttling pause.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

// --- Default value functions ---

fn default_data_dir() -> String {
    "~/.simcha".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_message_template() -> String {
    "היי {name}! הוזמנתם לחגוג איתנו 🎉 לאישור הגעה ולכל הפרטים: {link}".to_string()
}
fn default_true() -> bool {
    true
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_min_delay() -> u64 {
    3000
}
fn default_max_delay() -> u64 {
    8000
}

/// Expand `~` to the home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, SimchaError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| SimchaError::Config(format!("failed to read {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| SimchaError::Config(format!("failed to parse config: {e}")))
}
