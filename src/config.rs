//! Service configuration.
//!
//! Lives at `~/.frontdesk/config.json`, camelCase on disk. Every provider
//! section is optional; a missing section disables that integration and
//! the corresponding endpoints answer with a validation error instead of
//! panicking on absent credentials.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub telnyx: TelnyxConfig,
    #[serde(default)]
    pub resend: ResendConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelnyxConfig {
    pub api_key: Option<String>,
    /// Default sending number when an outbound request omits `from`.
    pub default_from: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendConfig {
    pub api_key: Option<String>,
    pub from_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    /// Where Checkout redirects after setup completes/cancels.
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmConfig {
    pub api_key: Option<String>,
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Base URL of the hosted auth service used for bearer validation.
    pub base_url: Option<String>,
    /// Static key for server-to-server callers (x-api-key header).
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Minimum minutes between provider sync cycles.
    #[serde(default = "default_sync_interval")]
    pub interval_minutes: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_sync_interval() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_sync_interval(),
            enabled: true,
        }
    }
}

/// Get the canonical config file path (~/.frontdesk/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".frontdesk").join("config.json"))
}

/// Load configuration from disk. A missing file yields the default
/// config (all integrations disabled) rather than an error.
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(Config::default());
    }
    let content =
        fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}
