//! Configuration schema for Mynofi
//!
//! Configuration is stored at `~/.config/mynofi/config.toml`

use super::layout::StateLayout;
use crate::error::{MynofiError, MynofiResult};
use serde::{Deserialize, Serialize};

/// Environment variable overriding `service.url`
pub const URL_ENV: &str = "MYNOFI_URL";

/// Environment variable overriding `service.anon_key`
pub const ANON_KEY_ENV: &str = "MYNOFI_ANON_KEY";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Remote service endpoint
    pub service: ServiceConfig,

    /// Realtime socket tuning
    pub realtime: RealtimeConfig,

    /// Session handling
    pub auth: AuthConfig,

    /// Automatic reconnect policy
    pub retry: RetryConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable audit logging
    pub audit_log: bool,

    /// Log every connection snapshot and the resolved endpoint
    pub diagnostics: bool,

    /// Root for tokens and the audit log; empty means the platform state dir
    pub state_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            audit_log: true,
            diagnostics: false,
            state_dir: String::new(),
        }
    }
}

/// Remote service endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the hosted project, e.g. `https://<ref>.supabase.co`
    pub url: String,

    /// Public (anon) API key
    pub anon_key: String,

    /// Value of the `x-application-name` header
    pub application_name: String,

    /// Timeout for REST round trips in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            application_name: "mynofi-cli".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Realtime socket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Open the realtime socket at all
    pub enabled: bool,

    /// Cap on outgoing channel frames per second
    pub events_per_second: u32,

    /// Heartbeat interval in milliseconds
    pub heartbeat_ms: u64,

    /// Socket connect timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            events_per_second: 10,
            heartbeat_ms: 30_000,
            timeout_ms: 20_000,
        }
    }
}

/// Session handling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Keep the session token on disk between runs
    pub persist_session: bool,

    /// Refresh expired access tokens with the refresh token
    pub auto_refresh_token: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            persist_session: true,
            auto_refresh_token: true,
        }
    }
}

/// Reconnect policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Automatic reconnect attempts before giving up
    pub max_retries: u32,

    /// Delay before the first attempt in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Pass-through connection constants handed to the remote backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub url: String,
    pub key: String,
    pub events_per_second: u32,
    pub heartbeat_ms: u64,
    pub timeout_ms: u64,
}

impl Config {
    /// Apply `MYNOFI_URL` / `MYNOFI_ANON_KEY` on top of the file values
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(URL_ENV) {
            if !url.trim().is_empty() {
                self.service.url = url;
            }
        }
        if let Ok(key) = std::env::var(ANON_KEY_ENV) {
            if !key.trim().is_empty() {
                self.service.anon_key = key;
            }
        }
    }

    pub fn state(&self) -> StateLayout {
        match self.general.state_dir.trim() {
            "" => StateLayout::platform(),
            dir => StateLayout::at(dir),
        }
    }

    /// Resolve and validate the settings needed to reach the service
    pub fn connection_settings(&self) -> MynofiResult<ConnectionSettings> {
        let url = self.service.url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(MynofiError::MissingServiceUrl);
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(MynofiError::InvalidServiceUrl {
                url: url.to_string(),
                reason: "expected an http:// or https:// URL".to_string(),
            });
        }
        let key = self.service.anon_key.trim();
        if key.is_empty() {
            return Err(MynofiError::MissingApiKey);
        }

        Ok(ConnectionSettings {
            url: url.to_string(),
            key: key.to_string(),
            events_per_second: self.realtime.events_per_second.max(1),
            heartbeat_ms: self.realtime.heartbeat_ms,
            timeout_ms: self.realtime.timeout_ms,
        })
    }
}
