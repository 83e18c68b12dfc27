//! Configuration for the mood feed client
//!
//! Loaded from a TOML file. Only `[endpoint]` is required; every other section
//! falls back to the defaults the channel and adapter use.

use crate::adapter::EndpointConfig;
use crate::protocol::{validate_subject_id, IdentityError};
use crate::transport::channel::{ChannelConfig, HeartbeatConfig, ReconnectConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `[session].subject_id`
pub const SUBJECT_ID_ENV: &str = "MOODFEED_SUBJECT_ID";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    pub endpoint: EndpointSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub heartbeat: HeartbeatSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub adapter: AdapterSection,
}

/// Where the real-time endpoint lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointSection {
    /// API origin; may carry an `http(s)://` prefix
    pub api_origin: Option<String>,
    /// Host the dashboard is served from, used when `api_origin` is unset
    #[serde(default = "default_page_host")]
    pub page_host: String,
    /// Connect with `wss`
    #[serde(default)]
    pub secure: bool,
}

fn default_page_host() -> String {
    "localhost:8000".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Subject whose feed to follow
    pub subject_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatSection {
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_probe_interval() -> u64 {
    30
}

fn default_check_interval() -> u64 {
    10
}

fn default_stale_after() -> u64 {
    45
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval(),
            check_interval_secs: default_check_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_base_interval")]
    pub base_interval_ms: u64,
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Consecutive attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Ignore `max_attempts` and retry forever
    #[serde(default)]
    pub retry_forever: bool,
}

fn default_base_interval() -> u64 {
    3000
}

fn default_growth_factor() -> f64 {
    1.5
}

fn default_max_delay() -> u64 {
    30000
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval(),
            growth_factor: default_growth_factor(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
            retry_forever: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterSection {
    /// Delay of the adapter's own reconnect timer
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_retry_delay() -> u64 {
    3000
}

impl Default for AdapterSection {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid subject id: {0}")]
    InvalidSubjectId(#[from] IdentityError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FeedConfig {
    /// Load, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without validation or overrides
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Configuration with only an endpoint host set
    pub fn for_host(page_host: impl Into<String>, secure: bool) -> Self {
        Self {
            endpoint: EndpointSection {
                api_origin: None,
                page_host: page_host.into(),
                secure,
            },
            session: SessionSection::default(),
            connection: ConnectionSection::default(),
            heartbeat: HeartbeatSection::default(),
            reconnect: ReconnectSection::default(),
            adapter: AdapterSection::default(),
        }
    }

    /// Apply overrides using `lookup` to read variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(subject_id) = lookup(SUBJECT_ID_ENV).filter(|id| !id.trim().is_empty()) {
            self.session.subject_id = Some(subject_id.trim().to_string());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(subject_id) = &self.session.subject_id {
            validate_subject_id(subject_id)?;
        }

        if self.endpoint.page_host.trim().is_empty() && self.endpoint.api_origin.is_none() {
            return Err(ConfigError::InvalidConfig(
                "[endpoint] needs page_host or api_origin".to_string(),
            ));
        }

        if self.connection.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.adapter.retry_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry_delay_ms must be greater than 0".to_string(),
            ));
        }

        self.heartbeat_config()
            .validate()
            .map_err(ConfigError::InvalidConfig)?;
        self.reconnect_config()
            .validate()
            .map_err(ConfigError::InvalidConfig)?;

        Ok(())
    }

    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            probe_interval: Duration::from_secs(self.heartbeat.probe_interval_secs),
            check_interval: Duration::from_secs(self.heartbeat.check_interval_secs),
            stale_after: Duration::from_secs(self.heartbeat.stale_after_secs),
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            base_interval: Duration::from_millis(self.reconnect.base_interval_ms),
            growth_factor: self.reconnect.growth_factor,
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_attempts: if self.reconnect.retry_forever {
                None
            } else {
                Some(self.reconnect.max_attempts)
            },
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            connect_timeout: Duration::from_secs(self.connection.connect_timeout_secs),
            heartbeat: self.heartbeat_config(),
            reconnect: self.reconnect_config(),
        }
    }

    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig {
            api_origin: self.endpoint.api_origin.clone(),
            page_host: self.endpoint.page_host.clone(),
            secure: self.endpoint.secure,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.adapter.retry_delay_ms)
    }

    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[endpoint]
page_host = "localhost:8000"

[session]
subject_id = "user-42"
"#;
        Self::parse(toml_content).expect("Test config should parse")
    }
}
