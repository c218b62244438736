//! Server configuration.
//!
//! Configuration comes from three layers. Priority, highest first:
//! 1. YAML file values (`--config`)
//! 2. Environment variables (actual ENV vars override `.env` values)
//! 3. `.env` file values, loaded in `main` before anything else
//! 4. Defaults
//!
//! # Example
//! ```rust,no_run
//! use realtime_voice_proxy::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//!
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::bridge::UpstreamConfig;
use crate::core::relay::RelaySettings;

mod env;
mod yaml;

pub use yaml::YamlConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DEPLOYMENT_NAME: &str = "gpt-realtime";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CLIENT_POLL_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_CLIENT_IDLE_BACKOFF_MS: u64 = 10;
pub const DEFAULT_LATENCY_LOG_DIR: &str = "logs";
pub const DEFAULT_LATENCY_STATS_TAIL: usize = 100;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Upstream endpoint not configured: set UPSTREAM_URL or AZURE_RESOURCE")]
    MissingUpstream,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Proxy server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Upstream realtime endpoint
    pub azure_resource: Option<String>,
    pub deployment_name: String,
    /// Explicit endpoint; wins over the URL derived from resource and deployment
    pub upstream_url: Option<String>,
    pub upstream_api_key: Option<String>,
    pub upstream_connect_timeout_secs: u64,

    // Relay timing
    pub client_poll_timeout_ms: u64,
    pub client_idle_backoff_ms: u64,

    // Latency log
    pub latency_log_dir: PathBuf,
    pub latency_stats_tail: usize,

    /// Comma-separated origins, or `*`. `None` means same-origin only.
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            azure_resource: None,
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            upstream_url: None,
            upstream_api_key: None,
            upstream_connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            client_poll_timeout_ms: DEFAULT_CLIENT_POLL_TIMEOUT_MS,
            client_idle_backoff_ms: DEFAULT_CLIENT_IDLE_BACKOFF_MS,
            latency_log_dir: PathBuf::from(DEFAULT_LATENCY_LOG_DIR),
            latency_stats_tail: DEFAULT_LATENCY_STATS_TAIL,
            cors_allowed_origins: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("azure_resource", &self.azure_resource)
            .field("deployment_name", &self.deployment_name)
            .field("upstream_url", &self.upstream_url)
            .field("upstream_api_key", &self.upstream_api_key.as_ref().map(|_| "<redacted>"))
            .field("upstream_connect_timeout_secs", &self.upstream_connect_timeout_secs)
            .field("client_poll_timeout_ms", &self.client_poll_timeout_ms)
            .field("client_idle_backoff_ms", &self.client_idle_backoff_ms)
            .field("latency_log_dir", &self.latency_log_dir)
            .field("latency_stats_tail", &self.latency_stats_tail)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

/// Zeroize the upstream credential when the config is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.upstream_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable numeric values are errors, not silently defaulted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Load environment configuration, then apply YAML overrides from `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = env::load()?;
        yaml_config.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Server address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_api_key(&self) -> bool {
        self.upstream_api_key
            .as_deref()
            .is_some_and(|key| !key.is_empty())
    }

    /// Upstream realtime endpoint.
    ///
    /// An explicit `upstream_url` wins; otherwise the Azure endpoint is
    /// derived from the resource and deployment names.
    pub fn upstream_endpoint(&self) -> Result<String, ConfigError> {
        if let Some(url) = self.upstream_url.as_deref().filter(|url| !url.is_empty()) {
            return Ok(url.to_string());
        }

        let resource = self
            .azure_resource
            .as_deref()
            .filter(|resource| !resource.is_empty())
            .ok_or(ConfigError::MissingUpstream)?;

        Ok(format!(
            "wss://{resource}.cognitiveservices.azure.com/openai/v1/realtime?model={}",
            self.deployment_name
        ))
    }

    /// Connection settings for the upstream connector.
    pub fn upstream_config(&self) -> Result<UpstreamConfig, ConfigError> {
        Ok(UpstreamConfig {
            url: self.upstream_endpoint()?,
            api_key: self.upstream_api_key.clone().unwrap_or_default(),
            connect_timeout: Duration::from_secs(self.upstream_connect_timeout_secs),
        })
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            client_poll_timeout: Duration::from_millis(self.client_poll_timeout_ms),
            client_idle_backoff: Duration::from_millis(self.client_idle_backoff_ms),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.client_poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "client_poll_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.upstream_connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upstream_connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.latency_stats_tail == 0 {
            return Err(ConfigError::Invalid(
                "latency_stats_tail must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
