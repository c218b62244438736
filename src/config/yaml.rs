use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{ConfigError, ServerConfig};

/// YAML configuration file.
///
/// Every field is optional; present values override the environment.
///
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5000
///
/// upstream:
///   azure_resource: "my-resource"
///   deployment_name: "gpt-realtime"
///   url: "wss://my-resource.cognitiveservices.azure.com/openai/v1/realtime?model=gpt-realtime"
///   api_key: "your-api-key"
///   connect_timeout_seconds: 10
///
/// relay:
///   client_poll_timeout_ms: 100
///   client_idle_backoff_ms: 10
///
/// latency:
///   log_dir: "logs"
///   stats_tail: 100
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub upstream: Option<UpstreamYaml>,
    pub relay: Option<RelayYaml>,
    pub latency: Option<LatencyYaml>,
    pub security: Option<SecurityYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamYaml {
    pub azure_resource: Option<String>,
    pub deployment_name: Option<String>,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub client_poll_timeout_ms: Option<u64>,
    pub client_idle_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LatencyYaml {
    pub log_dir: Option<PathBuf>,
    pub stats_tail: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Overwrite `config` with every value present in this file.
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(server) = self.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
        }

        if let Some(upstream) = self.upstream {
            if upstream.azure_resource.is_some() {
                config.azure_resource = upstream.azure_resource;
            }
            if let Some(deployment) = upstream.deployment_name {
                config.deployment_name = deployment;
            }
            if upstream.url.is_some() {
                config.upstream_url = upstream.url;
            }
            if let Some(key) = upstream.api_key {
                if let Some(ref mut previous) = config.upstream_api_key {
                    zeroize::Zeroize::zeroize(previous);
                }
                config.upstream_api_key = Some(key);
            }
            if let Some(timeout) = upstream.connect_timeout_seconds {
                config.upstream_connect_timeout_secs = timeout;
            }
        }

        if let Some(relay) = self.relay {
            if let Some(timeout) = relay.client_poll_timeout_ms {
                config.client_poll_timeout_ms = timeout;
            }
            if let Some(backoff) = relay.client_idle_backoff_ms {
                config.client_idle_backoff_ms = backoff;
            }
        }

        if let Some(latency) = self.latency {
            if let Some(dir) = latency.log_dir {
                config.latency_log_dir = dir;
            }
            if let Some(tail) = latency.stats_tail {
                config.latency_stats_tail = tail;
            }
        }

        if let Some(security) = self.security {
            if security.cors_allowed_origins.is_some() {
                config.cors_allowed_origins = security.cors_allowed_origins;
            }
        }
    }
}
