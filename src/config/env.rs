use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ServerConfig};

/// Non-empty environment value.
fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Parsed environment value, or `None` when unset.
fn env_parse<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidEnv {
                name,
                reason: e.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

/// Build a configuration from the process environment on top of defaults.
pub(super) fn load() -> Result<ServerConfig, ConfigError> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_string("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse("PORT")? {
        config.port = port;
    }

    config.azure_resource = env_string("AZURE_RESOURCE");
    if let Some(deployment) = env_string("DEPLOYMENT_NAME") {
        config.deployment_name = deployment;
    }
    config.upstream_url = env_string("UPSTREAM_URL");
    config.upstream_api_key = env_string("AZURE_OPEN_API_KEY");
    if let Some(timeout) = env_parse("UPSTREAM_CONNECT_TIMEOUT_SECONDS")? {
        config.upstream_connect_timeout_secs = timeout;
    }

    if let Some(timeout) = env_parse("CLIENT_POLL_TIMEOUT_MS")? {
        config.client_poll_timeout_ms = timeout;
    }
    if let Some(backoff) = env_parse("CLIENT_IDLE_BACKOFF_MS")? {
        config.client_idle_backoff_ms = backoff;
    }

    if let Some(dir) = env_string("LATENCY_LOG_DIR") {
        config.latency_log_dir = PathBuf::from(dir);
    }
    if let Some(tail) = env_parse("LATENCY_STATS_TAIL")? {
        config.latency_stats_tail = tail;
    }

    config.cors_allowed_origins = env_string("CORS_ALLOWED_ORIGINS");

    Ok(config)
}
