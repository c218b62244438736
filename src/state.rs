use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigError, ServerConfig};
use crate::core::bridge::{RealtimeUpstream, UpstreamConnector};
use crate::core::latency::LatencyLog;
use crate::core::relay::{RelayCoordinator, SessionRegistry};

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open latency log: {0}")]
    LatencyLog(#[from] std::io::Error),
}

/// Shared application state.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: SessionRegistry,
    pub latency_log: Arc<LatencyLog>,
    pub relay: RelayCoordinator,
    pub upstream: Arc<dyn UpstreamConnector>,
}

impl AppState {
    /// Build state from configuration: opens today's latency log and the
    /// upstream connector described by `config`.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let upstream = RealtimeUpstream::new(config.upstream_config()?);
        let latency_log = Arc::new(LatencyLog::open_daily(&config.latency_log_dir)?);
        Ok(Self::with_parts(config, latency_log, Arc::new(upstream)))
    }

    /// Build state around an existing latency log and connector.
    pub fn with_parts(
        config: ServerConfig,
        latency_log: Arc<LatencyLog>,
        upstream: Arc<dyn UpstreamConnector>,
    ) -> Arc<Self> {
        let registry = SessionRegistry::new();
        let relay = RelayCoordinator::new(
            registry.clone(),
            latency_log.clone(),
            config.relay_settings(),
        );

        Arc::new(Self {
            config,
            registry,
            latency_log,
            relay,
            upstream,
        })
    }
}
