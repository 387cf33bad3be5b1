//! Server configuration
//!
//! Everything comes from `OFFERSYNC_*` environment variables with defaults
//! suitable for development. The JWT secret falls back to a well-known dev
//! value with a loud warning; production deployments must set their own.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::server::RouterConfig;

const DEV_SECRET: &str = "offersync-dev-secret-do-not-use-in-production-0000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the HTTP/WS listener binds to
    pub bind_addr: SocketAddr,
    /// Shared secret for bearer-token validation
    pub jwt_secret: String,
    /// Router flush cadence
    pub flush_interval: Duration,
    /// Queue length forcing an early router flush
    pub max_batch: usize,
    /// Idle time after which a session is proactively terminated
    pub idle_timeout: Duration,
    /// Cadence of the liveness sweep
    pub sweep_interval: Duration,
    /// Inbound messages allowed per user per window
    pub rate_capacity: usize,
    /// Rate-limit window length
    pub rate_window: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3030".parse().unwrap(),
            jwt_secret: DEV_SECRET.to_string(),
            flush_interval: Duration::from_secs(1),
            max_batch: 256,
            idle_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(30),
            rate_capacity: 60,
            rate_window: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Load from `OFFERSYNC_*` environment variables
    ///
    /// - `OFFERSYNC_BIND`: listener address (default `0.0.0.0:3030`)
    /// - `OFFERSYNC_JWT_SECRET`: bearer signing secret (min 32 chars)
    /// - `OFFERSYNC_FLUSH_INTERVAL_MS`, `OFFERSYNC_MAX_BATCH`
    /// - `OFFERSYNC_IDLE_TIMEOUT_SECS`, `OFFERSYNC_SWEEP_INTERVAL_SECS`
    /// - `OFFERSYNC_RATE_CAPACITY`, `OFFERSYNC_RATE_WINDOW_SECS`
    pub fn from_env() -> SyncResult<Self> {
        let mut config = Self::default();

        if let Ok(bind) = std::env::var("OFFERSYNC_BIND") {
            config.bind_addr = bind
                .parse()
                .map_err(|e| SyncError::Config(format!("OFFERSYNC_BIND: {}", e)))?;
        }

        match std::env::var("OFFERSYNC_JWT_SECRET") {
            Ok(secret) if secret.len() >= 32 => config.jwt_secret = secret,
            Ok(_) => {
                return Err(SyncError::Config(
                    "OFFERSYNC_JWT_SECRET must be at least 32 characters".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    target: "offersync::config",
                    "OFFERSYNC_JWT_SECRET not set; using development secret"
                );
            }
        }

        if let Some(ms) = env_u64("OFFERSYNC_FLUSH_INTERVAL_MS")? {
            config.flush_interval = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("OFFERSYNC_MAX_BATCH")? {
            config.max_batch = n as usize;
        }
        if let Some(secs) = env_u64("OFFERSYNC_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("OFFERSYNC_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("OFFERSYNC_RATE_CAPACITY")? {
            config.rate_capacity = n as usize;
        }
        if let Some(secs) = env_u64("OFFERSYNC_RATE_WINDOW_SECS")? {
            config.rate_window = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn router(&self) -> RouterConfig {
        RouterConfig {
            flush_interval: self.flush_interval,
            max_batch: self.max_batch,
        }
    }
}

fn env_u64(name: &str) -> SyncResult<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| SyncError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}
