//! # Probe Server Configuration
//!
//! Settings for the health and metrics listener.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::time::Duration;

/// Health and metrics listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port serving `/healthz`, `/readyz` and `/metrics`
    pub metrics_port: u16,
    /// Startup fails if the listener is not bound within this many seconds
    pub startup_timeout_secs: u64,
    /// How often startup checks whether the listener is bound (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", defaults.metrics_port),
            startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                defaults.startup_timeout_secs,
            ),
            // A zero interval would spin the startup wait
            poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                defaults.poll_interval_ms,
            )
            .max(1),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
