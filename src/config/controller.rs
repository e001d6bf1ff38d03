//! # Reconcile Loop Configuration
//!
//! Worker pool, backoff and resync settings loaded from environment variables.

use super::env_var_or_default;
use std::time::Duration;

/// Reconcile loop configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers
    pub worker_count: usize,
    /// Interval between full resyncs (seconds)
    /// Every known key is re-enqueued, repairing any missed watch events
    pub resync_interval_secs: u64,
    /// First retry delay after a transient failure (milliseconds)
    /// Doubles with each consecutive failure of the same key
    pub backoff_base_ms: u64,
    /// Cap on the per-key retry delay (seconds)
    pub backoff_max_secs: u64,
    /// Requeue delay after a fatal error (seconds)
    pub fatal_requeue_secs: u64,
    /// Cap on the requeue delay while waiting on dependencies or dependents (seconds)
    /// Waits back off like transient errors up to this cap
    pub dependency_requeue_secs: u64,
    /// Manager name recorded for fields this controller owns
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            fatal_requeue_secs: DEFAULT_FATAL_REQUEUE_SECS,
            dependency_requeue_secs: DEFAULT_DEPENDENCY_REQUEUE_SECS,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            worker_count: env_var_or_default("WORKER_COUNT", DEFAULT_WORKER_COUNT).max(1),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            backoff_base_ms: env_var_or_default("BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            fatal_requeue_secs: env_var_or_default(
                "FATAL_REQUEUE_SECS",
                DEFAULT_FATAL_REQUEUE_SECS,
            ),
            dependency_requeue_secs: env_var_or_default(
                "DEPENDENCY_REQUEUE_SECS",
                DEFAULT_DEPENDENCY_REQUEUE_SECS,
            ),
            field_manager: env_var_or_default(
                "FIELD_MANAGER",
                DEFAULT_FIELD_MANAGER.to_string(),
            ),
        }
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    pub fn fatal_requeue(&self) -> Duration {
        Duration::from_secs(self.fatal_requeue_secs)
    }

    pub fn dependency_requeue(&self) -> Duration {
        Duration::from_secs(self.dependency_requeue_secs)
    }
}
