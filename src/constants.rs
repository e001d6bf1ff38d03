//! # Constants
//!
//! Default values shared by configuration, the runtime and the HTTP server.

/// Default field manager name recorded in `managedFields`
pub const DEFAULT_FIELD_MANAGER: &str = "reconcile-controller";

/// Default number of reconcile workers
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default full resync interval (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Base delay of the per-key exponential backoff (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// Cap of the per-key exponential backoff (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Requeue delay after a fatal error (seconds)
pub const DEFAULT_FATAL_REQUEUE_SECS: u64 = 900;

/// Longest requeue delay while waiting on a dependency or dependents (seconds)
pub const DEFAULT_DEPENDENCY_REQUEUE_SECS: u64 = 5;

/// Default HTTP port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// How often to poll for HTTP server readiness during startup (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Capacity of the in-memory store's event broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Upper bound on Deployment replicas accepted by validation
pub const MAX_REPLICAS: u32 = 1000;

/// Maximum length of a DNS-1123 label
pub const MAX_NAME_LENGTH: usize = 63;
