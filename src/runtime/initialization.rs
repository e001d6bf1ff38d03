//! # Initialization
//!
//! Controller startup: tracing, metrics, HTTP server, store setup and manifest
//! seeding.

use crate::cli::{load_manifest, Cli};
use crate::config::{self, ControllerConfig, ServerConfig};
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use crate::resource::DesiredState;
use crate::store::InMemoryStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Components the watch loop needs
#[derive(Debug)]
pub struct InitializationResult {
    pub store: Arc<InMemoryStore>,
    pub controller_config: ControllerConfig,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime
///
/// This function handles:
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Store creation and manifest seeding
pub async fn initialize(cli: &Cli) -> Result<InitializationResult> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting reconcile controller");

    let (mut controller_config, mut server_config) = config::load_config();
    cli.apply_overrides(&mut controller_config, &mut server_config);
    info!(
        workers = controller_config.worker_count,
        resync_secs = controller_config.resync_interval_secs,
        field_manager = %controller_config.field_manager,
        metrics_port = server_config.metrics_port,
        "Configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });

    // Poll server startup before touching the store
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &cli.manifest {
        let desired = load_manifest(path)?;
        let applied = seed_store(&store, desired)?;
        info!(manifest = %path.display(), resources = applied, "Manifest applied");
    } else {
        warn!("No manifest given; the controller starts with an empty store");
    }

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        store,
        controller_config,
        server_state,
    })
}

fn init_tracing() {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reconcile_controller=info".into()),
        )
        .try_init()
    {
        // Already set, e.g. by a test harness
        warn!("Tracing subscriber init returned error: {}", e);
    }
}

/// Apply every desired state to the store
///
/// Invalid entries are still applied: the reconciler reports them through a
/// `Stalled` condition rather than refusing startup.
pub fn seed_store(store: &InMemoryStore, desired: Vec<DesiredState>) -> Result<usize> {
    let count = desired.len();
    for state in desired {
        let key = state.key();
        store
            .apply(state)
            .with_context(|| format!("Failed to apply {key}"))?;
    }
    Ok(count)
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        // Check if server task crashed
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parse_manifest;

    #[test]
    fn test_seed_store_applies_manifest() {
        let store = InMemoryStore::new();
        let desired = parse_manifest(
            r#"[{"name": "settings", "namespace": "vote",
                 "spec": {"kind": "ConfigMap", "data": {"LOG_LEVEL": "info"}}}]"#,
        )
        .unwrap();
        let key = desired[0].key();
        assert_eq!(seed_store(&store, desired).unwrap(), 1);
        assert_eq!(store.desired(&key).unwrap().generation, 1);
    }
}
