//! # Reconcile Controller
//!
//! Runs the control loop over an in-memory store seeded from a JSON manifest,
//! serving `/healthz`, `/readyz` and `/metrics` until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=reconcile_controller=debug reconcile-controller --manifest voting-app.json
//! ```

use anyhow::Result;
use clap::Parser;
use reconcile_controller::cli::Cli;
use reconcile_controller::runtime::initialization::initialize;
use reconcile_controller::runtime::watch_loop::Controller;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let init_result = initialize(&cli).await?;

    let controller = Controller::new(
        init_result.store,
        init_result.controller_config,
        init_result.server_state,
    );

    controller
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received interrupt"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        })
        .await
}
