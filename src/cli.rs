//! # Command Line
//!
//! Flags for the controller binary. Every flag overrides the matching
//! environment variable.
//!
//! ## Usage
//!
//! ```bash
//! # Reconcile the resources in a manifest with 8 workers
//! reconcile-controller --manifest voting-app.json --workers 8
//! ```

use crate::config::{ControllerConfig, ServerConfig};
use crate::resource::DesiredState;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "reconcile-controller")]
#[command(about = "Declarative reconciliation controller", long_about = None)]
pub struct Cli {
    /// JSON file holding an array of desired states to apply at startup
    #[arg(short, long, env = "MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Number of concurrent reconcile workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Port for the health and metrics server
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

impl Cli {
    /// Layer flags on top of environment configuration
    pub fn apply_overrides(&self, controller: &mut ControllerConfig, server: &mut ServerConfig) {
        if let Some(workers) = self.workers {
            controller.worker_count = workers.max(1);
        }
        if let Some(port) = self.metrics_port {
            server.metrics_port = port;
        }
    }
}

/// Parse a manifest: a JSON array of desired states
pub fn parse_manifest(json: &str) -> Result<Vec<DesiredState>> {
    serde_json::from_str(json).context("Manifest must be a JSON array of desired states")
}

pub fn load_manifest(path: &Path) -> Result<Vec<DesiredState>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    parse_manifest(&contents).with_context(|| format!("Invalid manifest {}", path.display()))
}
