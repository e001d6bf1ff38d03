//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text rendering
//! - `controller_metrics` - Reconciliations, actions, errors, requeues and health
//! - `queue_metrics` - Work queue depth, watch events and resyncs

pub mod controller_metrics;
pub mod queue_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use queue_metrics::*;
pub use registry::*;
