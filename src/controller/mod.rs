//! # Controller
//!
//! The control loop's moving parts: the work queue and its backoff, the owned
//! field diff, the action executor, the reconciler and the health/metrics server.

pub mod backoff;
pub mod diff;
pub mod executor;
pub mod queue;
pub mod reconciler;
pub mod server;
