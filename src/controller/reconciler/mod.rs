//! # Reconciler
//!
//! Drives the observed state of one resource toward its desired state.
//!
//! Each pass re-reads both states from the store (queued keys carry no data),
//! diffs only the fields this controller owns, executes the resulting actions
//! and records the outcome as conditions. A pass over a converged resource
//! plans and writes nothing.
//!
//! ## Sub-modules
//!
//! - `types` - Reconciler context, error taxonomy and pass outcome
//! - `reconcile` - The reconcile entry point
//! - `plan` - Owned-field diff to action list
//! - `dependencies` - Referenced resources that are not yet ready
//! - `finalize` - Deletion once desired state is gone
//! - `status` - Condition and `observedGeneration` updates

mod dependencies;
mod finalize;
mod plan;
mod reconcile;
mod status;
mod types;

pub use dependencies::{find_dependents, unready_dependencies};
pub use plan::plan_actions;
pub use reconcile::reconcile;
pub use types::{ReconcileOutcome, ReconcileStatus, Reconciler, ReconcilerError};
