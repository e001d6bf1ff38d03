//! # Reconciler Types
//!
//! Shared context, the error taxonomy that drives requeue policy, and the
//! outcome of a single reconcile pass.

use crate::config::ControllerConfig;
use crate::controller::executor::{Action, ActionExecutor};
use crate::resource::validation::ValidationError;
use crate::resource::ObjectKey;
use crate::store::{ObjectStore, StoreError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Context shared by every reconcile worker
pub struct Reconciler {
    pub store: Arc<dyn ObjectStore>,
    pub executor: ActionExecutor,
    pub config: ControllerConfig,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("executor", &self.executor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(store: Arc<dyn ObjectStore>, config: ControllerConfig) -> Self {
        let executor = ActionExecutor::new(Arc::clone(&store), config.field_manager.clone());
        Self {
            store,
            executor,
            config,
        }
    }
}

/// Reconcile failure, classified by how the key should be retried
#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    /// Store outage or timeout. Retried with backoff; conditions are left alone.
    #[error("transient failure: {0}")]
    Transient(String),
    /// A version conflict persisted after the executor's retry
    #[error("version conflict on {key} persisted after retry")]
    Conflict { key: ObjectKey },
    /// Desired state can never be realised as written. Not retried until it changes.
    #[error("invalid desired state: {0}")]
    Validation(#[from] ValidationError),
    /// A broken invariant. Logged loudly and retried on a long interval.
    #[error("invariant violated: {0}")]
    Fatal(String),
}

impl ReconcilerError {
    /// Metrics and log label
    pub fn class(&self) -> &'static str {
        match self {
            ReconcilerError::Transient(_) => "transient",
            ReconcilerError::Conflict { .. } => "conflict",
            ReconcilerError::Validation(_) => "validation",
            ReconcilerError::Fatal(_) => "fatal",
        }
    }

    /// Retried with per-key exponential backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcilerError::Transient(_) | ReconcilerError::Conflict { .. }
        )
    }
}

impl From<StoreError> for ReconcilerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(message) => ReconcilerError::Transient(message),
            StoreError::Conflict { key, .. } => ReconcilerError::Conflict { key },
        }
    }
}

/// Where a resource stands after a successful pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// Observed state matches the current generation and all conditions are healthy
    Converged,
    /// Own fields applied; these referenced resources are missing or not ready
    WaitingForDependencies(Vec<ObjectKey>),
    /// Desired state deleted; these resources still reference this one
    WaitingForDependents(Vec<ObjectKey>),
    /// Desired state deleted and observed state removed
    Finalized,
    /// Neither desired nor observed state exists
    Absent,
}

impl ReconcileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileStatus::Converged => "converged",
            ReconcileStatus::WaitingForDependencies(_) => "waiting-for-dependencies",
            ReconcileStatus::WaitingForDependents(_) => "waiting-for-dependents",
            ReconcileStatus::Finalized => "finalized",
            ReconcileStatus::Absent => "absent",
        }
    }
}

/// Result of one successful reconcile pass
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub status: ReconcileStatus,
    /// Actions that changed the store during this pass
    pub actions: Vec<Action>,
    /// Reconcile the key again after this delay even without new events
    ///
    /// For a waiting status this is the cap on its backoff rather than a fixed delay.
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    pub fn new(status: ReconcileStatus) -> Self {
        Self {
            status,
            actions: Vec::new(),
            requeue_after: None,
        }
    }

    #[must_use]
    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    #[must_use]
    pub fn requeue_after(mut self, delay: Duration) -> Self {
        self.requeue_after = Some(delay);
        self
    }

    /// The pass changed nothing in the store's owned fields
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}
