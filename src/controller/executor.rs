//! # Action Executor
//!
//! Applies planned [`Action`]s to the object store.
//!
//! Every write is a read-modify-write guarded by the object's version token.
//! On a version conflict the executor re-reads and retries exactly once; a
//! second conflict is surfaced as [`ReconcilerError::Conflict`] and the key is
//! requeued with backoff. Every action is idempotent: applying it to a state
//! where it is already in effect writes nothing.

use crate::controller::diff::{self, FieldChange};
use crate::controller::reconciler::ReconcilerError;
use crate::observability;
use crate::resource::{ObjectKey, ObservedState};
use crate::store::{ObjectStore, StoreError, ABSENT_VERSION};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store attempts per write: the original plus one retry after a conflict
const WRITE_ATTEMPTS: u32 = 2;

fn note_conflict(key: &ObjectKey, attempt: u32) {
    observability::metrics::increment_conflicts();
    warn!(
        resource = %key,
        attempt,
        max_attempts = WRITE_ATTEMPTS,
        "Version conflict writing observed state"
    );
}

/// A single idempotent mutation of observed state
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Bring an empty observed state into existence
    Create { key: ObjectKey },
    /// Set (`Some`) or remove (`None`) one owned field
    Update {
        key: ObjectKey,
        path: String,
        value: Option<Value>,
    },
    /// Remove observed state entirely
    Delete { key: ObjectKey },
}

impl Action {
    pub fn key(&self) -> &ObjectKey {
        match self {
            Action::Create { key } | Action::Update { key, .. } | Action::Delete { key } => key,
        }
    }

    /// Metrics label
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Create { .. } => "create",
            Action::Update { .. } => "update",
            Action::Delete { .. } => "delete",
        }
    }

    /// Action for one field change on `key`
    pub fn from_change(key: &ObjectKey, change: FieldChange) -> Self {
        match change {
            FieldChange::Set { path, value } => Action::Update {
                key: key.clone(),
                path,
                value: Some(value),
            },
            FieldChange::Remove { path } => Action::Update {
                key: key.clone(),
                path,
                value: None,
            },
        }
    }

    fn to_change(&self) -> Option<FieldChange> {
        match self {
            Action::Update {
                path,
                value: Some(value),
                ..
            } => Some(FieldChange::Set {
                path: path.clone(),
                value: value.clone(),
            }),
            Action::Update {
                path, value: None, ..
            } => Some(FieldChange::Remove { path: path.clone() }),
            Action::Create { .. } | Action::Delete { .. } => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create { key } => write!(f, "create {key}"),
            Action::Update {
                key,
                path,
                value: Some(value),
            } => write!(f, "update {key} {path}={value}"),
            Action::Update {
                key, path, value: None,
            } => write!(f, "update {key} remove {path}"),
            Action::Delete { key } => write!(f, "delete {key}"),
        }
    }
}

/// Whether an execution wrote anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
}

/// Executes actions against an [`ObjectStore`] on behalf of one field manager
pub struct ActionExecutor {
    store: Arc<dyn ObjectStore>,
    field_manager: String,
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    pub fn new(store: Arc<dyn ObjectStore>, field_manager: impl Into<String>) -> Self {
        Self {
            store,
            field_manager: field_manager.into(),
        }
    }

    pub fn field_manager(&self) -> &str {
        &self.field_manager
    }

    /// Apply one action
    pub async fn execute(&self, action: &Action) -> Result<Applied, ReconcilerError> {
        let applied = match action {
            Action::Create { key } => self.create(key).await?,
            Action::Update { key, .. } => {
                let Some(change) = action.to_change() else {
                    return Ok(Applied::Unchanged);
                };
                let manager = self.field_manager.as_str();
                self.mutate_observed(key, |observed| {
                    diff::apply_change(observed, &change, manager)
                })
                .await?
            }
            Action::Delete { key } => self.delete(key).await?,
        };

        if applied == Applied::Changed {
            observability::metrics::increment_actions(action.verb());
            info!(action = %action, "action.applied");
        } else {
            debug!(action = %action, "Action already in effect");
        }
        Ok(applied)
    }

    /// Read-modify-write of the observed state of `key`
    ///
    /// `mutate` returns whether it changed anything; an unchanged state is not
    /// written. It may run twice if the first write conflicts.
    pub async fn mutate_observed<F>(
        &self,
        key: &ObjectKey,
        mut mutate: F,
    ) -> Result<Applied, ReconcilerError>
    where
        F: FnMut(&mut ObservedState) -> bool + Send,
    {
        for attempt in 1..=WRITE_ATTEMPTS {
            let current = self.store.get(key).await?;
            let Some(mut observed) = current.observed else {
                return Err(ReconcilerError::Transient(format!(
                    "observed state of {key} disappeared during reconcile"
                )));
            };
            if !mutate(&mut observed) {
                return Ok(Applied::Unchanged);
            }
            match self.store.put(observed, current.version).await {
                Ok(_) => return Ok(Applied::Changed),
                Err(StoreError::Conflict { .. }) if attempt < WRITE_ATTEMPTS => {
                    note_conflict(key, attempt);
                }
                Err(e) => {
                    if matches!(e, StoreError::Conflict { .. }) {
                        note_conflict(key, attempt);
                    }
                    return Err(e.into());
                }
            }
        }
        Err(ReconcilerError::Conflict { key: key.clone() })
    }

    async fn create(&self, key: &ObjectKey) -> Result<Applied, ReconcilerError> {
        for attempt in 1..=WRITE_ATTEMPTS {
            if self.store.get(key).await?.observed.is_some() {
                return Ok(Applied::Unchanged);
            }
            match self.store.put(ObservedState::new(key), ABSENT_VERSION).await {
                Ok(_) => return Ok(Applied::Changed),
                Err(StoreError::Conflict { .. }) if attempt < WRITE_ATTEMPTS => {
                    note_conflict(key, attempt);
                }
                Err(e) => {
                    if matches!(e, StoreError::Conflict { .. }) {
                        note_conflict(key, attempt);
                    }
                    return Err(e.into());
                }
            }
        }
        Err(ReconcilerError::Conflict { key: key.clone() })
    }

    async fn delete(&self, key: &ObjectKey) -> Result<Applied, ReconcilerError> {
        for attempt in 1..=WRITE_ATTEMPTS {
            let current = self.store.get(key).await?;
            if current.observed.is_none() {
                return Ok(Applied::Unchanged);
            }
            match self.store.delete_observed(key, current.version).await {
                Ok(()) => return Ok(Applied::Changed),
                Err(StoreError::Conflict { .. }) if attempt < WRITE_ATTEMPTS => {
                    note_conflict(key, attempt);
                }
                Err(e) => {
                    if matches!(e, StoreError::Conflict { .. }) {
                        note_conflict(key, attempt);
                    }
                    return Err(e.into());
                }
            }
        }
        Err(ReconcilerError::Conflict { key: key.clone() })
    }
}
