//! # Finalization
//!
//! Runs once desired state is gone. Observed state is only removed after no
//! other resource references it; until then the key is requeued and the
//! blocking dependents are reported as a condition.
//!
//! The dependents check and the delete are not atomic: the delete's version
//! token guards only this key, so a dependent applied in between does not
//! stop it. That dependent then reports `WaitingForDependency` until the
//! reference is recreated or dropped from its spec.

use super::dependencies::find_dependents;
use super::status;
use super::types::{ReconcileOutcome, ReconcileStatus, Reconciler, ReconcilerError};
use crate::controller::executor::{Action, Applied};
use crate::resource::{ObjectKey, ObservedState};
use tracing::info;

pub(super) async fn finalize(
    key: &ObjectKey,
    observed: Option<&ObservedState>,
    ctx: &Reconciler,
) -> Result<ReconcileOutcome, ReconcilerError> {
    if observed.is_none() {
        return Ok(ReconcileOutcome::new(ReconcileStatus::Absent));
    }

    let dependents = find_dependents(ctx.store.as_ref(), key).await?;
    if !dependents.is_empty() {
        info!(
            resource = %key,
            dependents = dependents.len(),
            "Deletion waiting for dependents to release this resource"
        );
        status::record_waiting_for_dependents(ctx, key, &dependents).await?;
        return Ok(
            ReconcileOutcome::new(ReconcileStatus::WaitingForDependents(dependents))
                .requeue_after(ctx.config.dependency_requeue()),
        );
    }

    let delete = Action::Delete { key: key.clone() };
    let actions = match ctx.executor.execute(&delete).await? {
        Applied::Changed => vec![delete],
        Applied::Unchanged => Vec::new(),
    };
    info!(resource = %key, "Finalized; observed state removed");
    Ok(ReconcileOutcome::new(ReconcileStatus::Finalized).with_actions(actions))
}
