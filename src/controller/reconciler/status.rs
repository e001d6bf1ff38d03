//! # Status Management
//!
//! Records reconcile results on the observed state as conditions,
//! `observedGeneration` and references.
//!
//! Every update goes through [`ActionExecutor::mutate_observed`] and is skipped
//! when nothing would change, so a converged resource produces no writes and
//! therefore no watch events.
//!
//! [`ActionExecutor::mutate_observed`]: crate::controller::executor::ActionExecutor::mutate_observed

use super::types::{Reconciler, ReconcilerError};
use crate::controller::executor::Applied;
use crate::resource::validation::ValidationError;
use crate::resource::{
    ConditionStatus, ObjectKey, CONDITION_READY, CONDITION_RECONCILING, CONDITION_STALLED,
};
use tracing::debug;

const REASON_RECONCILED: &str = "Reconciled";
const REASON_WAITING_FOR_DEPENDENCY: &str = "WaitingForDependency";
const REASON_WAITING_FOR_DEPENDENTS: &str = "WaitingForDependents";
const REASON_INVALID_SPEC: &str = "InvalidSpec";

fn join_keys(keys: &[ObjectKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// All owned fields applied and every dependency ready
pub async fn record_converged(
    ctx: &Reconciler,
    key: &ObjectKey,
    generation: i64,
    references: &[ObjectKey],
) -> Result<Applied, ReconcilerError> {
    let applied = ctx
        .executor
        .mutate_observed(key, |observed| {
            let mut changed = false;
            if observed.references != references {
                observed.references = references.to_vec();
                changed = true;
            }
            changed |= observed.set_condition(
                CONDITION_READY,
                ConditionStatus::True,
                REASON_RECONCILED,
                format!("Generation {generation} applied"),
            );
            changed |= observed.set_condition(
                CONDITION_RECONCILING,
                ConditionStatus::False,
                REASON_RECONCILED,
                "",
            );
            changed |= observed.set_condition(
                CONDITION_STALLED,
                ConditionStatus::False,
                REASON_RECONCILED,
                "",
            );
            if observed.observed_generation != generation {
                observed.observed_generation = generation;
                changed = true;
            }
            changed
        })
        .await?;
    if applied == Applied::Unchanged {
        debug!(resource = %key, "Skipping status update - already converged");
    }
    Ok(applied)
}

/// Owned fields applied but some referenced resources are missing or not ready
///
/// `observedGeneration` is not advanced: the generation is not complete yet.
pub async fn record_waiting_for_dependencies(
    ctx: &Reconciler,
    key: &ObjectKey,
    references: &[ObjectKey],
    waiting: &[ObjectKey],
) -> Result<Applied, ReconcilerError> {
    let message = format!("Waiting for {}", join_keys(waiting));
    ctx.executor
        .mutate_observed(key, |observed| {
            let mut changed = false;
            if observed.references != references {
                observed.references = references.to_vec();
                changed = true;
            }
            changed |= observed.set_condition(
                CONDITION_READY,
                ConditionStatus::False,
                REASON_WAITING_FOR_DEPENDENCY,
                message.clone(),
            );
            changed |= observed.set_condition(
                CONDITION_RECONCILING,
                ConditionStatus::True,
                REASON_WAITING_FOR_DEPENDENCY,
                message.clone(),
            );
            changed |= observed.set_condition(
                CONDITION_STALLED,
                ConditionStatus::False,
                REASON_WAITING_FOR_DEPENDENCY,
                "",
            );
            changed
        })
        .await
}

/// Desired state can never be realised as written
///
/// The generation is marked observed so the failure is attributable to it.
pub async fn record_stalled(
    ctx: &Reconciler,
    key: &ObjectKey,
    generation: i64,
    error: &ValidationError,
) -> Result<Applied, ReconcilerError> {
    let message = error.to_string();
    ctx.executor
        .mutate_observed(key, |observed| {
            let mut changed = observed.set_condition(
                CONDITION_STALLED,
                ConditionStatus::True,
                REASON_INVALID_SPEC,
                message.clone(),
            );
            changed |= observed.set_condition(
                CONDITION_READY,
                ConditionStatus::False,
                REASON_INVALID_SPEC,
                message.clone(),
            );
            changed |= observed.set_condition(
                CONDITION_RECONCILING,
                ConditionStatus::False,
                REASON_INVALID_SPEC,
                "",
            );
            if observed.observed_generation != generation {
                observed.observed_generation = generation;
                changed = true;
            }
            changed
        })
        .await
}

/// Desired state deleted but other resources still reference this one
pub async fn record_waiting_for_dependents(
    ctx: &Reconciler,
    key: &ObjectKey,
    dependents: &[ObjectKey],
) -> Result<Applied, ReconcilerError> {
    let message = format!("Deletion blocked by {}", join_keys(dependents));
    ctx.executor
        .mutate_observed(key, |observed| {
            let mut changed = observed.set_condition(
                CONDITION_READY,
                ConditionStatus::False,
                REASON_WAITING_FOR_DEPENDENTS,
                message.clone(),
            );
            changed |= observed.set_condition(
                CONDITION_RECONCILING,
                ConditionStatus::True,
                REASON_WAITING_FOR_DEPENDENTS,
                message.clone(),
            );
            changed
        })
        .await
}
