//! # Error Policy
//!
//! Maps each reconcile result to a requeue decision.
//!
//! | Result                         | Requeue                                  |
//! |--------------------------------|------------------------------------------|
//! | `Ok`, converged or finalized   | none; backoff reset                      |
//! | `Ok`, waiting on other keys    | per-key backoff, capped at the hint      |
//! | `Transient` / `Conflict`       | per-key exponential backoff              |
//! | `Validation`                   | none until desired state changes         |
//! | `Fatal`                        | long fixed interval; health degraded     |

use crate::config::ControllerConfig;
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{ReconcileOutcome, ReconcileStatus, ReconcilerError};
use crate::controller::server::ServerState;
use crate::observability;
use crate::resource::ObjectKey;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Handle a successful reconcile
///
/// A key waiting on dependencies or dependents is not done: it keeps its
/// backoff and is retried with a growing delay, capped at the outcome's
/// requeue hint. Returns the requeue delay, if one was scheduled.
pub fn handle_reconciliation_success(
    key: &ObjectKey,
    outcome: &ReconcileOutcome,
    queue: &WorkQueue,
) -> Option<Duration> {
    let waiting = matches!(
        outcome.status,
        ReconcileStatus::WaitingForDependencies(_) | ReconcileStatus::WaitingForDependents(_)
    );
    if !waiting {
        queue.forget(key);
        let delay = outcome.requeue_after?;
        queue.requeue_after(key.clone(), delay);
        return Some(delay);
    }

    let delay = match outcome.requeue_after {
        Some(cap) => queue.requeue_rate_limited_capped(key.clone(), cap),
        None => queue.requeue_rate_limited(key.clone()),
    };
    debug!(
        resource = %key,
        status = outcome.status.as_str(),
        waits = queue.failures(key),
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        "Requeueing while waiting on related resources"
    );
    observability::metrics::increment_requeues_total("dependency-wait");
    Some(delay)
}

/// Handle a failed reconcile
///
/// Backoff state is tracked per key inside the queue so one failing resource
/// never delays another. Returns the requeue delay, if one was scheduled.
pub fn handle_reconciliation_error(
    key: &ObjectKey,
    error: &ReconcilerError,
    queue: &WorkQueue,
    config: &ControllerConfig,
    server_state: &ServerState,
) -> Option<Duration> {
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource = %key,
        error.class = error.class(),
    );
    let _error_guard = error_span.enter();

    observability::metrics::increment_reconciliation_errors(error.class());

    match error {
        ReconcilerError::Transient(_) | ReconcilerError::Conflict { .. } => {
            let delay = queue.requeue_rate_limited(key.clone());
            warn!(
                error = %error,
                failures = queue.failures(key),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retrying with exponential backoff"
            );
            observability::metrics::increment_requeues_total("error-backoff");
            Some(delay)
        }
        ReconcilerError::Validation(validation) => {
            queue.forget(key);
            info!(
                field = %validation.field,
                "Desired state is invalid; waiting for it to change"
            );
            None
        }
        ReconcilerError::Fatal(message) => {
            error!(message = %message, "Fatal reconcile error; marking controller degraded");
            observability::metrics::set_degraded(true);
            server_state.mark_degraded();
            let delay = config.fatal_requeue();
            queue.requeue_after(key.clone(), delay);
            observability::metrics::increment_requeues_total("fatal");
            Some(delay)
        }
    }
}
