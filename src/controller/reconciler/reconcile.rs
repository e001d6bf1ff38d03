//! # Reconcile
//!
//! Entry point for a single reconcile pass over one key.

use super::dependencies::unready_dependencies;
use super::finalize::finalize;
use super::plan::plan_actions;
use super::status;
use super::types::{ReconcileOutcome, ReconcileStatus, Reconciler, ReconcilerError};
use crate::controller::executor::{Action, Applied};
use crate::observability;
use crate::resource::ObjectKey;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Reconcile the resource at `key`
///
/// 1. Re-read desired and observed state; a missing desired state finalizes.
/// 2. Reject broken invariants (`observedGeneration` ahead of `generation`).
/// 3. Validate; an invalid spec is marked `Stalled` and not retried.
/// 4. Plan and execute one action per divergent owned field.
/// 5. Record `Ready` once every referenced resource is ready, otherwise record
///    `Reconciling` and ask to be requeued.
///
/// Safe to call any number of times: a converged resource plans no actions and
/// writes nothing.
#[instrument(
    skip(key, ctx),
    fields(
        resource.kind = %key.kind,
        resource.namespace = %key.namespace,
        resource.name = %key.name,
    )
)]
pub async fn reconcile(
    key: &ObjectKey,
    ctx: &Reconciler,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let start = Instant::now();
    observability::metrics::increment_reconciliations();

    let result = reconcile_key(key, ctx).await;

    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    if let Ok(outcome) = &result {
        if outcome.is_noop() {
            debug!(status = outcome.status.as_str(), "reconcile.complete");
        } else {
            info!(
                status = outcome.status.as_str(),
                actions = outcome.actions.len(),
                "reconcile.complete"
            );
        }
    }
    result
}

async fn reconcile_key(
    key: &ObjectKey,
    ctx: &Reconciler,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let stored = ctx.store.get(key).await?;

    let Some(desired) = stored.desired else {
        return finalize(key, stored.observed.as_ref(), ctx).await;
    };

    if desired.key() != *key {
        return Err(ReconcilerError::Fatal(format!(
            "desired state stored under {key} describes {}",
            desired.key()
        )));
    }
    if let Some(observed) = &stored.observed {
        if observed.observed_generation > desired.generation {
            return Err(ReconcilerError::Fatal(format!(
                "observedGeneration {} of {key} is ahead of generation {}",
                observed.observed_generation, desired.generation
            )));
        }
    }

    if let Err(error) = desired.validate() {
        warn!(error = %error, generation = desired.generation, "Desired state is invalid");
        if stored.observed.is_none() {
            ctx.executor
                .execute(&Action::Create { key: key.clone() })
                .await?;
        }
        status::record_stalled(ctx, key, desired.generation, &error).await?;
        return Err(error.into());
    }

    let fields = desired.spec.owned_fields().map_err(|e| {
        ReconcilerError::Fatal(format!("failed to serialize spec of {key}: {e}"))
    })?;

    let planned = plan_actions(
        key,
        &fields,
        stored.observed.as_ref(),
        ctx.executor.field_manager(),
    );
    let mut applied = Vec::with_capacity(planned.len());
    for action in planned {
        if ctx.executor.execute(&action).await? == Applied::Changed {
            applied.push(action);
        }
    }

    let references = desired.references();
    let waiting = unready_dependencies(ctx.store.as_ref(), &references).await?;
    if waiting.is_empty() {
        status::record_converged(ctx, key, desired.generation, &references).await?;
        return Ok(ReconcileOutcome::new(ReconcileStatus::Converged).with_actions(applied));
    }

    debug!(waiting = waiting.len(), "Dependencies not ready yet");
    status::record_waiting_for_dependencies(ctx, key, &references, &waiting).await?;
    Ok(
        ReconcileOutcome::new(ReconcileStatus::WaitingForDependencies(waiting))
            .with_actions(applied)
            .requeue_after(ctx.config.dependency_requeue()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::resource::{
        ConfigMapSpec, DeploymentSpec, DesiredState, ResourceKind, ResourceSpec,
        CONDITION_READY, CONDITION_RECONCILING, CONDITION_STALLED,
    };
    use crate::store::{InMemoryStore, ObjectStore};
    use crate::ConditionStatus;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryStore>, Reconciler) {
        let store = Arc::new(InMemoryStore::new());
        let ctx = Reconciler::new(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            ControllerConfig::default(),
        );
        (store, ctx)
    }

    fn voting(replicas: u32) -> DesiredState {
        DesiredState::new(
            "vote",
            "voting",
            ResourceSpec::Deployment(DeploymentSpec {
                replicas,
                image: "voting-app:1.0".to_string(),
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_second_pass_is_a_noop() {
        let (store, ctx) = setup();
        let key = store.apply(voting(3)).unwrap().key();

        let first = reconcile(&key, &ctx).await.unwrap();
        assert_eq!(first.status, ReconcileStatus::Converged);
        assert_eq!(first.actions[0], Action::Create { key: key.clone() });
        let version = store.get(&key).await.unwrap().version;

        let second = reconcile(&key, &ctx).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(store.get(&key).await.unwrap().version, version);

        let observed = store.observed(&key).unwrap();
        assert_eq!(observed.observed_generation, 1);
        assert!(observed.is_converged(1));
    }

    #[tokio::test]
    async fn test_replica_change_is_one_update() {
        let (store, ctx) = setup();
        let key = store.apply(voting(1)).unwrap().key();
        reconcile(&key, &ctx).await.unwrap();

        let desired = store.apply(voting(3)).unwrap();
        assert_eq!(desired.generation, 2);
        let outcome = reconcile(&key, &ctx).await.unwrap();
        assert_eq!(
            outcome.actions,
            vec![Action::Update {
                key: key.clone(),
                path: "/replicas".to_string(),
                value: Some(json!(3)),
            }]
        );
        let observed = store.observed(&key).unwrap();
        assert_eq!(observed.status["replicas"], 3);
        assert_eq!(observed.observed_generation, 2);
    }

    #[tokio::test]
    async fn test_invalid_spec_stalls_without_touching_fields() {
        let (store, ctx) = setup();
        let mut desired = voting(1);
        if let ResourceSpec::Deployment(spec) = &mut desired.spec {
            spec.image = String::new();
        }
        let key = store.apply(desired).unwrap().key();

        let err = reconcile(&key, &ctx).await.unwrap_err();
        assert!(matches!(err, ReconcilerError::Validation(_)));

        let observed = store.observed(&key).unwrap();
        let stalled = observed.condition(CONDITION_STALLED).unwrap();
        assert_eq!(stalled.status, ConditionStatus::True);
        assert_eq!(stalled.reason, "InvalidSpec");
        assert!(stalled.message.contains("spec.image"));
        assert_eq!(observed.status, json!({}));
        assert_eq!(observed.observed_generation, 1);

        // Fixing the spec clears Stalled
        store.apply(voting(1)).unwrap();
        reconcile(&key, &ctx).await.unwrap();
        let observed = store.observed(&key).unwrap();
        assert_eq!(
            observed.condition(CONDITION_STALLED).unwrap().status,
            ConditionStatus::False
        );
        assert!(observed.is_converged(2));
    }

    #[tokio::test]
    async fn test_generation_regression_is_fatal() {
        let (store, ctx) = setup();
        let key = store.apply(voting(1)).unwrap().key();
        reconcile(&key, &ctx).await.unwrap();

        let current = store.get(&key).await.unwrap();
        let mut observed = current.observed.unwrap();
        observed.observed_generation = 7;
        store.put(observed, current.version).await.unwrap();

        let err = reconcile(&key, &ctx).await.unwrap_err();
        assert!(matches!(err, ReconcilerError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_outage_leaves_conditions_alone() {
        let (store, ctx) = setup();
        let key = store.apply(voting(1)).unwrap().key();
        reconcile(&key, &ctx).await.unwrap();
        let before = store.observed(&key).unwrap();

        store.apply(voting(2)).unwrap();
        store.set_unavailable(true);
        let err = reconcile(&key, &ctx).await.unwrap_err();
        assert!(matches!(err, ReconcilerError::Transient(_)));
        store.set_unavailable(false);

        assert_eq!(store.observed(&key).unwrap(), before);
    }

    #[tokio::test]
    async fn test_waits_for_referenced_config_map() {
        let (store, ctx) = setup();
        let mut desired = voting(1);
        if let ResourceSpec::Deployment(spec) = &mut desired.spec {
            spec.config_refs = vec!["settings".to_string()];
        }
        let key = store.apply(desired).unwrap().key();

        let outcome = reconcile(&key, &ctx).await.unwrap();
        let settings = ObjectKey::new(ResourceKind::ConfigMap, "vote", "settings");
        assert_eq!(
            outcome.status,
            ReconcileStatus::WaitingForDependencies(vec![settings.clone()])
        );
        assert_eq!(outcome.requeue_after, Some(ctx.config.dependency_requeue()));
        let observed = store.observed(&key).unwrap();
        assert_eq!(
            observed.condition(CONDITION_RECONCILING).unwrap().status,
            ConditionStatus::True
        );
        assert_eq!(observed.observed_generation, 0);

        store
            .apply(DesiredState::new(
                "vote",
                "settings",
                ResourceSpec::ConfigMap(ConfigMapSpec::default()),
            ))
            .unwrap();
        reconcile(&settings, &ctx).await.unwrap();
        let outcome = reconcile(&key, &ctx).await.unwrap();
        assert_eq!(outcome.status, ReconcileStatus::Converged);
        assert_eq!(
            store.observed(&key).unwrap().condition(CONDITION_READY).unwrap().status,
            ConditionStatus::True
        );
    }

    #[tokio::test]
    async fn test_deleted_desired_state_is_finalized() {
        let (store, ctx) = setup();
        let key = store.apply(voting(1)).unwrap().key();
        reconcile(&key, &ctx).await.unwrap();

        store.delete_desired(&key).unwrap();
        let outcome = reconcile(&key, &ctx).await.unwrap();
        assert_eq!(outcome.status, ReconcileStatus::Finalized);
        assert_eq!(outcome.actions, vec![Action::Delete { key: key.clone() }]);
        assert!(store.observed(&key).is_none());

        let again = reconcile(&key, &ctx).await.unwrap();
        assert_eq!(again.status, ReconcileStatus::Absent);
    }
}
