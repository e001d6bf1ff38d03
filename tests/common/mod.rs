//! Shared fixtures for integration tests.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use reconcile_controller::cli::parse_manifest;
use reconcile_controller::config::ControllerConfig;
use reconcile_controller::controller::reconciler::{reconcile, Reconciler};
use reconcile_controller::resource::{
    DeploymentSpec, DesiredState, ObjectKey, ResourceKind, ResourceSpec,
};
use reconcile_controller::store::{InMemoryStore, ObjectStore};
use std::sync::Arc;

pub const VOTING_APP: &str = include_str!("../../deploy/voting-app.json");

pub fn voting_app() -> Vec<DesiredState> {
    parse_manifest(VOTING_APP).expect("voting app manifest must parse")
}

/// Store seeded with the voting app
pub fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for desired in voting_app() {
        store.apply(desired).expect("apply");
    }
    store
}

/// Fast timings so tests never wait on production intervals
pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        worker_count: 4,
        resync_interval_secs: 0,
        backoff_base_ms: 5,
        backoff_max_secs: 1,
        fatal_requeue_secs: 60,
        dependency_requeue_secs: 1,
        ..ControllerConfig::default()
    }
}

pub fn reconciler(store: &Arc<InMemoryStore>) -> Reconciler {
    Reconciler::new(Arc::clone(store) as Arc<dyn ObjectStore>, test_config())
}

pub fn key(kind: ResourceKind, name: &str) -> ObjectKey {
    ObjectKey::new(kind, "vote", name)
}

pub fn voting_deployment(replicas: u32) -> DesiredState {
    let mut desired = voting_app()
        .into_iter()
        .find(|d| d.key() == key(ResourceKind::Deployment, "voting"))
        .expect("voting deployment in manifest");
    if let ResourceSpec::Deployment(DeploymentSpec { replicas: r, .. }) = &mut desired.spec {
        *r = replicas;
    }
    desired
}

/// Every key with desired or observed state, in kind order
pub async fn all_keys(store: &InMemoryStore) -> Vec<ObjectKey> {
    let mut keys = Vec::new();
    for kind in ResourceKind::ALL {
        keys.extend(store.list(kind, None).await.unwrap().iter().map(DesiredState::key));
        for observed in store.list_observed(kind, None).await.unwrap() {
            if !keys.contains(&observed.key()) {
                keys.push(observed.key());
            }
        }
    }
    keys
}

/// Reconcile every key once; returns the number of actions applied
pub async fn reconcile_round(store: &InMemoryStore, ctx: &Reconciler) -> usize {
    let mut actions = 0;
    for key in all_keys(store).await {
        if let Ok(outcome) = reconcile(&key, ctx).await {
            actions += outcome.actions.len();
        }
    }
    actions
}

/// Every desired resource reports `observedGeneration == generation` and healthy
pub fn is_converged(store: &InMemoryStore) -> bool {
    voting_app().iter().all(|d| {
        let key = d.key();
        match (store.desired(&key), store.observed(&key)) {
            (Some(desired), Some(observed)) => observed.is_converged(desired.generation),
            _ => false,
        }
    })
}
