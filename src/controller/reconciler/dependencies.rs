//! # Dependencies
//!
//! Resources reference each other by key: a Deployment mounts ConfigMaps and
//! Secrets, an Ingress routes to Services. References gate readiness in one
//! direction and deletion in the other.

use super::types::ReconcilerError;
use crate::resource::{ObjectKey, ResourceKind};
use crate::store::ObjectStore;

/// References that are missing or have not converged yet
///
/// A referenced resource is ready once its observed state has caught up with
/// its current generation and all of its conditions are healthy.
pub async fn unready_dependencies(
    store: &dyn ObjectStore,
    references: &[ObjectKey],
) -> Result<Vec<ObjectKey>, ReconcilerError> {
    let mut waiting = Vec::new();
    for reference in references {
        let stored = store.get(reference).await?;
        let ready = match (&stored.desired, &stored.observed) {
            (Some(desired), Some(observed)) => observed.is_converged(desired.generation),
            _ => false,
        };
        if !ready {
            waiting.push(reference.clone());
        }
    }
    Ok(waiting)
}

/// Resources in the same namespace that still reference `key`
///
/// Both desired references (what dependents want) and observed references
/// (what dependents last realised) count, so a dependent that is itself being
/// deleted keeps blocking until its observed state is gone.
pub async fn find_dependents(
    store: &dyn ObjectStore,
    key: &ObjectKey,
) -> Result<Vec<ObjectKey>, ReconcilerError> {
    let namespace = Some(key.namespace.as_str());
    let mut dependents = Vec::new();
    for kind in ResourceKind::ALL {
        for desired in store.list(kind, namespace).await? {
            if desired.key() != *key && desired.references().contains(key) {
                dependents.push(desired.key());
            }
        }
        for observed in store.list_observed(kind, namespace).await? {
            if observed.key() != *key && observed.references.contains(key) {
                dependents.push(observed.key());
            }
        }
    }
    dependents.sort();
    dependents.dedup();
    Ok(dependents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{
        ConfigMapSpec, DeploymentSpec, DesiredState, ObservedState, ResourceSpec,
        CONDITION_READY,
    };
    use crate::store::{InMemoryStore, ABSENT_VERSION};
    use crate::ConditionStatus;

    fn settings() -> ObjectKey {
        ObjectKey::new(ResourceKind::ConfigMap, "vote", "settings")
    }

    fn worker() -> DesiredState {
        DesiredState::new(
            "vote",
            "worker",
            ResourceSpec::Deployment(DeploymentSpec {
                replicas: 1,
                image: "worker:1.0".to_string(),
                config_refs: vec!["settings".to_string()],
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_missing_and_unconverged_dependencies_are_unready() {
        let store = InMemoryStore::new();
        assert_eq!(
            unready_dependencies(&store, &[settings()]).await.unwrap(),
            vec![settings()]
        );

        store
            .apply(DesiredState::new(
                "vote",
                "settings",
                ResourceSpec::ConfigMap(ConfigMapSpec::default()),
            ))
            .unwrap();
        let mut observed = ObservedState::new(&settings());
        store.put(observed.clone(), ABSENT_VERSION).await.unwrap();
        assert_eq!(
            unready_dependencies(&store, &[settings()]).await.unwrap(),
            vec![settings()]
        );

        let version = store.get(&settings()).await.unwrap().version;
        observed.observed_generation = 1;
        observed.set_condition(CONDITION_READY, ConditionStatus::True, "Reconciled", "");
        store.put(observed, version).await.unwrap();
        assert!(unready_dependencies(&store, &[settings()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dependents_found_through_desired_and_observed_references() {
        let store = InMemoryStore::new();
        store.apply(worker()).unwrap();
        assert_eq!(
            find_dependents(&store, &settings()).await.unwrap(),
            vec![worker().key()]
        );

        // Desired gone, observed still references the ConfigMap
        let mut observed = ObservedState::new(&worker().key());
        observed.references = vec![settings()];
        store.put(observed, ABSENT_VERSION).await.unwrap();
        store.delete_desired(&worker().key()).unwrap();
        assert_eq!(
            find_dependents(&store, &settings()).await.unwrap(),
            vec![worker().key()]
        );

        let version = store.get(&worker().key()).await.unwrap().version;
        store.delete_observed(&worker().key(), version).await.unwrap();
        assert!(find_dependents(&store, &settings()).await.unwrap().is_empty());
    }
}
