//! # Planning
//!
//! Turns the owned-field diff into an ordered list of actions.

use crate::controller::diff;
use crate::controller::executor::Action;
use crate::resource::{ObjectKey, ObservedState};
use serde_json::Value;
use tracing::debug;

/// Actions that bring `observed` in line with `desired_fields` for `manager`
///
/// A missing observed state plans a `Create` followed by an `Update` for every
/// desired field. Otherwise one `Update` is planned per divergent owned field,
/// removals first. A converged resource plans nothing.
pub fn plan_actions(
    key: &ObjectKey,
    desired_fields: &Value,
    observed: Option<&ObservedState>,
    manager: &str,
) -> Vec<Action> {
    let mut actions = Vec::new();
    let fresh;
    let observed = match observed {
        Some(observed) => observed,
        None => {
            actions.push(Action::Create { key: key.clone() });
            fresh = ObservedState::new(key);
            &fresh
        }
    };

    let field_diff = diff::diff_owned(desired_fields, observed, manager);
    for (path, owner) in &field_diff.skipped {
        debug!(resource = %key, path, owner, "Field owned by another manager; not overriding");
    }
    actions.extend(
        field_diff
            .changes
            .into_iter()
            .map(|change| Action::from_change(key, change)),
    );
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DeploymentSpec, ResourceKind, ResourceSpec};
    use serde_json::json;

    const ME: &str = "reconcile-controller";

    fn voting() -> ObjectKey {
        ObjectKey::new(ResourceKind::Deployment, "vote", "voting")
    }

    #[test]
    fn test_missing_observed_plans_create_then_fields() {
        let spec = ResourceSpec::Deployment(DeploymentSpec {
            replicas: 3,
            image: "voting-app:1.0".to_string(),
            ..Default::default()
        });
        let fields = spec.owned_fields().unwrap();
        let actions = plan_actions(&voting(), &fields, None, ME);

        assert_eq!(actions[0], Action::Create { key: voting() });
        assert!(actions.contains(&Action::Update {
            key: voting(),
            path: "/replicas".to_string(),
            value: Some(json!(3)),
        }));
        assert!(actions.iter().skip(1).all(|a| a.verb() == "update"));
    }

    #[test]
    fn test_replica_drift_plans_exactly_one_update() {
        let mut observed = ObservedState::new(&voting());
        observed.status = json!({ "replicas": 1, "image": "voting-app:1.0" });
        observed.managed_fields.insert("/replicas".to_string(), ME.to_string());
        observed.managed_fields.insert("/image".to_string(), ME.to_string());

        let desired = json!({ "replicas": 3, "image": "voting-app:1.0" });
        let actions = plan_actions(&voting(), &desired, Some(&observed), ME);
        assert_eq!(
            actions,
            vec![Action::Update {
                key: voting(),
                path: "/replicas".to_string(),
                value: Some(json!(3)),
            }]
        );
    }

    #[test]
    fn test_converged_plans_nothing() {
        let mut observed = ObservedState::new(&voting());
        observed.status = json!({ "replicas": 3 });
        observed.managed_fields.insert("/replicas".to_string(), ME.to_string());
        assert!(plan_actions(&voting(), &json!({ "replicas": 3 }), Some(&observed), ME).is_empty());
    }
}
