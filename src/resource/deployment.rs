//! # Deployment
//!
//! Replicated workload spec.

use super::validation::{validate_dns_label, validate_port, ValidationError};
use super::{KindSpec, ObjectKey, ResourceKind};
use crate::constants::MAX_REPLICAS;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Desired workload configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// ConfigMaps mounted into the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_refs: Vec<String>,
    /// Secrets mounted into the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_refs: Vec<String>,
    /// Run to completion, in order, before the main container starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<InitContainer>,
}

fn default_replicas() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitContainer {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

impl KindSpec for DeploymentSpec {
    const KIND: ResourceKind = ResourceKind::Deployment;

    fn validate(&self) -> Result<(), ValidationError> {
        if self.image.trim().is_empty() {
            return Err(ValidationError::new("spec.image", "must not be empty"));
        }
        if self.replicas > MAX_REPLICAS {
            return Err(ValidationError::new(
                "spec.replicas",
                format!("{} exceeds the maximum of {MAX_REPLICAS}", self.replicas),
            ));
        }
        if let Some(port) = self.container_port {
            validate_port(port, "spec.containerPort")?;
        }
        for name in &self.config_refs {
            validate_dns_label(name, "spec.configRefs")?;
        }
        for name in &self.secret_refs {
            validate_dns_label(name, "spec.secretRefs")?;
        }

        let mut seen = HashSet::new();
        for (i, init) in self.init_containers.iter().enumerate() {
            let field = format!("spec.initContainers[{i}]");
            validate_dns_label(&init.name, &format!("{field}.name"))?;
            if init.image.trim().is_empty() {
                return Err(ValidationError::new(
                    format!("{field}.image"),
                    "must not be empty",
                ));
            }
            if !seen.insert(init.name.as_str()) {
                return Err(ValidationError::new(
                    format!("{field}.name"),
                    format!("duplicate init container name '{}'", init.name),
                ));
            }
        }
        Ok(())
    }

    fn references(&self, namespace: &str) -> Vec<ObjectKey> {
        self.config_refs
            .iter()
            .map(|name| ObjectKey::new(ResourceKind::ConfigMap, namespace, name.as_str()))
            .chain(
                self.secret_refs
                    .iter()
                    .map(|name| ObjectKey::new(ResourceKind::Secret, namespace, name.as_str())),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voting() -> DeploymentSpec {
        DeploymentSpec {
            replicas: 3,
            image: "voting-app:1.0".to_string(),
            container_port: Some(80),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_deployment() {
        assert!(voting().validate().is_ok());
    }

    #[test]
    fn test_empty_image_rejected() {
        let spec = DeploymentSpec {
            image: " ".to_string(),
            ..voting()
        };
        assert_eq!(spec.validate().unwrap_err().field, "spec.image");
    }

    #[test]
    fn test_replica_cap() {
        let spec = DeploymentSpec {
            replicas: MAX_REPLICAS + 1,
            ..voting()
        };
        assert_eq!(spec.validate().unwrap_err().field, "spec.replicas");
    }

    #[test]
    fn test_duplicate_init_containers_rejected() {
        let init = InitContainer {
            name: "wait-for-db".to_string(),
            image: "busybox".to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), "until nc -z db 5432; do sleep 1; done".to_string()],
        };
        let spec = DeploymentSpec {
            init_containers: vec![init.clone(), init],
            ..voting()
        };
        let err = spec.validate().unwrap_err();
        assert_eq!(err.field, "spec.initContainers[1].name");
    }

    #[test]
    fn test_references_config_and_secrets() {
        let spec = DeploymentSpec {
            config_refs: vec!["voting-config".to_string()],
            secret_refs: vec!["db-credentials".to_string()],
            ..voting()
        };
        assert_eq!(
            spec.references("vote"),
            vec![
                ObjectKey::new(ResourceKind::ConfigMap, "vote", "voting-config"),
                ObjectKey::new(ResourceKind::Secret, "vote", "db-credentials"),
            ]
        );
    }

    #[test]
    fn test_replicas_default_to_one() {
        let spec: DeploymentSpec =
            serde_json::from_value(serde_json::json!({ "image": "worker:1.0" })).unwrap();
        assert_eq!(spec.replicas, 1);
        // Unset optional fields are not serialized, so they never appear as owned paths
        let fields = serde_json::to_value(&spec).unwrap();
        assert!(fields.get("containerPort").is_none());
        assert!(fields.get("configRefs").is_none());
    }
}
