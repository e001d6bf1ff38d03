//! # Service
//!
//! Stable network endpoint in front of a set of pods.

use super::validation::{validate_port, ValidationError};
use super::{KindSpec, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
    #[serde(default, rename = "type")]
    pub service_type: ServiceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub port: u32,
    pub target_port: u32,
}

impl KindSpec for ServiceSpec {
    const KIND: ResourceKind = ResourceKind::Service;

    fn validate(&self) -> Result<(), ValidationError> {
        if self.selector.is_empty() {
            return Err(ValidationError::new(
                "spec.selector",
                "must select at least one label",
            ));
        }
        if self.ports.is_empty() {
            return Err(ValidationError::new(
                "spec.ports",
                "must expose at least one port",
            ));
        }
        let mut seen = HashSet::new();
        for (i, port) in self.ports.iter().enumerate() {
            validate_port(port.port, &format!("spec.ports[{i}].port"))?;
            validate_port(port.target_port, &format!("spec.ports[{i}].targetPort"))?;
            if !seen.insert(port.port) {
                return Err(ValidationError::new(
                    format!("spec.ports[{i}].port"),
                    format!("port {} is exposed twice", port.port),
                ));
            }
        }
        Ok(())
    }
}
