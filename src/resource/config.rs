//! # ConfigMap and Secret
//!
//! Key/value configuration consumed by Deployments.

use super::validation::{validate_data_key, ValidationError};
use super::{KindSpec, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapSpec {
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl KindSpec for ConfigMapSpec {
    const KIND: ResourceKind = ResourceKind::ConfigMap;

    fn validate(&self) -> Result<(), ValidationError> {
        validate_keys(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSpec {
    /// Base64 or plain values; the controller does not interpret them
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default = "default_secret_type", rename = "type")]
    pub secret_type: String,
}

fn default_secret_type() -> String {
    "Opaque".to_string()
}

impl KindSpec for SecretSpec {
    const KIND: ResourceKind = ResourceKind::Secret;

    fn validate(&self) -> Result<(), ValidationError> {
        if self.secret_type.trim().is_empty() {
            return Err(ValidationError::new("spec.type", "must not be empty"));
        }
        validate_keys(&self.data)
    }
}

fn validate_keys(data: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    data.keys()
        .try_for_each(|key| validate_data_key(key, "spec.data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_map_keys() {
        let spec = ConfigMapSpec {
            data: [("app.properties".to_string(), "x=1".to_string())].into(),
        };
        assert!(spec.validate().is_ok());

        let bad = ConfigMapSpec {
            data: [("bad/key".to_string(), String::new())].into(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_secret_type_defaults_to_opaque() {
        let spec: SecretSpec = serde_json::from_value(serde_json::json!({
            "data": { "POSTGRES_PASSWORD": "cG9zdGdyZXM=" }
        }))
        .unwrap();
        assert_eq!(spec.secret_type, "Opaque");
        assert!(spec.validate().is_ok());
    }
}
