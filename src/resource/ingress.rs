//! # Ingress
//!
//! HTTP routing rules from external hosts/paths to Services.

use super::validation::{validate_dns_label, validate_port, ValidationError};
use super::{KindSpec, ObjectKey, ResourceKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class: Option<String>,
    pub rules: Vec<IngressRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
    pub service_name: String,
    pub service_port: u32,
}

fn default_path() -> String {
    "/".to_string()
}

impl KindSpec for IngressSpec {
    const KIND: ResourceKind = ResourceKind::Ingress;

    fn validate(&self) -> Result<(), ValidationError> {
        if self.rules.is_empty() {
            return Err(ValidationError::new(
                "spec.rules",
                "must contain at least one rule",
            ));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            let field = format!("spec.rules[{i}]");
            if rule.host.trim().is_empty() {
                return Err(ValidationError::new(
                    format!("{field}.host"),
                    "must not be empty",
                ));
            }
            if !rule.path.starts_with('/') {
                return Err(ValidationError::new(
                    format!("{field}.path"),
                    format!("'{}' must start with '/'", rule.path),
                ));
            }
            validate_dns_label(&rule.service_name, &format!("{field}.serviceName"))?;
            validate_port(rule.service_port, &format!("{field}.servicePort"))?;
        }
        Ok(())
    }

    fn references(&self, namespace: &str) -> Vec<ObjectKey> {
        self.rules
            .iter()
            .map(|rule| ObjectKey::new(ResourceKind::Service, namespace, rule.service_name.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(host: &str, path: &str, service: &str) -> IngressRule {
        IngressRule {
            host: host.to_string(),
            path: path.to_string(),
            service_name: service.to_string(),
            service_port: 80,
        }
    }

    #[test]
    fn test_valid_ingress() {
        let spec = IngressSpec {
            ingress_class: Some("nginx".to_string()),
            rules: vec![rule("vote.local", "/", "vote"), rule("result.local", "/", "result")],
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_path_must_be_absolute() {
        let spec = IngressSpec {
            ingress_class: None,
            rules: vec![rule("vote.local", "vote", "vote")],
        };
        assert_eq!(spec.validate().unwrap_err().field, "spec.rules[0].path");
    }

    #[test]
    fn test_references_are_backend_services() {
        let spec = IngressSpec {
            ingress_class: None,
            rules: vec![rule("vote.local", "/", "vote"), rule("vote.local", "/api", "vote")],
        };
        // Duplicates are collapsed by ResourceSpec::references
        let refs = super::super::ResourceSpec::Ingress(spec).references("vote");
        assert_eq!(refs, vec![ObjectKey::new(ResourceKind::Service, "vote", "vote")]);
    }
}
