//! # Resources
//!
//! Typed desired and observed state for the resource kinds the controller manages.
//!
//! Schema-less manifest data is replaced by [`ResourceSpec`], a tagged variant over
//! [`ResourceKind`]. Each variant's payload implements [`KindSpec`], which carries
//! the kind-specific validation and dependency rules used by the reconciler.
//!
//! # Example
//!
//! ```json
//! {
//!   "name": "voting",
//!   "namespace": "vote",
//!   "generation": 1,
//!   "spec": {
//!     "kind": "Deployment",
//!     "replicas": 3,
//!     "image": "voting-app:1.0",
//!     "configRefs": ["voting-config"]
//!   }
//! }
//! ```

mod config;
mod deployment;
pub mod fields;
mod ingress;
mod service;
mod status;
pub mod validation;

pub use config::{ConfigMapSpec, SecretSpec};
pub use deployment::{DeploymentSpec, InitContainer};
pub use ingress::{IngressRule, IngressSpec};
pub use service::{ServicePort, ServiceSpec, ServiceType};
pub use status::{
    Condition, ConditionStatus, ObservedState, CONDITION_READY, CONDITION_RECONCILING,
    CONDITION_STALLED,
};
pub use validation::ValidationError;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource kinds understood by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Deployment,
    Service,
    Ingress,
    ConfigMap,
    Secret,
}

impl ResourceKind {
    /// Every kind, in the order the runtime subscribes to them
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::ConfigMap,
        ResourceKind::Secret,
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::Ingress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a managed resource
///
/// This doubles as the reconcile request: the queue carries keys, never
/// payloads, so every reconcile re-reads current state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Reconcile requests are plain keys
pub type ReconcileRequest = ObjectKey;

/// Kind-specific rules implemented by every spec payload
pub trait KindSpec {
    /// Kind this payload belongs to
    const KIND: ResourceKind;

    /// Reject malformed specs. Invalid specs are never retried automatically.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Other resources (in `namespace`) that must be Ready before this one converges
    fn references(&self, _namespace: &str) -> Vec<ObjectKey> {
        Vec::new()
    }
}

/// Desired configuration, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ResourceSpec {
    Deployment(DeploymentSpec),
    Service(ServiceSpec),
    Ingress(IngressSpec),
    ConfigMap(ConfigMapSpec),
    Secret(SecretSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Deployment(_) => DeploymentSpec::KIND,
            ResourceSpec::Service(_) => ServiceSpec::KIND,
            ResourceSpec::Ingress(_) => IngressSpec::KIND,
            ResourceSpec::ConfigMap(_) => ConfigMapSpec::KIND,
            ResourceSpec::Secret(_) => SecretSpec::KIND,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ResourceSpec::Deployment(s) => s.validate(),
            ResourceSpec::Service(s) => s.validate(),
            ResourceSpec::Ingress(s) => s.validate(),
            ResourceSpec::ConfigMap(s) => s.validate(),
            ResourceSpec::Secret(s) => s.validate(),
        }
    }

    pub fn references(&self, namespace: &str) -> Vec<ObjectKey> {
        let mut refs = match self {
            ResourceSpec::Deployment(s) => s.references(namespace),
            ResourceSpec::Service(s) => s.references(namespace),
            ResourceSpec::Ingress(s) => s.references(namespace),
            ResourceSpec::ConfigMap(s) => s.references(namespace),
            ResourceSpec::Secret(s) => s.references(namespace),
        };
        refs.sort();
        refs.dedup();
        refs
    }

    /// The fields this controller drives into `ObservedState.status`
    ///
    /// This is the variant payload serialized without its `kind` tag.
    pub fn owned_fields(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            ResourceSpec::Deployment(s) => serde_json::to_value(s),
            ResourceSpec::Service(s) => serde_json::to_value(s),
            ResourceSpec::Ingress(s) => serde_json::to_value(s),
            ResourceSpec::ConfigMap(s) => serde_json::to_value(s),
            ResourceSpec::Secret(s) => serde_json::to_value(s),
        }
    }
}

/// The user's intent for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub spec: ResourceSpec,
    /// Incremented by the store whenever `spec` changes
    #[serde(default)]
    pub generation: i64,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl DesiredState {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            spec,
            generation: 0,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind(), self.namespace.clone(), self.name.clone())
    }

    /// Validate identity and spec
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_dns_label(&self.name, "name")?;
        validation::validate_dns_label(&self.namespace, "namespace")?;
        self.spec.validate()
    }

    pub fn references(&self) -> Vec<ObjectKey> {
        self.spec.references(&self.namespace)
    }
}
