//! # Observed State
//!
//! What the controller currently believes is true about a resource, plus the
//! conditions that make up the user-facing status surface.

use super::{ObjectKey, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Condition type: the resource has converged on its current generation
pub const CONDITION_READY: &str = "Ready";
/// Condition type: work is in progress (e.g. waiting for a dependency)
pub const CONDITION_RECONCILING: &str = "Reconciling";
/// Condition type: progress is impossible until the desired state changes
pub const CONDITION_STALLED: &str = "Stalled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// One entry of the per-type transition log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (Ready, Reconciling, Stalled)
    pub r#type: String,
    pub status: ConditionStatus,
    /// Machine-readable CamelCase reason
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// Changes only when `status` changes
    pub last_transition_time: DateTime<Utc>,
}

/// Observed state of one managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedState {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    pub uid: Uuid,
    /// Mirrored fields driven by this controller and fields reported by others
    #[serde(default = "empty_object")]
    pub status: serde_json::Value,
    /// Never exceeds the desired generation
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Field key-path (JSON pointer) to owning manager
    #[serde(default)]
    pub managed_fields: BTreeMap<String, String>,
    /// Resources this one depends on, as of the last reconcile
    #[serde(default)]
    pub references: Vec<ObjectKey>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ObservedState {
    /// Fresh, empty observed state for `key`
    pub fn new(key: &ObjectKey) -> Self {
        Self {
            kind: key.kind,
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            uid: Uuid::new_v4(),
            status: empty_object(),
            observed_generation: 0,
            conditions: Vec::new(),
            managed_fields: BTreeMap::new(),
            references: Vec::new(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind, self.namespace.clone(), self.name.clone())
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    fn condition_is(&self, condition_type: &str, status: ConditionStatus) -> bool {
        self.condition(condition_type)
            .is_some_and(|c| c.status == status)
    }

    /// Set or update a condition in place
    ///
    /// Returns `true` if anything user-visible changed. The transition time is
    /// only moved when the status flips.
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> bool {
        let message = message.into();
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition_type)
        {
            Some(existing) => {
                if existing.status == status
                    && existing.reason == reason
                    && existing.message == message
                {
                    return false;
                }
                if existing.status != status {
                    existing.last_transition_time = Utc::now();
                }
                existing.status = status;
                existing.reason = reason.to_string();
                existing.message = message;
                true
            }
            None => {
                self.conditions.push(Condition {
                    r#type: condition_type.to_string(),
                    status,
                    reason: reason.to_string(),
                    message,
                    last_transition_time: Utc::now(),
                });
                true
            }
        }
    }

    /// All conditions report healthy
    pub fn is_healthy(&self) -> bool {
        self.condition_is(CONDITION_READY, ConditionStatus::True)
            && !self.condition_is(CONDITION_RECONCILING, ConditionStatus::True)
            && !self.condition_is(CONDITION_STALLED, ConditionStatus::True)
    }

    /// Reconciliation of `generation` is complete
    pub fn is_converged(&self, generation: i64) -> bool {
        self.observed_generation == generation && self.is_healthy()
    }
}
