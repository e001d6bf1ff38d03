//! # Object Store
//!
//! Interfaces to the externally owned store of desired and observed state,
//! and to the watch feed that announces changes to it.
//!
//! The controller holds no durable state of its own. Every write goes through
//! optimistic concurrency on a per-object version token; no lock is ever held
//! across a store call.

mod memory;

pub use memory::InMemoryStore;

use crate::resource::{DesiredState, ObjectKey, ObservedState, ResourceKind};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Version token of an absent observed state
pub const ABSENT_VERSION: u64 = 0;

/// Errors returned by an [`ObjectStore`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or refused the call
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    /// The expected version did not match the stored version
    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },
}

/// Result of a point read
#[derive(Debug, Clone, Default)]
pub struct StoredObject {
    pub desired: Option<DesiredState>,
    pub observed: Option<ObservedState>,
    /// Version of `observed`; [`ABSENT_VERSION`] when there is none
    pub version: u64,
}

/// Read/write access to desired and observed state
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read desired state, observed state and the observed version for `key`
    async fn get(&self, key: &ObjectKey) -> Result<StoredObject, StoreError>;

    /// Write observed state if the stored version equals `expected_version`
    ///
    /// Passing [`ABSENT_VERSION`] creates the object and fails with
    /// [`StoreError::Conflict`] if it already exists.
    async fn put(&self, observed: ObservedState, expected_version: u64)
        -> Result<u64, StoreError>;

    /// Remove observed state if the stored version equals `expected_version`
    async fn delete_observed(&self, key: &ObjectKey, expected_version: u64)
        -> Result<(), StoreError>;

    /// List desired state of `kind`, optionally restricted to one namespace
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DesiredState>, StoreError>;

    /// List observed state of `kind`, optionally restricted to one namespace
    async fn list_observed(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ObservedState>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Added => "added",
            EventType::Modified => "modified",
            EventType::Deleted => "deleted",
        }
    }
}

/// Change notification. Carries a key only; receivers must re-read state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub key: ObjectKey,
    pub event_type: EventType,
}

/// Subscription to change notifications
///
/// Delivery is at-least-once and may be reordered; a lagging subscriber may
/// miss events, which the periodic resync repairs.
pub trait EventFeed: Send + Sync {
    fn subscribe(&self, kind: ResourceKind) -> BoxStream<'static, WatchEvent>;
}
