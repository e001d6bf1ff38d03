//! # In-Memory Store
//!
//! Process-local [`ObjectStore`] and [`EventFeed`] used by the controller
//! binary and by tests.
//!
//! Besides the controller-facing trait it exposes the external-actor surface:
//! manifest apply/delete of desired state and field writes from external
//! status reporters. It also supports fault injection (unavailability and
//! version conflicts) for exercising the controller's retry paths.

use super::{
    EventFeed, EventType, ObjectStore, StoreError, StoredObject, WatchEvent, ABSENT_VERSION,
};
use crate::constants::DEFAULT_EVENT_CHANNEL_CAPACITY;
use crate::observability;
use crate::resource::{fields, DesiredState, ObjectKey, ObservedState, ResourceKind};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Entry {
    desired: Option<DesiredState>,
    observed: Option<ObservedState>,
    version: u64,
    /// Highest generation ever assigned to this key
    last_generation: i64,
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<ObjectKey, Entry>,
    next_version: u64,
}

impl Inner {
    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

/// In-memory object store with a broadcast watch feed
#[derive(Debug)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<WatchEvent>,
    unavailable: AtomicBool,
    put_conflicts: AtomicU32,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(Inner::default()),
            events,
            unavailable: AtomicBool::new(false),
            put_conflicts: AtomicU32::new(0),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("store lock poisoned: {e}")))
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(StoreError::Unavailable("injected outage".to_string()))
        } else {
            Ok(())
        }
    }

    fn emit(&self, key: ObjectKey, event_type: EventType) {
        debug!(resource = %key, event = event_type.as_str(), "store.event");
        // No subscribers is fine: resync picks everything up later
        let _ = self.events.send(WatchEvent { key, event_type });
    }

    /// Simulate an outage: every controller-facing call fails with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Make the next `count` calls to `put` fail with a version conflict
    pub fn inject_put_conflicts(&self, count: u32) {
        self.put_conflicts.store(count, Ordering::Relaxed);
    }

    /// Submit desired state (manifest apply)
    ///
    /// A changed spec increments `generation`; re-applying an identical spec is
    /// a no-op. Recreating a key whose observed state still exists continues
    /// its generation sequence so `observedGeneration <= generation` holds.
    pub fn apply(&self, mut desired: DesiredState) -> Result<DesiredState, StoreError> {
        let key = desired.key();
        let (stored, event_type) = {
            let mut inner = self.lock()?;
            let entry = inner.objects.entry(key.clone()).or_default();
            if let Some(existing) = &entry.desired {
                if existing.spec == desired.spec {
                    return Ok(existing.clone());
                }
            }
            let event_type = if entry.desired.is_some() {
                EventType::Modified
            } else {
                EventType::Added
            };
            let floor = entry
                .observed
                .as_ref()
                .map_or(0, |o| o.observed_generation)
                .max(entry.last_generation);
            desired.generation = floor + 1;
            entry.last_generation = desired.generation;
            entry.desired = Some(desired.clone());
            (desired, event_type)
        };
        self.emit(key, event_type);
        Ok(stored)
    }

    /// Remove desired state. The observed state stays until finalization.
    pub fn delete_desired(&self, key: &ObjectKey) -> Result<bool, StoreError> {
        let removed = {
            let mut inner = self.lock()?;
            let removed = inner
                .objects
                .get_mut(key)
                .and_then(|entry| entry.desired.take())
                .is_some();
            if inner
                .objects
                .get(key)
                .is_some_and(|e| e.desired.is_none() && e.observed.is_none())
            {
                inner.objects.remove(key);
            }
            removed
        };
        if removed {
            self.emit(key.clone(), EventType::Deleted);
        }
        Ok(removed)
    }

    /// Write one status field on behalf of an external manager
    ///
    /// The manager takes ownership of `path`; the controller will not fight it.
    pub fn report_status(
        &self,
        key: &ObjectKey,
        path: &str,
        value: serde_json::Value,
        manager: &str,
    ) -> Result<u64, StoreError> {
        let version = {
            let mut inner = self.lock()?;
            let version = inner.bump_version();
            let entry = inner.objects.entry(key.clone()).or_default();
            let observed = entry.observed.get_or_insert_with(|| ObservedState::new(key));
            fields::set(&mut observed.status, path, value);
            observed
                .managed_fields
                .insert(path.to_string(), manager.to_string());
            entry.version = version;
            version
        };
        self.emit(key.clone(), EventType::Modified);
        Ok(version)
    }

    /// Current desired state of `key`, if any
    pub fn desired(&self, key: &ObjectKey) -> Option<DesiredState> {
        self.lock()
            .ok()
            .and_then(|inner| inner.objects.get(key).and_then(|e| e.desired.clone()))
    }

    /// Current observed state of `key`, if any
    pub fn observed(&self, key: &ObjectKey) -> Option<ObservedState> {
        self.lock()
            .ok()
            .and_then(|inner| inner.objects.get(key).and_then(|e| e.observed.clone()))
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<StoredObject, StoreError> {
        self.check_available()?;
        let inner = self.lock()?;
        Ok(inner
            .objects
            .get(key)
            .map(|entry| StoredObject {
                desired: entry.desired.clone(),
                observed: entry.observed.clone(),
                version: if entry.observed.is_some() {
                    entry.version
                } else {
                    ABSENT_VERSION
                },
            })
            .unwrap_or_default())
    }

    async fn put(
        &self,
        observed: ObservedState,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        let key = observed.key();

        let injected = self
            .put_conflicts
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();

        let (version, event_type) = {
            let mut inner = self.lock()?;
            let actual = inner
                .objects
                .get(&key)
                .filter(|e| e.observed.is_some())
                .map_or(ABSENT_VERSION, |e| e.version);
            if injected || actual != expected_version {
                return Err(StoreError::Conflict {
                    key,
                    expected: expected_version,
                    actual,
                });
            }
            let version = inner.bump_version();
            let entry = inner.objects.entry(key.clone()).or_default();
            let event_type = if entry.observed.is_some() {
                EventType::Modified
            } else {
                EventType::Added
            };
            entry.observed = Some(observed);
            entry.version = version;
            (version, event_type)
        };
        self.emit(key, event_type);
        Ok(version)
    }

    async fn delete_observed(
        &self,
        key: &ObjectKey,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        {
            let mut inner = self.lock()?;
            let Some(entry) = inner.objects.get_mut(key) else {
                return Ok(());
            };
            if entry.observed.is_none() {
                return Ok(());
            }
            if entry.version != expected_version {
                return Err(StoreError::Conflict {
                    key: key.clone(),
                    expected: expected_version,
                    actual: entry.version,
                });
            }
            entry.observed = None;
            entry.version = ABSENT_VERSION;
            if entry.desired.is_none() {
                inner.objects.remove(key);
            }
        }
        self.emit(key.clone(), EventType::Deleted);
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DesiredState>, StoreError> {
        self.check_available()?;
        let inner = self.lock()?;
        let mut out: Vec<DesiredState> = inner
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind && namespace.is_none_or(|ns| key.namespace == ns))
            .filter_map(|(_, entry)| entry.desired.clone())
            .collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(out)
    }

    async fn list_observed(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ObservedState>, StoreError> {
        self.check_available()?;
        let inner = self.lock()?;
        let mut out: Vec<ObservedState> = inner
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind && namespace.is_none_or(|ns| key.namespace == ns))
            .filter_map(|(_, entry)| entry.observed.clone())
            .collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(out)
    }
}

impl EventFeed for InMemoryStore {
    fn subscribe(&self, kind: ResourceKind) -> BoxStream<'static, WatchEvent> {
        let rx = self.events.subscribe();
        futures::stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.key.kind == kind => return Some((event, rx)),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            kind = %kind,
                            skipped,
                            "Watch subscriber lagged; missed events will be repaired by resync"
                        );
                        observability::metrics::increment_watch_lagged(kind.as_str());
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
