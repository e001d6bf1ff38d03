//! # Controller Loop Tests
//!
//! Run the full control loop (watch feed, work queue, worker pool) against an
//! in-memory store and wait for it to converge.

mod common;

use async_trait::async_trait;
use common::{is_converged, key, seeded_store, test_config, voting_app, voting_deployment};
use futures::stream::{self, BoxStream, StreamExt};
use reconcile_controller::config::ControllerConfig;
use reconcile_controller::controller::queue::WorkQueue;
use reconcile_controller::controller::server::ServerState;
use reconcile_controller::resource::{ConfigMapSpec, ResourceKind, CONDITION_STALLED};
use reconcile_controller::runtime::watch_loop::Controller;
use reconcile_controller::store::{
    EventFeed, InMemoryStore, ObjectStore, StoreError, StoredObject, WatchEvent,
};
use reconcile_controller::{
    ConditionStatus, DesiredState, ObjectKey, ObservedState, ResourceSpec,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// In-memory store with injectable watch and read faults
struct FaultyStore {
    inner: Arc<InMemoryStore>,
    /// Drop every watch event
    deaf: bool,
    /// Reads of this key panic
    poisoned: Option<ObjectKey>,
}

impl FaultyStore {
    fn deaf(inner: &Arc<InMemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::clone(inner),
            deaf: true,
            poisoned: None,
        })
    }

    fn poisoned(inner: &Arc<InMemoryStore>, key: ObjectKey) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::clone(inner),
            deaf: false,
            poisoned: Some(key),
        })
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn get(&self, key: &ObjectKey) -> Result<StoredObject, StoreError> {
        if self.poisoned.as_ref() == Some(key) {
            panic!("read of {key} blew up");
        }
        self.inner.get(key).await
    }

    async fn put(
        &self,
        observed: ObservedState,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.inner.put(observed, expected_version).await
    }

    async fn delete_observed(
        &self,
        key: &ObjectKey,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        self.inner.delete_observed(key, expected_version).await
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DesiredState>, StoreError> {
        self.inner.list(kind, namespace).await
    }

    async fn list_observed(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ObservedState>, StoreError> {
        self.inner.list_observed(kind, namespace).await
    }
}

impl EventFeed for FaultyStore {
    fn subscribe(&self, kind: ResourceKind) -> BoxStream<'static, WatchEvent> {
        if self.deaf {
            stream::pending::<WatchEvent>().boxed()
        } else {
            self.inner.subscribe(kind)
        }
    }
}

struct Running {
    server_state: Arc<ServerState>,
    queue: Arc<WorkQueue>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

fn start<S>(store: &Arc<S>, config: ControllerConfig) -> Running
where
    S: ObjectStore + EventFeed + 'static,
{
    let server_state = Arc::new(ServerState::default());
    let controller = Controller::new(Arc::clone(store), config, Arc::clone(&server_state));
    let queue = controller.queue();
    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(controller.run(async move {
        let _ = rx.await;
    }));
    Running {
        server_state,
        queue,
        shutdown,
        handle,
    }
}

impl Running {
    fn is_synced(&self) -> bool {
        self.server_state.is_synced.load(Ordering::Relaxed)
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("controller did not stop in time")
            .expect("controller task panicked")
            .expect("controller returned an error");
    }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_controller_converges_voting_app() {
    let store = seeded_store();
    let running = start(&store, test_config());

    eventually("voting app convergence", || is_converged(&store)).await;
    assert!(running.is_synced());
    assert!(!running.server_state.is_degraded());

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_controller_follows_spec_changes() {
    let store = seeded_store();
    let running = start(&store, test_config());
    eventually("initial convergence", || is_converged(&store)).await;

    let voting = key(ResourceKind::Deployment, "voting");
    store.apply(voting_deployment(3)).unwrap();
    eventually("replicas update", || {
        store
            .observed(&voting)
            .is_some_and(|o| o.status["replicas"] == 3 && o.is_converged(2))
    })
    .await;

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_controller_unwinds_deleted_app() {
    let store = seeded_store();
    let running = start(&store, test_config());
    eventually("initial convergence", || is_converged(&store)).await;

    for desired in voting_app() {
        store.delete_desired(&desired.key()).unwrap();
    }
    eventually("finalization of every resource", || {
        voting_app().iter().all(|d| store.observed(&d.key()).is_none())
    })
    .await;

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_resource_is_stalled_not_retried() {
    let store = Arc::new(InMemoryStore::new());
    let running = start(&store, test_config());

    let mut broken = voting_deployment(1);
    if let ResourceSpec::Deployment(spec) = &mut broken.spec {
        spec.config_refs.clear();
        spec.image = " ".to_string();
    }
    let voting = store.apply(broken).unwrap().key();
    eventually("Stalled condition", || {
        store.observed(&voting).is_some_and(|o| {
            o.condition(CONDITION_STALLED)
                .is_some_and(|c| c.status == ConditionStatus::True)
        })
    })
    .await;
    assert!(!running.server_state.is_degraded());

    // A corrected spec recovers once its ConfigMap exists
    let settings = key(ResourceKind::ConfigMap, "settings");
    store.apply(voting_deployment(1)).unwrap();
    store
        .apply(voting_app().into_iter().find(|d| d.key() == settings).unwrap())
        .unwrap();
    eventually("recovery", || {
        store.observed(&voting).is_some_and(|o| o.is_converged(2))
    })
    .await;

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resync_repairs_dropped_events() {
    let store = Arc::new(InMemoryStore::new());
    let config = ControllerConfig {
        resync_interval_secs: 1,
        ..test_config()
    };
    let running = start(&FaultyStore::deaf(&store), config);
    eventually("startup listing", || running.is_synced()).await;

    // Written after the startup listing, and no watch event ever arrives
    for desired in voting_app() {
        store.apply(desired).unwrap();
    }
    eventually("convergence through resync", || is_converged(&store)).await;

    for desired in voting_app() {
        store.delete_desired(&desired.key()).unwrap();
    }
    eventually("orphans finalized through resync", || {
        voting_app().iter().all(|d| store.observed(&d.key()).is_none())
    })
    .await;

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_reconcile_does_not_stop_the_worker() {
    let store = seeded_store();
    let broken = key(ResourceKind::Deployment, "voting");
    let config = ControllerConfig {
        worker_count: 1,
        ..test_config()
    };
    let running = start(&FaultyStore::poisoned(&store, broken.clone()), config);

    eventually("degraded health", || running.server_state.is_degraded()).await;
    eventually("every other resource converged", || {
        voting_app()
            .iter()
            .filter(|d| d.key() != broken)
            .all(|d| match (store.desired(&d.key()), store.observed(&d.key())) {
                (Some(desired), Some(observed)) => observed.is_converged(desired.generation),
                _ => false,
            })
    })
    .await;
    assert!(store.observed(&broken).is_none());

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shut_down_queue_takes_no_new_work() {
    let store = Arc::new(InMemoryStore::new());
    let running = start(&store, test_config());
    eventually("startup listing", || running.is_synced()).await;

    running.queue.shut_down();
    let settings = store
        .apply(DesiredState::new(
            "vote",
            "settings",
            ResourceSpec::ConfigMap(ConfigMapSpec::default()),
        ))
        .unwrap()
        .key();
    assert!(!running.queue.enqueue(settings.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(running.queue.is_empty());
    assert!(store.observed(&settings).is_none());
    running.stop().await;
}
