//! # Watch Loop
//!
//! Wires the event feed, the work queue and the reconcile workers together.
//!
//! - One pump task per resource kind forwards watch events into the queue.
//! - A resync task re-enqueues every known key on a fixed interval, repairing
//!   dropped or reordered events.
//! - `worker_count` workers pull keys and reconcile them. The queue guarantees a
//!   key is never reconciled by two workers at once.
//!
//! A panicking reconcile is caught and treated as a fatal error for that key;
//! the worker keeps running.

use crate::config::ControllerConfig;
use crate::controller::backoff::ExponentialBackoff;
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::observability;
use crate::resource::{ObjectKey, ResourceKind};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_reconciliation_success};
use crate::store::{EventFeed, ObjectStore, StoreError};
use anyhow::Result;
use futures::{FutureExt, StreamExt};
use std::collections::BTreeSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};

/// A running control loop over one store
pub struct Controller {
    store: Arc<dyn ObjectStore>,
    feed: Arc<dyn EventFeed>,
    queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: ControllerConfig,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("queue", &self.queue)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new<S>(store: Arc<S>, config: ControllerConfig, server_state: Arc<ServerState>) -> Self
    where
        S: ObjectStore + EventFeed + 'static,
    {
        let queue = Arc::new(WorkQueue::new(ExponentialBackoff::new(
            config.backoff_base(),
            config.backoff_max(),
        )));
        let object_store: Arc<dyn ObjectStore> = Arc::clone(&store) as Arc<dyn ObjectStore>;
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&object_store), config.clone()));
        Self {
            store: object_store,
            feed: store,
            queue,
            reconciler,
            server_state,
            config,
        }
    }

    /// The queue feeding this controller's workers
    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Run until `shutdown` resolves, then drain in-flight reconciles and return
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        // Subscribe before listing so nothing written in between is missed
        let feeds: Vec<_> = ResourceKind::ALL
            .iter()
            .map(|kind| (*kind, self.feed.subscribe(*kind)))
            .collect();

        match resync(self.store.as_ref(), &self.queue).await {
            Ok(count) => info!(keys = count, "Startup listing queued"),
            Err(e) => warn!(error = %e, "Startup listing failed; relying on watch events and resync"),
        }
        self.server_state.mark_synced();

        let mut background = JoinSet::new();
        for (kind, mut events) in feeds {
            let queue = Arc::clone(&self.queue);
            background.spawn(
                async move {
                    while let Some(event) = events.next().await {
                        observability::metrics::increment_watch_events(
                            kind.as_str(),
                            event.event_type.as_str(),
                        );
                        if !queue.enqueue(event.key) && queue.is_shutting_down() {
                            break;
                        }
                    }
                    debug!("Watch feed closed");
                }
                .instrument(tracing::info_span!("controller.watch", kind = %kind)),
            );
        }

        let resync_interval = self.config.resync_interval();
        if !resync_interval.is_zero() {
            let store = Arc::clone(&self.store);
            let queue = Arc::clone(&self.queue);
            background.spawn(async move {
                let mut ticker = tokio::time::interval(resync_interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match resync(store.as_ref(), &queue).await {
                        Ok(count) => debug!(keys = count, "Periodic resync queued"),
                        Err(e) => warn!(error = %e, "Periodic resync failed"),
                    }
                }
            });
        }

        let mut workers = JoinSet::new();
        for id in 0..self.config.worker_count.max(1) {
            let queue = Arc::clone(&self.queue);
            let reconciler = Arc::clone(&self.reconciler);
            let server_state = Arc::clone(&self.server_state);
            workers.spawn(
                async move {
                    while let Some(key) = queue.dequeue().await {
                        process_key(&key, &reconciler, &queue, &server_state).await;
                        queue.done(&key);
                    }
                    debug!("Worker stopped");
                }
                .instrument(tracing::info_span!("controller.worker", worker = id)),
            );
        }
        info!(
            workers = self.config.worker_count.max(1),
            resync_secs = resync_interval.as_secs(),
            "Controller running"
        );

        shutdown.await;
        info!("Shutdown requested; draining in-flight reconciles");
        self.queue.shut_down();
        background.abort_all();

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }
        while background.join_next().await.is_some() {}
        info!("Controller stopped");
        Ok(())
    }
}

/// Enqueue every key that has desired or observed state
///
/// Observed-only keys are included so orphans left by a missed delete event
/// still get finalized.
pub async fn resync(store: &dyn ObjectStore, queue: &WorkQueue) -> Result<usize, StoreError> {
    let mut keys = BTreeSet::new();
    for kind in ResourceKind::ALL {
        keys.extend(store.list(kind, None).await?.iter().map(|d| d.key()));
        keys.extend(store.list_observed(kind, None).await?.iter().map(|o| o.key()));
    }
    let count = keys.len();
    for key in keys {
        queue.enqueue(key);
    }
    observability::metrics::increment_resyncs();
    Ok(count)
}

/// Reconcile one key and apply the requeue policy to the result
pub async fn process_key(
    key: &ObjectKey,
    reconciler: &Reconciler,
    queue: &WorkQueue,
    server_state: &ServerState,
) {
    let result = AssertUnwindSafe(reconcile(key, reconciler))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ReconcilerError::Fatal(format!("reconcile panicked: {message}")))
        });

    match result {
        Ok(outcome) => {
            handle_reconciliation_success(key, &outcome, queue);
        }
        Err(e) => {
            handle_reconciliation_error(key, &e, queue, &reconciler.config, server_state);
        }
    }
}
