//! # Work Queue
//!
//! Deduplicating, rate-limited queue of reconcile keys with per-key single-flight.
//!
//! ## Guarantees
//!
//! - **Deduplication**: enqueueing a key that is already waiting is a no-op, so a
//!   burst of updates collapses into one reconcile.
//! - **Single-flight**: a key handed out by [`WorkQueue::dequeue`] is not handed out
//!   again until [`WorkQueue::done`] is called. Enqueues that arrive meanwhile mark
//!   the key dirty and it is re-queued once processing finishes.
//! - **Delayed retries**: [`WorkQueue::requeue_after`] schedules a key for later; the
//!   earliest pending schedule wins. [`WorkQueue::requeue_rate_limited`] uses the
//!   per-key exponential backoff.
//! - **Shutdown**: after [`WorkQueue::shut_down`] no keys are accepted and every
//!   `dequeue` returns `None`, so workers finish their current key and stop.
//!
//! The queue never touches objects; it is purely key bookkeeping.

use crate::controller::backoff::{ExponentialBackoff, KeyedBackoff};
use crate::observability;
use crate::resource::ObjectKey;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct QueueState {
    /// Keys ready to be handed out, in FIFO order
    ready: VecDeque<ObjectKey>,
    /// Keys waiting in `ready` or waiting for their current processing to end
    dirty: HashSet<ObjectKey>,
    /// Keys currently held by a worker
    processing: HashSet<ObjectKey>,
    /// Pending delayed requeues; entries superseded in `scheduled` are stale
    delayed: BinaryHeap<Reverse<(Instant, u64, ObjectKey)>>,
    /// Earliest pending requeue per key
    scheduled: HashMap<ObjectKey, Instant>,
    seq: u64,
    backoff: KeyedBackoff<ObjectKey>,
    shutting_down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddOutcome {
    Queued,
    Deferred,
    Deduplicated,
}

impl AddOutcome {
    fn as_str(self) -> &'static str {
        match self {
            AddOutcome::Queued => "queued",
            AddOutcome::Deferred => "deferred",
            AddOutcome::Deduplicated => "deduplicated",
        }
    }
}

impl QueueState {
    fn add(&mut self, key: ObjectKey) -> AddOutcome {
        if self.dirty.contains(&key) {
            return AddOutcome::Deduplicated;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return AddOutcome::Deferred;
        }
        self.ready.push_back(key);
        AddOutcome::Queued
    }

    /// Move every due delayed key into `ready`
    fn promote_due(&mut self, now: Instant) {
        while let Some(Reverse((at, _, _))) = self.delayed.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((at, _, key))) = self.delayed.pop() else {
                break;
            };
            if self.scheduled.get(&key) == Some(&at) {
                self.scheduled.remove(&key);
                self.add(key);
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.delayed.peek().map(|Reverse((at, _, _))| *at)
    }
}

/// Shared work queue feeding the reconcile workers
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                delayed: BinaryHeap::new(),
                scheduled: HashMap::new(),
                seq: 0,
                backoff: KeyedBackoff::new(backoff),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    // Bookkeeping stays consistent under every early return, so a poisoned
    // lock is safe to keep using.
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `key` for immediate processing
    ///
    /// Returns `false` if the key was already waiting or the queue is shutting down.
    pub fn enqueue(&self, key: ObjectKey) -> bool {
        let outcome = {
            let mut state = self.state();
            if state.shutting_down {
                observability::metrics::increment_queue_adds("rejected");
                return false;
            }
            let outcome = state.add(key);
            observability::metrics::set_queue_depth(state.ready.len());
            outcome
        };
        observability::metrics::increment_queue_adds(outcome.as_str());
        if outcome == AddOutcome::Queued {
            self.notify.notify_one();
        }
        outcome != AddOutcome::Deduplicated
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn dequeue(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.ready.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    observability::metrics::set_queue_depth(state.ready.len());
                    let more = !state.ready.is_empty() || !state.delayed.is_empty();
                    drop(state);
                    if more {
                        // Hand remaining work (or the timer) to another idle worker
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
                state.next_deadline()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Mark processing of `key` as finished
    ///
    /// If the key was enqueued while it was being processed it becomes ready again.
    pub fn done(&self, key: &ObjectKey) {
        let requeued = {
            let mut state = self.state();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.ready.push_back(key.clone());
                observability::metrics::set_queue_depth(state.ready.len());
                true
            } else {
                false
            }
        };
        if requeued {
            debug!(resource = %key, "Key changed while processing; requeued");
            self.notify.notify_one();
        }
    }

    /// Schedule `key` to be enqueued after `delay`
    pub fn requeue_after(&self, key: ObjectKey, delay: Duration) {
        if delay.is_zero() {
            self.enqueue(key);
            return;
        }
        {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            let at = Instant::now() + delay;
            if state.scheduled.get(&key).is_some_and(|existing| *existing <= at) {
                return;
            }
            state.seq += 1;
            let seq = state.seq;
            state.scheduled.insert(key.clone(), at);
            state.delayed.push(Reverse((at, seq, key)));
        }
        // Let a sleeping worker pick up the new deadline
        self.notify.notify_one();
    }

    /// Schedule `key` after its per-key exponential backoff and return the delay used
    pub fn requeue_rate_limited(&self, key: ObjectKey) -> Duration {
        let delay = self.state().backoff.next_delay(key.clone());
        self.requeue_after(key, delay);
        delay
    }

    /// Like [`WorkQueue::requeue_rate_limited`], but never waits longer than `cap`
    ///
    /// The failure count still grows, so the delay climbs to `cap` and stays there.
    pub fn requeue_rate_limited_capped(&self, key: ObjectKey, cap: Duration) -> Duration {
        let delay = self.state().backoff.next_delay(key.clone()).min(cap);
        self.requeue_after(key, delay);
        delay
    }

    /// Reset the backoff of `key` after a successful reconcile
    pub fn forget(&self, key: &ObjectKey) {
        self.state().backoff.forget(key);
    }

    /// Consecutive rate-limited requeues of `key`
    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.state().backoff.failures(key)
    }

    /// Stop accepting keys and release every waiting `dequeue`
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Keys ready to be handed out right now
    pub fn len(&self) -> usize {
        self.state().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with a pending delayed requeue
    pub fn scheduled_len(&self) -> usize {
        self.state().scheduled.len()
    }
}
