//! # Queue Metrics
//!
//! Metrics for the work queue and the watch feed.

use crate::observability::metrics::registry::register;
use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "reconcile_controller_queue_depth",
        "Number of keys waiting to be reconciled",
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

static QUEUE_ADDS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "reconcile_controller_queue_adds_total",
            "Total number of enqueue calls by outcome (queued, deduplicated, rejected)",
        ),
        &["outcome"],
    )
    .expect("Failed to create QUEUE_ADDS_TOTAL metric - this should never happen")
});

static WATCH_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "reconcile_controller_watch_events_total",
            "Total number of watch events received",
        ),
        &["kind", "event"],
    )
    .expect("Failed to create WATCH_EVENTS_TOTAL metric - this should never happen")
});

static WATCH_LAGGED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "reconcile_controller_watch_lagged_total",
            "Number of times a watch subscriber fell behind and skipped events",
        ),
        &["kind"],
    )
    .expect("Failed to create WATCH_LAGGED_TOTAL metric - this should never happen")
});

static RESYNCS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "reconcile_controller_resyncs_total",
        "Total number of periodic full resyncs",
    )
    .expect("Failed to create RESYNCS_TOTAL metric - this should never happen")
});

pub(crate) fn register_queue_metrics() -> Result<()> {
    register(Box::new(QUEUE_DEPTH.clone()))?;
    register(Box::new(QUEUE_ADDS_TOTAL.clone()))?;
    register(Box::new(WATCH_EVENTS_TOTAL.clone()))?;
    register(Box::new(WATCH_LAGGED_TOTAL.clone()))?;
    register(Box::new(RESYNCS_TOTAL.clone()))?;
    Ok(())
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}

pub fn increment_queue_adds(outcome: &str) {
    QUEUE_ADDS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_watch_events(kind: &str, event: &str) {
    WATCH_EVENTS_TOTAL.with_label_values(&[kind, event]).inc();
}

pub fn increment_watch_lagged(kind: &str) {
    WATCH_LAGGED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_resyncs() {
    RESYNCS_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_watch_events() {
        let before = WATCH_EVENTS_TOTAL
            .with_label_values(&["Deployment", "added"])
            .get();
        increment_watch_events("Deployment", "added");
        let after = WATCH_EVENTS_TOTAL
            .with_label_values(&["Deployment", "added"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_increment_resyncs() {
        let before = RESYNCS_TOTAL.get();
        increment_resyncs();
        assert!(RESYNCS_TOTAL.get() > before);
    }
}
