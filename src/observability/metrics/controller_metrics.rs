//! # Controller Metrics
//!
//! Metrics for controller operations: reconciliations, actions, errors, requeues
//! and the degraded health flag.

use crate::observability::metrics::registry::register;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

// Controller reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "reconcile_controller_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "reconcile_controller_reconciliation_errors_total",
            "Total number of reconciliation errors by error class",
        ),
        &["class"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "reconcile_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Action metrics
static ACTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "reconcile_controller_actions_total",
            "Total number of actions applied to the object store",
        ),
        &["action"],
    )
    .expect("Failed to create ACTIONS_TOTAL metric - this should never happen")
});

static CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "reconcile_controller_version_conflicts_total",
        "Total number of optimistic concurrency conflicts seen by the executor",
    )
    .expect("Failed to create CONFLICTS_TOTAL metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "reconcile_controller_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static DEGRADED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "reconcile_controller_degraded",
        "1 if a fatal reconcile error has been observed since startup",
    )
    .expect("Failed to create DEGRADED metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_DURATION.clone()))?;
    register(Box::new(ACTIONS_TOTAL.clone()))?;
    register(Box::new(CONFLICTS_TOTAL.clone()))?;
    register(Box::new(REQUEUES_TOTAL.clone()))?;
    register(Box::new(DEGRADED.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(class: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[class]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_actions(action: &str) {
    ACTIONS_TOTAL.with_label_values(&[action]).inc();
}

pub fn increment_conflicts() {
    CONFLICTS_TOTAL.inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn set_degraded(degraded: bool) {
    DEGRADED.set(i64::from(degraded));
}
