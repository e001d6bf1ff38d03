//! # Reconcile Controller
//!
//! A declarative reconciliation controller that drives observed state toward
//! desired state for the resource kinds used by a small multi-service
//! application (Deployments, Services, Ingresses, ConfigMaps and Secrets).
//!
//! ## Overview
//!
//! The controller is a closed control loop:
//!
//! 1. **Event feed** - [`store::EventFeed`] delivers `{key, event}` notifications
//! 2. **Work queue** - [`controller::queue::WorkQueue`] deduplicates keys and
//!    guarantees at most one in-flight reconcile per key
//! 3. **Reconciler** - [`controller::reconciler::reconcile`] re-reads desired and
//!    observed state, diffs the fields it owns and plans [`controller::executor::Action`]s
//! 4. **Executor** - [`controller::executor::ActionExecutor`] applies each action
//!    to the [`store::ObjectStore`] with optimistic concurrency
//!
//! Writes to the store produce new events, closing the loop. Triggering is
//! level-based: a periodic resync re-enqueues every known key so a dropped
//! event is never fatal.

pub mod cli;
pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod resource;
pub mod runtime;
pub mod store;

pub use resource::{
    Condition, ConditionStatus, DesiredState, ObjectKey, ObservedState, ResourceKind,
    ResourceSpec,
};
