//! # Object Diff
//!
//! Structural diff between desired fields and observed status, restricted to the
//! fields a given manager owns.
//!
//! Ownership is tracked per key-path in `ObservedState.managed_fields`. A field
//! owned by another manager (a user edit, an autoscaler, a status reporter) is
//! never overwritten, and neither is anything nested under or above it.

use crate::resource::{fields, ObservedState};
use serde_json::Value;

/// One field-level change needed to converge
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    /// Write `value` at `path` and claim ownership of it
    Set { path: String, value: Value },
    /// Remove a field this manager owns that is no longer desired
    Remove { path: String },
}

impl FieldChange {
    pub fn path(&self) -> &str {
        match self {
            FieldChange::Set { path, .. } | FieldChange::Remove { path } => path,
        }
    }
}

/// Outcome of [`diff_owned`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDiff {
    /// Removals first, then sets, each in path order
    pub changes: Vec<FieldChange>,
    /// Desired fields left alone because another manager owns them: `(path, owner)`
    pub skipped: Vec<(String, String)>,
}

impl FieldDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// `child` is strictly below `parent`
fn nested(child: &str, parent: &str) -> bool {
    child.len() > parent.len()
        && child.starts_with(parent)
        && child.as_bytes().get(parent.len()) == Some(&b'/')
}

/// `a` equals `b` or one is nested inside the other
fn overlaps(a: &str, b: &str) -> bool {
    a == b || nested(a, b) || nested(b, a)
}

/// Manager other than `manager` owning `path` or an overlapping path
fn foreign_owner<'a>(observed: &'a ObservedState, path: &str, manager: &str) -> Option<&'a str> {
    observed
        .managed_fields
        .iter()
        .find(|(owned, owner)| owner.as_str() != manager && overlaps(owned, path))
        .map(|(_, owner)| owner.as_str())
}

/// Diff `desired` (the fields this manager wants) against `observed`
///
/// - A desired leaf that differs, or is not yet owned by `manager`, becomes a `Set`.
/// - A leaf owned by `manager` that is no longer desired becomes a `Remove`. The
///   removal releases ownership but keeps whatever another manager owns.
/// - Anything overlapping another manager's field is skipped.
/// - Observed fields nobody asked for and `manager` does not own are ignored.
pub fn diff_owned(desired: &Value, observed: &ObservedState, manager: &str) -> FieldDiff {
    let wanted = fields::leaves(desired);
    let mut diff = FieldDiff::default();

    for (path, owner) in &observed.managed_fields {
        if owner != manager || wanted.iter().any(|(p, _)| p == path) {
            continue;
        }
        diff.changes.push(FieldChange::Remove { path: path.clone() });
    }

    for (path, value) in wanted {
        if let Some(owner) = foreign_owner(observed, &path, manager) {
            diff.skipped.push((path, owner.to_string()));
            continue;
        }
        let owned = observed
            .managed_fields
            .get(&path)
            .is_some_and(|owner| owner == manager);
        if !owned || observed.status.pointer(&path) != Some(&value) {
            diff.changes.push(FieldChange::Set { path, value });
        }
    }

    diff
}

/// Apply one change to `observed` on behalf of `manager`
///
/// Returns `false` if the change was already in effect.
pub fn apply_change(observed: &mut ObservedState, change: &FieldChange, manager: &str) -> bool {
    match change {
        FieldChange::Set { path, value } => {
            let owned = observed
                .managed_fields
                .get(path)
                .is_some_and(|owner| owner == manager);
            if owned && observed.status.pointer(path) == Some(value) {
                return false;
            }
            fields::set(&mut observed.status, path, value.clone());
            observed
                .managed_fields
                .insert(path.clone(), manager.to_string());
            true
        }
        FieldChange::Remove { path } => {
            if observed.managed_fields.get(path).map(String::as_str) != Some(manager) {
                return false;
            }
            observed.managed_fields.remove(path);
            // A foreign parent owns the value too; only ownership is released
            if observed
                .managed_fields
                .iter()
                .any(|(owned, owner)| owner.as_str() != manager && nested(path, owned))
            {
                return true;
            }

            let kept: Vec<(String, Value)> = observed
                .managed_fields
                .iter()
                .filter(|(owned, owner)| owner.as_str() != manager && nested(owned, path))
                .filter_map(|(owned, _)| {
                    observed
                        .status
                        .pointer(owned)
                        .map(|value| (owned.clone(), value.clone()))
                })
                .collect();
            fields::remove(&mut observed.status, path);
            for (owned, value) in kept {
                fields::set(&mut observed.status, &owned, value);
            }
            true
        }
    }
}
