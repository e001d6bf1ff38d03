//! # Field Paths
//!
//! Key-path addressing for fields inside a JSON status object.
//!
//! Paths are rendered as JSON pointers (RFC 6901) so they can be used directly
//! with [`serde_json::Value::pointer`] and as `managedFields` keys. Objects are
//! traversed; arrays and scalars are leaves (lists are owned atomically).

use serde_json::{Map, Value};

/// Escape one pointer segment
fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Build a pointer from segments
pub fn pointer<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .map(|s| format!("/{}", escape(s.as_ref())))
        .collect()
}

/// Split a pointer into unescaped segments. The empty pointer has no segments.
pub fn segments(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    path.trim_start_matches('/')
        .split('/')
        .map(unescape)
        .collect()
}

/// Flatten `value` into `(pointer, leaf)` pairs in path order
pub fn leaves(value: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    collect_leaves(value, &mut Vec::new(), &mut out);
    out
}

fn collect_leaves(value: &Value, prefix: &mut Vec<String>, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !prefix.is_empty() && map.is_empty() => {
            out.push((pointer(prefix.iter()), value.clone()));
        }
        Value::Object(map) => {
            for (key, child) in map {
                prefix.push(key.clone());
                collect_leaves(child, prefix, out);
                prefix.pop();
            }
        }
        _ if prefix.is_empty() => {}
        _ => out.push((pointer(prefix.iter()), value.clone())),
    }
}

/// Set the field at `path`, creating intermediate objects as needed
///
/// Non-object intermediates are replaced by objects.
pub fn set(root: &mut Value, path: &str, leaf: Value) {
    let segs = segments(path);
    let Some((last, parents)) = segs.split_last() else {
        *root = leaf;
        return;
    };
    let mut cursor = root;
    for seg in parents {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        cursor = match cursor {
            Value::Object(map) => map
                .entry(seg.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if !cursor.is_object() {
        *cursor = Value::Object(Map::new());
    }
    if let Value::Object(map) = cursor {
        map.insert(last.clone(), leaf);
    }
}

/// Remove the field at `path` and prune parents left empty
///
/// Returns the removed value, if any.
pub fn remove(root: &mut Value, path: &str) -> Option<Value> {
    let segs = segments(path);
    remove_segments(root, &segs)
}

fn remove_segments(node: &mut Value, segs: &[String]) -> Option<Value> {
    let (first, rest) = segs.split_first()?;
    let Value::Object(map) = node else {
        return None;
    };
    if rest.is_empty() {
        return map.remove(first);
    }
    let child = map.get_mut(first)?;
    let removed = remove_segments(child, rest);
    if removed.is_some() && child.as_object().is_some_and(Map::is_empty) {
        map.remove(first);
    }
    removed
}
