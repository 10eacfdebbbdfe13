//! Dotted-path access into rows
//!
//! A literal top-level key wins over path traversal, so flat keys that
//! contain dots (common in CSV headers) stay addressable.

use serde_json::{Map, Value};

use crate::models::Row;

pub fn get_path<'a>(row: &'a Row, path: &str) -> Option<&'a Value> {
    if let Some(value) = row.get(path) {
        return Some(value);
    }
    let mut segments = path.split('.');
    let mut current = row.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

pub fn remove_path(row: &mut Row, path: &str) -> Option<Value> {
    if let Some(value) = row.remove(path) {
        return Some(value);
    }
    let (parent, leaf) = path.rsplit_once('.')?;
    let mut current = row.get_mut(parent.split('.').next()?)?;
    for segment in parent.split('.').skip(1) {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    current.as_object_mut()?.remove(leaf)
}

/// Write `value` at `path`, creating intermediate objects as needed
pub fn set_path(row: &mut Row, path: &str, value: Value) {
    if !path.contains('.') || row.contains_key(path) {
        row.insert(path.to_string(), value);
        return;
    }
    let segments: Vec<&str> = path.split('.').collect();
    let (leaf, parents) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };
    let mut current: &mut Map<String, Value> = row;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry.as_object_mut() {
            Some(map) => map,
            None => return,
        };
    }
    current.insert(leaf.to_string(), value);
}

/// Paths of all non-object values, nested keys joined with '.'
pub fn leaf_paths(row: &Row) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(row, "", &mut paths);
    paths
}

fn collect_paths(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => collect_paths(inner, &path, out),
            _ => out.push(path),
        }
    }
}
