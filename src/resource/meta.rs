//! Accessors for well-known object metadata.

use crate::value::{Map, Value};
use std::collections::BTreeMap;

/// Metadata fields the server maintains on every object.
pub const SERVER_METADATA_FIELDS: &[&str] = &[
    "managedFields",
    "resourceVersion",
    "uid",
    "generation",
    "creationTimestamp",
];

pub fn labels(object: &Value) -> Option<&Map> {
    object.get_nested_map(&["metadata", "labels"])
}

pub fn annotations(object: &Value) -> Option<&Map> {
    object.get_nested_map(&["metadata", "annotations"])
}

/// Returns true when any of the `selector` pairs is set on the object, as a
/// label or as an annotation.
pub fn matches_any(object: &Value, selector: &BTreeMap<String, String>) -> bool {
    let has = |map: Option<&Map>, key: &str, value: &str| {
        map.and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .is_some_and(|v| v == value)
    };
    selector.iter().any(|(key, value)| {
        has(labels(object), key, value) || has(annotations(object), key, value)
    })
}

/// A copy of `object` without server-maintained metadata and status.
pub fn strip_server_fields(object: &Value) -> Value {
    let mut stripped = object.clone();
    if let Some(metadata) = stripped.get_nested_mut(&["metadata"]).and_then(Value::as_map_mut) {
        for field in SERVER_METADATA_FIELDS {
            metadata.delete(field);
        }
    }
    if let Some(root) = stripped.as_map_mut() {
        root.delete("status");
    }
    stripped
}
