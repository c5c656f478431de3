//! Redaction of sensitive values.

use crate::resource::split_api_version;
use crate::value::{Map, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const REDACTED: &str = "***";
const REDACTED_BEFORE: &str = "*** (before)";
const REDACTED_AFTER: &str = "*** (after)";

pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// SensitiveRule marks dotted paths of one kind as sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitiveRule {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    pub paths: Vec<String>,
}

impl SensitiveRule {
    pub fn new(group: impl Into<String>, kind: impl Into<String>, paths: &[&str]) -> Self {
        SensitiveRule {
            group: group.into(),
            kind: kind.into(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn matches(&self, object: &Value) -> bool {
        let kind = object.get_nested_str(&["kind"]).unwrap_or_default();
        let (group, _) = split_api_version(object.get_nested_str(&["apiVersion"]).unwrap_or_default());
        self.kind == kind && self.group == group
    }

    fn fields(&self) -> impl Iterator<Item = Vec<&str>> {
        self.paths.iter().map(|p| p.split('.').collect())
    }
}

/// Masker replaces sensitive values with a redaction marker. Keys are kept,
/// so a masked object still shows which entries exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Masker {
    pub rules: Vec<SensitiveRule>,
    /// Annotations whose values are masked on every kind.
    pub annotations: Vec<String>,
}

impl Default for Masker {
    fn default() -> Self {
        Masker {
            rules: vec![SensitiveRule::new("", "Secret", &["data", "stringData"])],
            annotations: vec![LAST_APPLIED_ANNOTATION.to_string()],
        }
    }
}

impl Masker {
    pub fn new(rules: Vec<SensitiveRule>, annotations: Vec<String>) -> Self {
        Masker { rules, annotations }
    }

    /// A masker that masks nothing.
    pub fn disabled() -> Self {
        Masker::new(Vec::new(), Vec::new())
    }

    /// Returns true when the object carries sensitive paths.
    pub fn is_sensitive(&self, object: &Value) -> bool {
        self.rules.iter().any(|rule| rule.matches(object))
    }

    /// Returns a copy of `object` with every sensitive value replaced.
    pub fn mask(&self, object: &Value) -> Value {
        let mut masked = object.clone();
        for fields in self.sensitive_fields(object) {
            if let Some(target) = masked.get_nested_mut(&fields) {
                redact(target, REDACTED);
            }
        }
        masked
    }

    /// Masks two versions of the same object. Values that differ between the
    /// two are marked `*** (before)` and `*** (after)` so a diff of the masked
    /// pair still shows which keys changed.
    pub fn mask_pair(&self, before: &Value, after: &Value) -> (Value, Value) {
        let mut masked_before = before.clone();
        let mut masked_after = after.clone();

        let mut fields: Vec<Vec<&str>> = self.sensitive_fields(before);
        for f in self.sensitive_fields(after) {
            if !fields.contains(&f) {
                fields.push(f);
            }
        }

        for fields in fields {
            let b = masked_before.get_nested_mut(&fields);
            let a = masked_after.get_nested_mut(&fields);
            match (b, a) {
                (Some(b), Some(a)) => redact_pair(b, a),
                (Some(b), None) => redact(b, REDACTED),
                (None, Some(a)) => redact(a, REDACTED),
                (None, None) => {}
            }
        }
        (masked_before, masked_after)
    }

    fn sensitive_fields<'a>(&'a self, object: &Value) -> Vec<Vec<&'a str>> {
        let mut fields: Vec<Vec<&str>> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(object))
            .flat_map(SensitiveRule::fields)
            .collect();
        for annotation in &self.annotations {
            fields.push(vec!["metadata", "annotations", annotation.as_str()]);
        }
        fields
    }
}

fn redact(value: &mut Value, marker: &str) {
    match value {
        Value::Null => {}
        Value::Map(map) => {
            for (_, v) in map.iter_mut() {
                *v = marker.into();
            }
        }
        other => *other = marker.into(),
    }
}

fn redact_pair(before: &mut Value, after: &mut Value) {
    match (before, after) {
        (Value::Map(b), Value::Map(a)) => {
            let keys: BTreeSet<String> = b.keys().chain(a.keys()).cloned().collect();
            for key in keys {
                let (old, new) = markers(b.get(&key), a.get(&key));
                set_if_present(b, &key, old);
                set_if_present(a, &key, new);
            }
        }
        (b, a) => {
            let (old, new) = markers(Some(&*b), Some(&*a));
            if !b.is_null() {
                *b = old.into();
            }
            if !a.is_null() {
                *a = new.into();
            }
        }
    }
}

fn markers(before: Option<&Value>, after: Option<&Value>) -> (&'static str, &'static str) {
    match (before, after) {
        (Some(b), Some(a)) if b != a => (REDACTED_BEFORE, REDACTED_AFTER),
        _ => (REDACTED, REDACTED),
    }
}

fn set_if_present(map: &mut Map, key: &str, marker: &str) {
    if let Some(v) = map.get_mut(key) {
        *v = marker.into();
    }
}
