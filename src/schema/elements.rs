//! List semantics and the registry that resolves them by kind and path.

use crate::fieldpath::Path;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// ElementRelationship describes how the items of a list relate to each
/// other when objects are compared, merged and owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementRelationship {
    /// Items are maps identified by the values of their key fields.
    Associative,
    /// The list behaves as a single scalar value.
    #[default]
    Atomic,
    /// Items are scalars identified by their own value.
    Set,
}

/// ListRule assigns semantics to the lists found at one field path.
///
/// `path` is the dotted chain of map keys leading to the list with list hops
/// left out, so the ports of every container of a deployment live at
/// `spec.template.spec.containers.ports`. An empty `kinds` matches any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRule {
    pub path: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<String>,

    #[serde(default, rename = "elementRelationship")]
    pub relationship: ElementRelationship,

    /// Key fields of an associative list's items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,

    /// Whether reordering the items is a change.
    #[serde(default)]
    pub ordered: bool,
}

impl ListRule {
    pub fn associative(path: impl Into<String>, keys: &[&str]) -> Self {
        ListRule {
            path: path.into(),
            kinds: Vec::new(),
            relationship: ElementRelationship::Associative,
            keys: keys.iter().map(|k| k.to_string()).collect(),
            ordered: false,
        }
    }

    pub fn set(path: impl Into<String>) -> Self {
        ListRule {
            path: path.into(),
            kinds: Vec::new(),
            relationship: ElementRelationship::Set,
            keys: Vec::new(),
            ordered: false,
        }
    }

    pub fn atomic(path: impl Into<String>) -> Self {
        ListRule {
            path: path.into(),
            kinds: Vec::new(),
            relationship: ElementRelationship::Atomic,
            keys: Vec::new(),
            ordered: false,
        }
    }

    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    pub fn for_kinds(mut self, kinds: &[&str]) -> Self {
        self.kinds = kinds.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn applies_to(&self, kind: &str) -> bool {
        self.kinds.is_empty() || self.kinds.iter().any(|k| k == kind)
    }
}

/// Schema is an ordered list of list rules. When several rules match the same
/// kind and path, the one registered last wins, so user rules can be layered
/// on top of the defaults.
///
/// Rules are indexed by path before the first lookup, so the schema should be
/// treated as immutable once shared.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ListRule>,

    #[serde(skip)]
    index: OnceCell<HashMap<String, Vec<usize>>>,
}

impl Clone for Schema {
    fn clone(&self) -> Self {
        Schema::with_rules(self.rules.clone())
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn with_rules(rules: Vec<ListRule>) -> Self {
        Schema {
            rules,
            index: OnceCell::new(),
        }
    }

    /// Returns a copy of this schema with `rules` layered on top.
    pub fn extended(&self, rules: impl IntoIterator<Item = ListRule>) -> Self {
        let mut all = self.rules.clone();
        all.extend(rules);
        Schema::with_rules(all)
    }

    /// Finds the rule governing the list at `path` in an object of `kind`.
    pub fn list_rule(&self, kind: &str, path: &Path) -> Option<&ListRule> {
        self.list_rule_for_pattern(kind, &path.field_pattern())
    }

    /// Same as [`Schema::list_rule`] for an already flattened field pattern.
    pub fn list_rule_for_pattern(&self, kind: &str, pattern: &str) -> Option<&ListRule> {
        let index = self.index.get_or_init(|| {
            let mut index: HashMap<String, Vec<usize>> = HashMap::new();
            for (i, rule) in self.rules.iter().enumerate() {
                index.entry(rule.path.clone()).or_default().push(i);
            }
            index
        });

        index
            .get(pattern)?
            .iter()
            .rev()
            .map(|&i| &self.rules[i])
            .find(|rule| rule.applies_to(kind))
    }
}
