//! Comparison result types.

use crate::fieldpath::{Path, Set};
use crate::value::{self, Value};
use std::fmt;

/// Comparison holds the result of comparing two documents.
///
/// No path appears in more than one of the three sets. When all three are
/// empty the documents are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comparison {
    /// Paths present on the left-hand side only.
    pub removed: Set,
    /// Paths present on both sides with different values.
    pub modified: Set,
    /// Paths present on the right-hand side only.
    pub added: Set,
}

impl Comparison {
    pub fn new() -> Self {
        Comparison::default()
    }

    pub fn is_same(&self) -> bool {
        self.removed.is_empty() && self.modified.is_empty() && self.added.is_empty()
    }

    /// Drops the given paths from the result.
    pub fn exclude_fields(&mut self, fields: &Set) {
        self.removed = self.removed.difference(fields);
        self.modified = self.modified.difference(fields);
        self.added = self.added.difference(fields);
    }

    /// Keeps only the changes that touch `owned`: the changed path, one of
    /// its ancestors or one of its descendants must be in the set.
    pub fn retain_overlapping(&mut self, owned: &Set) {
        self.removed = self.removed.filter(|p| owned.overlaps(p));
        self.modified = self.modified.filter(|p| owned.overlaps(p));
        self.added = self.added.filter(|p| owned.overlaps(p));
    }

    pub fn has_removed(&self) -> bool {
        !self.removed.is_empty()
    }

    pub fn has_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    pub fn has_added(&self) -> bool {
        !self.added.is_empty()
    }

    /// Renders a line per changed path with the values taken from the two
    /// compared documents: `~` modified, `+` added, `-` removed.
    pub fn render(&self, before: &Value, after: &Value) -> String {
        let mut lines = Vec::new();
        for path in self.modified.paths() {
            lines.push(format!(
                "~ {}: {} -> {}",
                path,
                render_at(&path, before),
                render_at(&path, after)
            ));
        }
        for path in self.added.paths() {
            lines.push(format!("+ {}: {}", path, render_at(&path, after)));
        }
        for path in self.removed.paths() {
            lines.push(format!("- {}: {}", path, render_at(&path, before)));
        }
        lines.join("\n")
    }
}

fn render_at(path: &Path, doc: &Value) -> String {
    match path.lookup(doc) {
        Some(v) => value::to_json(v).unwrap_or_else(|_| "<unprintable>".to_string()),
        None => "<none>".to_string(),
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("Modified", &self.modified),
            ("Added", &self.added),
            ("Removed", &self.removed),
        ];

        let mut first = true;
        for (label, set) in sections {
            if set.is_empty() {
                continue;
            }
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "- {} Fields:", label)?;
            for path in set.paths() {
                write!(f, "\n  {}", path)?;
            }
        }
        Ok(())
    }
}
