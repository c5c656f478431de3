//! Per-object outcomes of diff, apply and delete calls.

use crate::error::Error;
use crate::resource::ResourceIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Action is what a call did, or would do, to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Unchanged,
    /// The object existed and some of its fields changed.
    Configured,
    Created,
    Deleted,
    /// The object was excluded and not written.
    Skipped,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Unchanged => "unchanged",
            Action::Configured => "configured",
            Action::Created => "created",
            Action::Deleted => "deleted",
            Action::Skipped => "skipped",
        }
    }

    /// Returns true when the action changes the cluster.
    pub fn is_change(&self) -> bool {
        matches!(self, Action::Configured | Action::Created | Action::Deleted)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ChangeSetEntry records the outcome for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSetEntry {
    pub object_meta: ResourceIdentity,
    pub group_version: String,
    /// Always derived from `object_meta`.
    pub subject: String,
    pub action: Action,
    /// Human-readable changes, with sensitive values masked.
    pub patch: Option<String>,
    /// Set when the object failed. The action then describes what was
    /// actually done to the cluster.
    pub error: Option<Error>,
}

impl ChangeSetEntry {
    pub fn new(identity: ResourceIdentity, action: Action) -> Self {
        ChangeSetEntry {
            group_version: identity.group_version(),
            subject: identity.subject(),
            object_meta: identity,
            action,
            patch: None,
            error: None,
        }
    }

    pub fn with_patch(mut self, patch: impl Into<String>) -> Self {
        self.patch = Some(patch.into());
        self
    }

    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for ChangeSetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.object_meta, self.action)?;
        if let Some(err) = &self.error {
            write!(f, " ({})", err)?;
        }
        Ok(())
    }
}

/// ChangeSet is the ordered list of entries produced by one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    entries: Vec<ChangeSetEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet::default()
    }

    pub fn add(&mut self, entry: ChangeSetEntry) {
        self.entries.push(entry);
    }

    pub fn append(&mut self, other: ChangeSet) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[ChangeSetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, subject: &str) -> Option<&ChangeSetEntry> {
        self.entries.iter().find(|e| e.subject == subject)
    }

    pub(crate) fn get_mut(&mut self, subject: &str) -> Option<&mut ChangeSetEntry> {
        self.entries.iter_mut().find(|e| e.subject == subject)
    }

    /// Action per subject.
    pub fn to_map(&self) -> BTreeMap<String, Action> {
        self.entries
            .iter()
            .map(|e| (e.subject.clone(), e.action))
            .collect()
    }

    pub fn identities(&self) -> Vec<ResourceIdentity> {
        self.entries.iter().map(|e| e.object_meta.clone()).collect()
    }

    /// Returns true when any entry changed the cluster.
    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|e| e.action.is_change())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChangeSetEntry> {
        self.entries.iter().filter(|e| e.is_failed())
    }
}

impl IntoIterator for ChangeSet {
    type Item = ChangeSetEntry;
    type IntoIter = std::vec::IntoIter<ChangeSetEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}
