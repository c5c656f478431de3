//! Ownership conflicts reported by an apply.

use crate::fieldpath::Set;
use std::collections::BTreeMap;
use std::fmt;

/// Conflicts lists the fields an apply would change while other managers own
/// them, grouped by owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conflicts {
    by_manager: BTreeMap<String, Set>,
}

impl Conflicts {
    pub fn new() -> Self {
        Conflicts::default()
    }

    /// Records that `manager` owns `fields`. Empty sets are ignored.
    pub fn insert(&mut self, manager: impl Into<String>, fields: Set) {
        if fields.is_empty() {
            return;
        }
        let entry = self.by_manager.entry(manager.into()).or_default();
        *entry = entry.union(&fields);
    }

    pub fn is_empty(&self) -> bool {
        self.by_manager.is_empty()
    }

    /// Number of conflicting fields across all owners.
    pub fn len(&self) -> usize {
        self.by_manager.values().map(Set::len).sum()
    }

    /// The owners involved, sorted.
    pub fn managers(&self) -> Vec<&str> {
        self.by_manager.keys().map(String::as_str).collect()
    }

    pub fn owned_by(&self, manager: &str) -> Option<&Set> {
        self.by_manager.get(manager)
    }

    /// Every conflicting field, regardless of owner.
    pub fn to_set(&self) -> Set {
        self.by_manager
            .values()
            .fold(Set::new(), |acc, fields| acc.union(fields))
    }
}

/// Renders like an API server rejection:
/// `Apply failed with 1 conflict: conflict with "kubectl-edit": .data.key`.
impl fmt::Display for Conflicts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.len();
        write!(
            f,
            "Apply failed with {} conflict{}:",
            total,
            if total == 1 { "" } else { "s" }
        )?;
        for (i, (manager, fields)) in self.by_manager.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let paths = fields.paths();
            match paths.as_slice() {
                [only] => write!(f, " conflict with {:?}: {}", manager, only)?,
                _ => {
                    write!(f, " conflicts with {:?}:", manager)?;
                    for path in &paths {
                        write!(f, "\n- {}", path)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for Conflicts {}
