//! Ownership-aware writes.

use super::Conflicts;
use crate::fieldpath::{ManagedFields, Operation, Path, Set, VersionedSet};
use crate::typed::{TypedValue, ValidationErrors};
use thiserror::Error;

/// Paths the server maintains itself. Nobody owns them.
fn default_ignored_fields() -> Vec<Path> {
    vec![
        Path::from_fields(&["apiVersion"]),
        Path::from_fields(&["kind"]),
        Path::from_fields(&["metadata", "name"]),
        Path::from_fields(&["metadata", "namespace"]),
        Path::from_fields(&["metadata", "managedFields"]),
        Path::from_fields(&["metadata", "resourceVersion"]),
        Path::from_fields(&["metadata", "uid"]),
        Path::from_fields(&["metadata", "generation"]),
        Path::from_fields(&["metadata", "creationTimestamp"]),
        Path::from_fields(&["status"]),
    ]
}

/// UpdaterBuilder is a builder for creating an Updater.
#[derive(Debug, Clone)]
pub struct UpdaterBuilder {
    ignored_fields: Vec<Path>,
    prune_omitted: bool,
}

impl Default for UpdaterBuilder {
    fn default() -> Self {
        UpdaterBuilder {
            ignored_fields: default_ignored_fields(),
            prune_omitted: false,
        }
    }
}

impl UpdaterBuilder {
    pub fn new() -> Self {
        UpdaterBuilder::default()
    }

    /// Replaces the paths (and their subtrees) that are never owned.
    pub fn ignored_fields(mut self, fields: Vec<Path>) -> Self {
        self.ignored_fields = fields;
        self
    }

    /// When set, an apply drops fields its manager owned before but left
    /// out of the new configuration. Otherwise omitted fields are kept and
    /// only explicit removals delete anything.
    pub fn prune_omitted(mut self, value: bool) -> Self {
        self.prune_omitted = value;
        self
    }

    pub fn build(self) -> Updater {
        Updater {
            ignored_fields: self.ignored_fields,
            prune_omitted: self.prune_omitted,
        }
    }
}

/// Updater merges writes into live objects while tracking which manager
/// owns which field.
#[derive(Debug, Clone)]
pub struct Updater {
    ignored_fields: Vec<Path>,
    prune_omitted: bool,
}

impl Default for Updater {
    fn default() -> Self {
        UpdaterBuilder::new().build()
    }
}

impl Updater {
    pub fn builder() -> UpdaterBuilder {
        UpdaterBuilder::new()
    }

    fn owned_fields(&self, set: &Set) -> Set {
        set.filter(|path| !self.ignored_fields.iter().any(|ignored| path.starts_with(ignored)))
    }

    /// Applies `config` on top of `live` on behalf of `manager`.
    pub fn apply(
        &self,
        live: &TypedValue,
        config: &TypedValue,
        version: &str,
        managers: &mut ManagedFields,
        manager: &str,
        force: bool,
    ) -> Result<TypedValue, ApplyError> {
        self.apply_with_removals(live, config, &Set::new(), version, managers, manager, force)
    }

    /// Applies `config` and deletes `removals` in the same write. Removals
    /// that the configuration still sets, or that another manager owns, are
    /// ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_with_removals(
        &self,
        live: &TypedValue,
        config: &TypedValue,
        removals: &Set,
        version: &str,
        managers: &mut ManagedFields,
        manager: &str,
        force: bool,
    ) -> Result<TypedValue, ApplyError> {
        config.validate().map_err(ApplyError::Validation)?;

        let config_set = self.owned_fields(&config.to_field_set());
        let atomic = config.to_atomic_set();
        let previous = managers.owned_by(manager);
        let others = managers.owned_by_others(manager);

        let mut candidates = removals.clone();
        if self.prune_omitted {
            candidates = candidates.union(&previous.difference(&config_set));
        }
        let to_remove = candidates.filter(|path| {
            !config_set.has_prefix(path) && !atomic.covers(path) && !others.has(path)
        });

        let merged = live.merge(config);
        let new_object = if to_remove.is_empty() {
            merged
        } else {
            merged.remove_items(&to_remove)
        };

        let owned = if self.prune_omitted {
            config_set
        } else {
            previous.union(&config_set)
        };
        let owned = owned.filter(|path| !to_remove.covers(path));

        self.update_managers(live, &new_object, managers, manager, force)?;
        managers.insert(manager, VersionedSet::new(owned, version, Operation::Apply));
        managers.remove_empty();

        Ok(new_object)
    }

    /// Records a non-apply write of `new_object` by `manager`. The writer
    /// takes ownership of everything it changed; updates never conflict.
    pub fn update(
        &self,
        live: &TypedValue,
        new_object: &TypedValue,
        version: &str,
        managers: &mut ManagedFields,
        manager: &str,
    ) -> Result<TypedValue, ApplyError> {
        new_object.validate().map_err(ApplyError::Validation)?;

        let compare = live.compare(new_object);
        self.update_managers(live, new_object, managers, manager, true)?;

        let changed = self.owned_fields(&compare.modified.union(&compare.added));
        let owned = managers
            .owned_by(manager)
            .union(&changed)
            .filter(|path| !compare.removed.covers(path));
        managers.insert(manager, VersionedSet::new(owned, version, Operation::Update));
        managers.remove_empty();

        Ok(new_object.clone())
    }

    /// Checks the change from `old_object` to `new_object` against the
    /// other managers: fields they own that change are conflicts, and
    /// fields that disappear leave their sets.
    fn update_managers(
        &self,
        old_object: &TypedValue,
        new_object: &TypedValue,
        managers: &mut ManagedFields,
        manager: &str,
        force: bool,
    ) -> Result<(), ApplyError> {
        let compare = old_object.compare(new_object);
        let changed = compare.modified.union(&compare.added);

        let mut conflicts = Conflicts::new();
        for (other, versioned) in managers.iter() {
            if other == manager {
                continue;
            }
            conflicts.insert(other.as_str(), versioned.set().intersection(&changed));
        }

        if !force && !conflicts.is_empty() {
            return Err(ApplyError::Conflicts(conflicts));
        }

        let taken = conflicts.to_set();
        let names: Vec<String> = managers.iter().map(|(name, _)| name.clone()).collect();
        for name in names {
            if name == manager {
                continue;
            }
            if let Some(versioned) = managers.get(&name) {
                let set = versioned
                    .set()
                    .difference(&taken)
                    .filter(|path| !compare.removed.covers(path));
                let updated = VersionedSet::new(set, versioned.api_version.as_str(), versioned.operation);
                managers.insert(name, updated);
            }
        }
        Ok(())
    }
}

/// ApplyError represents an error during apply or update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("{0}")]
    Conflicts(Conflicts),
    #[error("invalid object: {0}")]
    Validation(ValidationErrors),
}
