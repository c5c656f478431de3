//! Field path module - field paths, path sets, and per-manager ownership.
//!
//! Ownership is tracked the way the API server reports it in
//! `metadata.managedFields`: one set of owned paths per field manager.

mod path;
mod serialize;
mod set;

pub use path::*;
pub use serialize::*;
pub use set::*;

use crate::value::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The kind of write that established ownership of a set of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Apply,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Apply => "Apply",
            Operation::Update => "Update",
        }
    }
}

/// VersionedSet is the set of fields one manager owns, with the API version
/// it was written at and how it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSet {
    pub set: Set,
    pub api_version: String,
    pub operation: Operation,
}

impl VersionedSet {
    pub fn new(set: Set, api_version: impl Into<String>, operation: Operation) -> Self {
        VersionedSet {
            set,
            api_version: api_version.into(),
            operation,
        }
    }

    pub fn set(&self) -> &Set {
        &self.set
    }

    pub fn applied(&self) -> bool {
        self.operation == Operation::Apply
    }
}

/// ManagedFields maps each field manager to the fields it owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedFields {
    managers: BTreeMap<String, VersionedSet>,
}

impl ManagedFields {
    pub fn new() -> Self {
        ManagedFields::default()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn get(&self, manager: &str) -> Option<&VersionedSet> {
        self.managers.get(manager)
    }

    pub fn insert(&mut self, manager: impl Into<String>, vs: VersionedSet) {
        self.managers.insert(manager.into(), vs);
    }

    pub fn remove(&mut self, manager: &str) -> Option<VersionedSet> {
        self.managers.remove(manager)
    }

    pub fn contains(&self, manager: &str) -> bool {
        self.managers.contains_key(manager)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VersionedSet)> {
        self.managers.iter()
    }

    /// Fields owned by `manager`, or an empty set.
    pub fn owned_by(&self, manager: &str) -> Set {
        self.managers
            .get(manager)
            .map(|vs| vs.set.clone())
            .unwrap_or_default()
    }

    /// Union of the fields owned by every manager except `manager`.
    pub fn owned_by_others(&self, manager: &str) -> Set {
        self.managers
            .iter()
            .filter(|(name, _)| name.as_str() != manager)
            .fold(Set::new(), |acc, (_, vs)| acc.union(&vs.set))
    }

    /// Drops managers that no longer own anything.
    pub fn remove_empty(&mut self) {
        self.managers.retain(|_, vs| !vs.set.is_empty());
    }

    /// Reads `metadata.managedFields` from an object. Entries written by the
    /// same manager through different operations are merged.
    pub fn from_object(object: &Value) -> Result<ManagedFields, SerializeError> {
        let mut managed = ManagedFields::new();
        let Some(entries) = object.get_nested_list(&["metadata", "managedFields"]) else {
            return Ok(managed);
        };

        for entry in entries {
            let manager = entry
                .get_nested_str(&["manager"])
                .ok_or_else(|| SerializeError::new("managedFields entry without manager"))?;
            let operation = match entry.get_nested_str(&["operation"]) {
                Some("Apply") => Operation::Apply,
                _ => Operation::Update,
            };
            let api_version = entry.get_nested_str(&["apiVersion"]).unwrap_or_default();
            let set = match entry.get_nested(&["fieldsV1"]) {
                Some(fields) => Set::from_fields_v1(fields)?,
                None => Set::new(),
            };

            match managed.managers.get_mut(manager) {
                Some(existing) => {
                    existing.set = existing.set.union(&set);
                    if operation == Operation::Apply {
                        existing.operation = Operation::Apply;
                    }
                }
                None => managed.insert(manager, VersionedSet::new(set, api_version, operation)),
            }
        }
        Ok(managed)
    }

    /// Renders the `metadata.managedFields` list.
    pub fn to_value(&self) -> Result<Value, SerializeError> {
        let mut entries = Vec::with_capacity(self.managers.len());
        for (manager, vs) in &self.managers {
            let mut entry = Map::new();
            entry.set("manager", manager.as_str().into());
            entry.set("operation", vs.operation.as_str().into());
            entry.set("apiVersion", vs.api_version.as_str().into());
            entry.set("fieldsType", "FieldsV1".into());
            entry.set("fieldsV1", vs.set.to_fields_v1()?);
            entries.push(Value::Map(entry));
        }
        Ok(Value::List(entries))
    }

    /// Writes the ownership metadata into `object`.
    pub fn write_to(&self, object: &mut Value) -> Result<(), SerializeError> {
        let rendered = self.to_value()?;
        if !object.set_nested(&["metadata", "managedFields"], rendered) {
            return Err(SerializeError::new("object metadata is not a map"));
        }
        Ok(())
    }
}

impl fmt::Display for ManagedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (manager, vs) in &self.managers {
            writeln!(f, "{} ({}, {}):", manager, vs.operation.as_str(), vs.api_version)?;
            for path in vs.set.paths() {
                writeln!(f, "  {}", path)?;
            }
        }
        Ok(())
    }
}
