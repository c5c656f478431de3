//! Resource identity and subject derivation.

use crate::error::Error;
use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// ResourceIdentity names one logical cluster resource.
///
/// Equality, hashing and ordering use the subject only, so the API version an
/// object was written at does not change which resource it is.
#[derive(Debug, Clone, Default)]
pub struct ResourceIdentity {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        ResourceIdentity {
            group: group.into(),
            version: String::new(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Reads the identity of an object from its `apiVersion`, `kind` and
    /// `metadata`. Kind and name are required.
    pub fn from_object(object: &Value) -> Result<Self, Error> {
        let kind = object
            .get_nested_str(&["kind"])
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::InvalidObject("object has no kind".into()))?;
        let name = object
            .get_nested_str(&["metadata", "name"])
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::InvalidObject(format!("{} object has no name", kind)))?;
        let namespace = object
            .get_nested_str(&["metadata", "namespace"])
            .unwrap_or_default();
        let (group, version) = split_api_version(object.get_nested_str(&["apiVersion"]).unwrap_or_default());

        Ok(ResourceIdentity::new(group, kind, namespace, name).with_version(version))
    }

    /// The canonical key: `<namespace>_<name>_<group>_<kind>`.
    pub fn subject(&self) -> String {
        format!("{}_{}_{}_{}", self.namespace, self.name, self.group, self.kind)
    }

    /// `group/version`, or just the version for the core group.
    pub fn group_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn is_custom_resource_definition(&self) -> bool {
        self.group == "apiextensions.k8s.io" && self.kind == "CustomResourceDefinition"
    }

    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }

    fn sort_key(&self) -> (&str, &str, &str, &str) {
        (&self.namespace, &self.name, &self.group, &self.kind)
    }
}

/// Splits an `apiVersion` into group and version.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

impl PartialEq for ResourceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for ResourceIdentity {}

impl Hash for ResourceIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl PartialOrd for ResourceIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// `Kind/namespace/name`, or `Kind/name` for cluster-scoped objects.
impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Parses a subject back into an identity (without version).
impl FromStr for ResourceIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        match parts.as_slice() {
            [namespace, name, group, kind] if !name.is_empty() && !kind.is_empty() => {
                Ok(ResourceIdentity::new(*group, *kind, *namespace, *name))
            }
            _ => Err(Error::InvalidObject(format!("malformed subject {:?}", s))),
        }
    }
}

impl Serialize for ResourceIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.subject())
    }
}

impl<'de> Deserialize<'de> for ResourceIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let subject = String::deserialize(deserializer)?;
        subject.parse().map_err(serde::de::Error::custom)
    }
}
