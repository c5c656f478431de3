//! Options for apply, delete and wait operations.

use super::mask::Masker;
use crate::error::Error;
use crate::resource::ResourceIdentity;
use crate::schema::{kubernetes, ListRule, Schema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_FIELD_MANAGER: &str = "ssa-engine";

/// ApplyOptions controls diff and apply calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplyOptions {
    /// Take ownership of fields other managers own instead of failing.
    pub force: bool,
    pub field_manager: String,
    /// Objects that are never written; they are reported as skipped.
    pub exclusions: BTreeSet<ResourceIdentity>,
    /// Objects carrying any of these labels or annotations are skipped.
    pub exclusion_annotations: BTreeMap<String, String>,
    /// Objects carrying any of these are only created, never updated.
    pub if_not_present_annotations: BTreeMap<String, String>,
    #[serde(with = "millis")]
    pub wait_timeout: Duration,
    #[serde(with = "millis")]
    pub wait_interval: Duration,
    /// Maximum number of objects of one stage in flight.
    pub concurrency: usize,
    /// Stop before the next stage when an object of this stage failed.
    pub stage_blocking: bool,
    /// Wait for definitions applied in the first stage to be established.
    pub wait_for_definitions: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        ApplyOptions {
            force: false,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            exclusions: BTreeSet::new(),
            exclusion_annotations: BTreeMap::new(),
            if_not_present_annotations: BTreeMap::new(),
            wait_timeout: Duration::from_secs(60),
            wait_interval: Duration::from_secs(2),
            concurrency: 4,
            stage_blocking: true,
            wait_for_definitions: true,
        }
    }
}

impl ApplyOptions {
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_field_manager(mut self, manager: impl Into<String>) -> Self {
        self.field_manager = manager.into();
        self
    }

    pub fn with_exclusion(mut self, identity: ResourceIdentity) -> Self {
        self.exclusions.insert(identity);
        self
    }

    pub fn with_exclusion_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.exclusion_annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            interval: self.wait_interval,
            timeout: self.wait_timeout,
        }
    }
}

/// DeleteOptions controls delete calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteOptions {
    /// Live objects carrying any of these labels or annotations are kept.
    pub exclusion_annotations: BTreeMap<String, String>,
    pub concurrency: usize,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        DeleteOptions {
            exclusion_annotations: BTreeMap::new(),
            concurrency: 4,
        }
    }
}

/// WaitOptions controls readiness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitOptions {
    #[serde(with = "millis")]
    pub interval: Duration,
    #[serde(with = "millis")]
    pub timeout: Duration,
}

/// Config is the file-level configuration of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub apply: ApplyOptions,
    pub delete: DeleteOptions,
    pub masking: Masker,
    /// List semantics for custom kinds, added to the native ones.
    pub list_rules: Vec<ListRule>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Config, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn schema(&self) -> Arc<Schema> {
        if self.list_rules.is_empty() {
            kubernetes()
        } else {
            Arc::new(kubernetes().extended(self.list_rules.iter().cloned()))
        }
    }
}

/// Durations travel as integer milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
