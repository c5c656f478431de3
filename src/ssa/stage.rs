//! Partitioning of a batch into ordered stages.

use crate::value::Value;
use std::fmt;

const CRD_GROUP: &str = "apiextensions.k8s.io";

/// Lifecycle of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Applying,
    Succeeded,
    PartiallyFailed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageState::Pending => "pending",
            StageState::Applying => "applying",
            StageState::Succeeded => "succeeded",
            StageState::PartiallyFailed => "partially failed",
        };
        f.write_str(s)
    }
}

/// Stage is a group of objects applied together. Objects keep their input
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub index: usize,
    pub objects: Vec<Value>,
    pub state: StageState,
}

impl Stage {
    fn new(index: usize, objects: Vec<Value>) -> Self {
        Stage {
            index,
            objects,
            state: StageState::Pending,
        }
    }

    pub fn begin(&mut self) {
        self.state = StageState::Applying;
    }

    pub fn finish(&mut self, failed: bool) {
        self.state = if failed {
            StageState::PartiallyFailed
        } else {
            StageState::Succeeded
        };
    }

    /// Returns true when later stages should not run after this one.
    pub fn blocks(&self, stage_blocking: bool) -> bool {
        stage_blocking && self.state == StageState::PartiallyFailed
    }
}

pub fn is_custom_resource_definition(object: &Value) -> bool {
    object.get_nested_str(&["kind"]) == Some("CustomResourceDefinition")
        && object
            .get_nested_str(&["apiVersion"])
            .is_some_and(|v| v.starts_with(CRD_GROUP))
}

/// Returns true for objects other objects depend on to exist first.
pub fn is_definition(object: &Value) -> bool {
    let core_namespace = object.get_nested_str(&["kind"]) == Some("Namespace")
        && object
            .get_nested_str(&["apiVersion"])
            .is_some_and(|v| !v.contains('/'));
    core_namespace || is_custom_resource_definition(object)
}

/// Splits a batch into definitions (stage 0) and everything else (stage 1).
/// Empty stages are left out; indexes stay stable.
pub fn plan_stages(objects: &[Value]) -> Vec<Stage> {
    let (definitions, rest): (Vec<Value>, Vec<Value>) =
        objects.iter().cloned().partition(is_definition);

    [definitions, rest]
        .into_iter()
        .enumerate()
        .filter(|(_, objects)| !objects.is_empty())
        .map(|(index, objects)| Stage::new(index, objects))
        .collect()
}
