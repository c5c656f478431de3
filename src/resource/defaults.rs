//! Client-side defaulting for native kinds.
//!
//! The API server fills some fields that take part in list item keys (for
//! example the `protocol` of a container port). Applying the same defaults
//! before diffing keeps keyed items from looking added and removed.

use crate::value::Value;

const DEFAULT_PROTOCOL: &str = "TCP";

const CONTAINER_LISTS: &[&str] = &["containers", "initContainers", "ephemeralContainers"];

const POD_SPEC: &[&str] = &["spec"];
const TEMPLATE_SPEC: &[&str] = &["template", "spec"];
const WORKLOAD_SPEC: &[&str] = &["spec", "template", "spec"];
const CRONJOB_SPEC: &[&str] = &["spec", "jobTemplate", "spec", "template", "spec"];

/// Where the pod spec lives for each workload kind.
fn pod_spec_path(kind: &str) -> Option<&'static [&'static str]> {
    match kind {
        "Pod" => Some(POD_SPEC),
        "PodTemplate" => Some(TEMPLATE_SPEC),
        "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "ReplicationController"
        | "Job" => Some(WORKLOAD_SPEC),
        "CronJob" => Some(CRONJOB_SPEC),
        _ => None,
    }
}

/// Sets server defaults on native-kind objects in place. Objects of other
/// kinds are left untouched.
pub fn set_native_kinds_defaults(objects: &mut [Value]) {
    for object in objects.iter_mut() {
        let kind = object.get_nested_str(&["kind"]).unwrap_or_default().to_string();

        if kind == "Service" {
            if let Some(ports) = object.get_nested_mut(&["spec", "ports"]) {
                default_protocols(ports);
            }
            continue;
        }

        let Some(spec_path) = pod_spec_path(&kind) else {
            continue;
        };
        let Some(pod_spec) = object.get_nested_mut(spec_path) else {
            continue;
        };
        for list in CONTAINER_LISTS {
            let Some(containers) = pod_spec.get_nested_mut(&[*list]).and_then(Value::as_list_mut) else {
                continue;
            };
            for container in containers.iter_mut() {
                if let Some(ports) = container.get_nested_mut(&["ports"]) {
                    default_protocols(ports);
                }
            }
        }
    }
}

fn default_protocols(ports: &mut Value) {
    let Some(ports) = ports.as_list_mut() else {
        return;
    };
    for port in ports.iter_mut() {
        if let Some(port) = port.as_map_mut() {
            if !port.has("protocol") {
                port.set("protocol", DEFAULT_PROTOCOL.into());
            }
        }
    }
}
