//! List semantics of the well-known Kubernetes kinds.

use super::elements::{ListRule, Schema};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Where a pod spec lives, and for which kinds. Kinds left empty match any
/// workload that embeds a pod template at that path.
const POD_SPEC_PREFIXES: &[(&str, &[&str])] = &[
    ("spec", &["Pod"]),
    ("template.spec", &["PodTemplate"]),
    ("spec.template.spec", &[]),
    ("spec.jobTemplate.spec.template.spec", &["CronJob"]),
];

const CONTAINER_LISTS: &[&str] = &["containers", "initContainers", "ephemeralContainers"];

static KUBERNETES: Lazy<Arc<Schema>> =
    Lazy::new(|| Arc::new(Schema::with_rules(kubernetes_rules())));

/// The shared schema for native kinds.
pub fn kubernetes() -> Arc<Schema> {
    Arc::clone(&KUBERNETES)
}

/// The rules backing [`kubernetes`]. Lists not covered here are atomic.
pub fn kubernetes_rules() -> Vec<ListRule> {
    let mut rules = vec![
        ListRule::set("metadata.finalizers"),
        ListRule::associative("metadata.ownerReferences", &["uid"]),
        ListRule::associative("spec.metrics", &["type"]).for_kinds(&["HorizontalPodAutoscaler"]),
        ListRule::associative("spec.ports", &["port", "protocol"]).for_kinds(&["Service"]),
    ];

    for (prefix, kinds) in POD_SPEC_PREFIXES {
        for list in CONTAINER_LISTS {
            let containers = format!("{}.{}", prefix, list);
            rules.push(
                ListRule::associative(containers.as_str(), &["name"])
                    .ordered()
                    .for_kinds(kinds),
            );
            rules.push(
                ListRule::associative(format!("{}.ports", containers), &["containerPort", "protocol"])
                    .for_kinds(kinds),
            );
            rules.push(
                ListRule::associative(format!("{}.env", containers), &["name"])
                    .ordered()
                    .for_kinds(kinds),
            );
            rules.push(
                ListRule::associative(format!("{}.volumeMounts", containers), &["mountPath"])
                    .for_kinds(kinds),
            );
        }
        rules.push(ListRule::associative(format!("{}.volumes", prefix), &["name"]).for_kinds(kinds));
        rules.push(
            ListRule::associative(format!("{}.imagePullSecrets", prefix), &["name"]).for_kinds(kinds),
        );
    }

    rules
}
