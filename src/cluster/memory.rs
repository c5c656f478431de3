//! An in-memory API authority.

use super::client::{ApplyRequest, ClusterClient};
use crate::error::Error;
use crate::fieldpath::ManagedFields;
use crate::merge::Updater;
use crate::resource::{set_native_kinds_defaults, strip_server_fields, ResourceIdentity};
use crate::schema::{kubernetes, Schema};
use crate::typed::TypedValue;
use crate::value::{Map, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Built-in kinds: group, kind and whether objects live in a namespace.
const NATIVE_KINDS: &[(&str, &str, bool)] = &[
    ("", "Namespace", false),
    ("", "ConfigMap", true),
    ("", "Secret", true),
    ("", "Service", true),
    ("", "ServiceAccount", true),
    ("", "Pod", true),
    ("", "PodTemplate", true),
    ("", "PersistentVolume", false),
    ("", "PersistentVolumeClaim", true),
    ("", "ReplicationController", true),
    ("apps", "Deployment", true),
    ("apps", "StatefulSet", true),
    ("apps", "DaemonSet", true),
    ("apps", "ReplicaSet", true),
    ("batch", "Job", true),
    ("batch", "CronJob", true),
    ("autoscaling", "HorizontalPodAutoscaler", true),
    ("networking.k8s.io", "Ingress", true),
    ("networking.k8s.io", "NetworkPolicy", true),
    ("policy", "PodDisruptionBudget", true),
    ("rbac.authorization.k8s.io", "Role", true),
    ("rbac.authorization.k8s.io", "RoleBinding", true),
    ("rbac.authorization.k8s.io", "ClusterRole", false),
    ("rbac.authorization.k8s.io", "ClusterRoleBinding", false),
    ("storage.k8s.io", "StorageClass", false),
    ("apiextensions.k8s.io", "CustomResourceDefinition", false),
];

/// Namespaces that exist without being created.
const BUILTIN_NAMESPACES: &[&str] = &["default", "kube-system", "kube-public"];

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceIdentity, Value>,
    rejections: BTreeMap<ResourceIdentity, String>,
    /// Definitions that are not established yet, with the readiness polls
    /// left until they are.
    establishing: BTreeMap<ResourceIdentity, usize>,
    next_uid: u64,
    resource_version: u64,
}

impl State {
    /// Whether objects of the identity's kind are namespaced, or None when
    /// the kind is unknown.
    fn scope(&self, id: &ResourceIdentity) -> Option<bool> {
        if let Some((_, _, namespaced)) = NATIVE_KINDS
            .iter()
            .find(|(group, kind, _)| *group == id.group && *kind == id.kind)
        {
            return Some(*namespaced);
        }

        self.objects
            .iter()
            .filter(|(crd, _)| crd.is_custom_resource_definition() && !self.establishing.contains_key(*crd))
            .map(|(_, object)| object)
            .find(|object| {
                object.get_nested_str(&["spec", "group"]) == Some(id.group.as_str())
                    && object.get_nested_str(&["spec", "names", "kind"]) == Some(id.kind.as_str())
            })
            .map(|object| object.get_nested_str(&["spec", "scope"]) != Some("Cluster"))
    }

    fn namespace_exists(&self, namespace: &str) -> bool {
        BUILTIN_NAMESPACES.contains(&namespace)
            || self
                .objects
                .contains_key(&ResourceIdentity::new("", "Namespace", "", namespace))
    }

    fn check_target(&self, id: &ResourceIdentity) -> Result<(), Error> {
        if let Some(message) = self.rejections.get(id) {
            return Err(Error::ValidationRejected(format!("{}: {}", id, message)));
        }
        let namespaced = self.scope(id).ok_or_else(|| {
            Error::ValidationRejected(format!(
                "no matches for kind {:?} in group {:?}",
                id.kind, id.group
            ))
        })?;
        match (namespaced, id.namespace.is_empty()) {
            (true, true) => Err(Error::ValidationRejected(format!("{}: namespace is required", id))),
            (false, false) => Err(Error::ValidationRejected(format!(
                "{}: cluster-scoped objects have no namespace",
                id
            ))),
            (true, false) if !self.namespace_exists(&id.namespace) => {
                Err(Error::NotFound(format!("namespace {:?}", id.namespace)))
            }
            _ => Ok(()),
        }
    }

    /// Sets uid, resourceVersion and generation on an object about to be
    /// stored.
    fn stamp(&mut self, object: &mut Value, previous: Option<&Value>) {
        self.resource_version += 1;
        object.set_nested(
            &["metadata", "resourceVersion"],
            self.resource_version.to_string().into(),
        );

        let generation = match previous {
            None => {
                self.next_uid += 1;
                object.set_nested(&["metadata", "uid"], format!("uid-{:06}", self.next_uid).into());
                1
            }
            Some(old) => {
                let current = old
                    .get_nested(&["metadata", "generation"])
                    .and_then(Value::as_int)
                    .unwrap_or(1);
                if strip_server_fields(old) == strip_server_fields(object) {
                    current
                } else {
                    current + 1
                }
            }
        };
        object.set_nested(&["metadata", "generation"], Value::Int(generation));
    }
}

fn without_managed_fields(object: &Value) -> Value {
    let mut object = object.clone();
    object.remove_nested(&["metadata", "managedFields"]);
    object
}

/// InMemoryCluster is a reference API authority. It merges applies with
/// per-field ownership the way an API server does, and can be told to
/// misbehave: be unreachable, answer slowly, reject given objects or take
/// a while to establish custom resource definitions.
#[derive(Debug)]
pub struct InMemoryCluster {
    schema: Arc<Schema>,
    updater: Updater,
    state: RwLock<State>,
    reachable: AtomicBool,
    latency_ms: AtomicU64,
    establish_polls: AtomicUsize,
    writes: AtomicUsize,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        InMemoryCluster::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        InMemoryCluster {
            schema: kubernetes(),
            updater: Updater::default(),
            state: RwLock::new(State::default()),
            reachable: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            establish_polls: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Loads existing objects as they are. Definitions among them are
    /// established.
    pub fn from_objects(objects: impl IntoIterator<Item = Value>) -> Result<Self, Error> {
        let mut cluster = InMemoryCluster::new();
        {
            let state = cluster.state.get_mut();
            for object in objects {
                let id = ResourceIdentity::from_object(&object)?;
                state.resource_version = state.resource_version.max(
                    object
                        .get_nested_str(&["metadata", "resourceVersion"])
                        .and_then(|rv| rv.parse().ok())
                        .unwrap_or(0),
                );
                state.objects.insert(id, object);
            }
            state.next_uid = state.objects.len() as u64;
        }
        Ok(cluster)
    }

    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = schema;
        self
    }

    /// Number of readiness polls a newly created definition answers
    /// "not ready" to before it is established.
    pub fn with_establish_polls(self, polls: usize) -> Self {
        self.establish_polls.store(polls, Ordering::SeqCst);
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Makes every apply of `id` fail validation with `message`.
    pub async fn reject(&self, id: ResourceIdentity, message: impl Into<String>) {
        self.state.write().await.rejections.insert(id, message.into());
    }

    /// Number of persisted writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every stored object, ordered by identity.
    pub async fn snapshot(&self) -> Vec<Value> {
        self.state.read().await.objects.values().cloned().collect()
    }

    /// Writes `object` as a non-apply update by `manager`, the way an
    /// interactive edit does. The manager takes ownership of every field it
    /// changed.
    pub async fn update_as(&self, manager: &str, object: Value) -> Result<Value, Error> {
        self.enter().await?;
        let id = ResourceIdentity::from_object(&object)?;
        let mut state = self.state.write().await;
        let existing = state
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut managers = ManagedFields::from_object(&existing)?;
        let live = TypedValue::new(without_managed_fields(&existing), Arc::clone(&self.schema));
        let updated = live.with_value(without_managed_fields(&object));
        let updated = self
            .updater
            .update(&live, &updated, &id.group_version(), &mut managers, manager)?;

        let mut stored = updated.into_value();
        managers.write_to(&mut stored)?;
        state.stamp(&mut stored, Some(&existing));
        state.objects.insert(id.clone(), stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(subject = %id, manager = %manager, "updated object");
        Ok(stored)
    }

    async fn enter(&self) -> Result<(), Error> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::NotReachable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn get(&self, id: &ResourceIdentity) -> Result<Option<Value>, Error> {
        self.enter().await?;
        Ok(self.state.read().await.objects.get(id).cloned())
    }

    async fn apply(&self, request: ApplyRequest) -> Result<Value, Error> {
        self.enter().await?;
        let id = ResourceIdentity::from_object(&request.object)?;
        let mut state = self.state.write().await;
        state.check_target(&id)?;

        let mut config = strip_server_fields(&request.object);
        set_native_kinds_defaults(std::slice::from_mut(&mut config));
        let config = TypedValue::new(config, Arc::clone(&self.schema));

        let existing = state.objects.get(&id).cloned();
        let (live, mut managers) = match &existing {
            Some(object) => (
                config.with_value(without_managed_fields(object)),
                ManagedFields::from_object(object)?,
            ),
            None => (config.with_value(Value::Map(Map::new())), ManagedFields::new()),
        };

        let merged = self.updater.apply_with_removals(
            &live,
            &config,
            &request.removals.paths,
            &id.group_version(),
            &mut managers,
            &request.field_manager,
            request.force,
        )?;
        let mut object = merged.into_value();
        managers.write_to(&mut object)?;

        if request.dry_run {
            return Ok(object);
        }

        if existing.as_ref() != Some(&object) {
            state.stamp(&mut object, existing.as_ref());
        }
        if existing.is_none() && id.is_custom_resource_definition() {
            let polls = self.establish_polls.load(Ordering::SeqCst);
            if polls > 0 {
                state.establishing.insert(id.clone(), polls);
            }
        }
        state.objects.insert(id.clone(), object.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(
            subject = %id,
            manager = %request.field_manager,
            created = existing.is_none(),
            "applied object"
        );
        Ok(object)
    }

    async fn delete(&self, id: &ResourceIdentity) -> Result<(), Error> {
        self.enter().await?;
        let mut state = self.state.write().await;
        if state.objects.remove(id).is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        state.establishing.remove(id);
        if id.kind == "Namespace" && id.group.is_empty() {
            state.objects.retain(|other, _| other.namespace != id.name);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(subject = %id, "deleted object");
        Ok(())
    }

    async fn is_ready(&self, id: &ResourceIdentity) -> Result<bool, Error> {
        self.enter().await?;
        let mut state = self.state.write().await;
        if !state.objects.contains_key(id) {
            return Ok(false);
        }
        match state.establishing.get_mut(id) {
            Some(left) if *left > 1 => {
                *left -= 1;
                Ok(false)
            }
            Some(_) => {
                state.establishing.remove(id);
                Ok(false)
            }
            None => Ok(true),
        }
    }
}
