//! Behavior of the in-memory API authority.

#[cfg(test)]
mod tests {
    use crate::cluster::{ApplyRequest, ClusterClient, InMemoryCluster};
    use crate::error::Error;
    use crate::fieldpath::{ManagedFields, Path, Set};
    use crate::resource::ResourceIdentity;
    use crate::ssa::RemovalPatch;
    use crate::value::{from_yaml, Value};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const MANAGER: &str = "ssa-engine";

    fn object(yaml: &str) -> Value {
        from_yaml(yaml).unwrap()
    }

    fn config_map(data: &str) -> Value {
        object(&format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: demo\n  namespace: default\ndata:\n{}",
            data
        ))
    }

    fn cm_id() -> ResourceIdentity {
        ResourceIdentity::new("", "ConfigMap", "default", "demo")
    }

    /// Helper to persist an object as MANAGER.
    async fn apply(cluster: &InMemoryCluster, object: Value) -> Result<Value, Error> {
        cluster.apply(ApplyRequest::new(object, MANAGER)).await
    }

    #[tokio::test]
    async fn test_create_assigns_server_fields() {
        let cluster = InMemoryCluster::new();
        let created = apply(&cluster, config_map("  key: a\n")).await.unwrap();

        assert_eq!(created.get_nested_str(&["metadata", "resourceVersion"]), Some("1"));
        assert!(created.get_nested_str(&["metadata", "uid"]).is_some());
        assert_eq!(
            created.get_nested(&["metadata", "generation"]),
            Some(&Value::Int(1))
        );

        let managers = ManagedFields::from_object(&created).unwrap();
        assert!(managers
            .owned_by(MANAGER)
            .has(&Path::from_fields(&["data", "key"])));
        assert_eq!(cluster.writes(), 1);
        assert_eq!(cluster.get(&cm_id()).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_dry_run_is_not_persisted() {
        let cluster = InMemoryCluster::new();
        let merged = cluster
            .apply(ApplyRequest::new(config_map("  key: a\n"), MANAGER).dry_run(true))
            .await
            .unwrap();

        assert_eq!(merged.get_nested_str(&["data", "key"]), Some("a"));
        assert_eq!(cluster.get(&cm_id()).await.unwrap(), None);
        assert_eq!(cluster.writes(), 0);
    }

    #[tokio::test]
    async fn test_omitted_fields_stay_until_removed() {
        let cluster = InMemoryCluster::new();
        apply(&cluster, config_map("  key: a\n  token: t\n")).await.unwrap();

        let kept = apply(&cluster, config_map("  key: a\n")).await.unwrap();
        assert_eq!(kept.get_nested_str(&["data", "token"]), Some("t"));

        let removals = RemovalPatch::new(Set::from_paths(&[Path::from_fields(&["data", "token"])]));
        let pruned = cluster
            .apply(ApplyRequest::new(config_map("  key: a\n"), MANAGER).removals(removals))
            .await
            .unwrap();
        assert!(pruned.get_nested(&["data", "token"]).is_none());
        assert_eq!(pruned.get_nested_str(&["data", "key"]), Some("a"));
    }

    #[tokio::test]
    async fn test_unchanged_apply_keeps_resource_version() {
        let cluster = InMemoryCluster::new();
        let first = apply(&cluster, config_map("  key: a\n")).await.unwrap();
        let second = apply(&cluster, config_map("  key: a\n")).await.unwrap();

        assert_eq!(first, second);

        let third = apply(&cluster, config_map("  key: b\n")).await.unwrap();
        assert_eq!(third.get_nested_str(&["metadata", "resourceVersion"]), Some("2"));
        assert_eq!(
            third.get_nested(&["metadata", "generation"]),
            Some(&Value::Int(2))
        );
    }

    #[tokio::test]
    async fn test_conflict_and_force() {
        let cluster = InMemoryCluster::new();
        let live = apply(&cluster, config_map("  key: a\n")).await.unwrap();

        let mut edited = live.clone();
        edited.set_nested(&["data", "key"], "edited".into());
        cluster.update_as("kubectl-edit", edited).await.unwrap();

        let err = apply(&cluster, config_map("  key: a\n")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(ref msg) if msg.contains("kubectl-edit")));

        let forced = cluster
            .apply(ApplyRequest::new(config_map("  key: a\n"), MANAGER).force(true))
            .await
            .unwrap();
        assert_eq!(forced.get_nested_str(&["data", "key"]), Some("a"));
    }

    #[tokio::test]
    async fn test_keyed_list_validation() {
        let cluster = InMemoryCluster::new();
        let hpa = object(
            "apiVersion: autoscaling/v2\nkind: HorizontalPodAutoscaler\nmetadata:\n  name: demo\n  namespace: default\nspec:\n  metrics:\n  - resource:\n      name: cpu\n",
        );

        let err = apply(&cluster, hpa).await.unwrap_err();
        assert!(matches!(err, Error::ValidationRejected(_)));
    }

    #[tokio::test]
    async fn test_port_protocol_is_defaulted() {
        let cluster = InMemoryCluster::new();
        let svc = object(
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n  namespace: default\nspec:\n  ports:\n  - port: 80\n",
        );

        let stored = apply(&cluster, svc).await.unwrap();
        assert_eq!(
            stored.get_nested_list(&["spec", "ports"]).unwrap()[0].get_nested_str(&["protocol"]),
            Some("TCP")
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_until_definition_established() {
        let cluster = InMemoryCluster::new().with_establish_polls(2);
        let widget = object(
            "apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: w\n  namespace: default\nspec:\n  size: 1\n",
        );
        let crd = object(
            "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: widgets.example.com\nspec:\n  group: example.com\n  scope: Namespaced\n  names:\n    kind: Widget\n    plural: widgets\n",
        );
        let crd_id = ResourceIdentity::from_object(&crd).unwrap();

        assert!(matches!(
            apply(&cluster, widget.clone()).await,
            Err(Error::ValidationRejected(_))
        ));

        apply(&cluster, crd).await.unwrap();
        assert!(apply(&cluster, widget.clone()).await.is_err());

        assert!(!cluster.is_ready(&crd_id).await.unwrap());
        assert!(!cluster.is_ready(&crd_id).await.unwrap());
        assert!(cluster.is_ready(&crd_id).await.unwrap());

        assert!(apply(&cluster, widget).await.is_ok());
    }

    #[tokio::test]
    async fn test_namespace_must_exist() {
        let cluster = InMemoryCluster::new();
        let cm = object("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: c\n  namespace: team\n");

        assert!(matches!(
            apply(&cluster, cm.clone()).await,
            Err(Error::NotFound(_))
        ));

        apply(&cluster, object("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: team\n"))
            .await
            .unwrap();
        apply(&cluster, cm).await.unwrap();

        cluster
            .delete(&ResourceIdentity::new("", "Namespace", "", "team"))
            .await
            .unwrap();
        assert!(cluster.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_object() {
        let cluster = InMemoryCluster::new();
        assert!(matches!(
            cluster.delete(&cm_id()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let cluster = InMemoryCluster::new();
        cluster.reject(cm_id(), "denied by policy").await;
        let err = apply(&cluster, config_map("  key: a\n")).await.unwrap_err();
        assert_eq!(
            err,
            Error::ValidationRejected("ConfigMap/default/demo: denied by policy".into())
        );

        cluster.set_reachable(false);
        let err = cluster.get(&cm_id()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency() {
        let cluster = InMemoryCluster::new();
        cluster.set_latency(Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        cluster.get(&cm_id()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_beyond_millisecond_range_saturates() {
        let cluster = InMemoryCluster::new();
        cluster.set_latency(Duration::from_secs(u64::MAX / 1000 + 1));

        let id = cm_id();
        let call = tokio::time::timeout(Duration::from_secs(3600), cluster.get(&id));
        assert!(call.await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let cluster = InMemoryCluster::new();
        apply(&cluster, config_map("  key: a\n")).await.unwrap();

        let restored = InMemoryCluster::from_objects(cluster.snapshot().await).unwrap();
        assert_eq!(restored.snapshot().await, cluster.snapshot().await);

        // ownership survives the round trip
        let mut live = restored.get(&cm_id()).await.unwrap().unwrap();
        live.set_nested(&["data", "key"], "b".into());
        let edited = restored.update_as("kubectl-edit", live).await.unwrap();

        let managers = ManagedFields::from_object(&edited).unwrap();
        assert!(managers
            .owned_by("kubectl-edit")
            .has(&Path::from_fields(&["data", "key"])));
        assert!(!managers.contains(MANAGER));
    }
}
