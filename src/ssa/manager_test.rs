//! Reconciliation scenarios against the in-memory cluster.

#[cfg(test)]
mod tests {
    use crate::cluster::{ClusterClient, InMemoryCluster};
    use crate::error::Error;
    use crate::resource::ResourceIdentity;
    use crate::ssa::{Action, ApplyOptions, Context, DeleteOptions, ResourceManager, WaitOptions};
    use crate::value::{from_yaml, to_json, Value};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    const CRD: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
spec:
  group: example.com
  scope: Namespaced
  names:
    kind: Widget
    plural: widgets
"#;

    const WIDGET: &str = r#"
apiVersion: example.com/v1
kind: Widget
metadata:
  name: w
  namespace: team
spec:
  size: 3
"#;

    const NAMESPACE: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: team
"#;

    const SECRET: &str = r#"
apiVersion: v1
kind: Secret
metadata:
  name: creds
  namespace: default
stringData:
  key: private
"#;

    const HPA: &str = r#"
apiVersion: autoscaling/v2
kind: HorizontalPodAutoscaler
metadata:
  name: web
  namespace: default
spec:
  scaleTargetRef:
    apiVersion: apps/v1
    kind: Deployment
    name: web
  minReplicas: 1
  maxReplicas: 3
  metrics:
  - type: Resource
    resource:
      name: cpu
      target:
        type: Utilization
        averageUtilization: 80
"#;

    const PODS_METRIC: &str = r#"
  - type: Pods
    pods:
      metric:
        name: packets-per-second
      target:
        type: AverageValue
        averageValue: 1k
"#;

    fn object(yaml: &str) -> Value {
        from_yaml(yaml).unwrap()
    }

    /// Helper to build a ConfigMap with the given `data` block.
    fn config_map(namespace: &str, name: &str, data: &str) -> Value {
        object(&format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n  namespace: {}\ndata:\n{}",
            name, namespace, data
        ))
    }

    fn id_of(object: &Value) -> ResourceIdentity {
        ResourceIdentity::from_object(object).unwrap()
    }

    fn setup() -> (Arc<InMemoryCluster>, ResourceManager) {
        setup_with(InMemoryCluster::new())
    }

    fn setup_with(cluster: InMemoryCluster) -> (Arc<InMemoryCluster>, ResourceManager) {
        let cluster = Arc::new(cluster);
        let manager = ResourceManager::new(cluster.clone());
        (cluster, manager)
    }

    /// Helper to list `Kind/namespace/name action` for every entry.
    fn summary(changeset: &crate::ssa::ChangeSet) -> Vec<String> {
        changeset.entries().iter().map(|e| e.to_string()).collect()
    }

    #[tokio::test]
    async fn test_diff_unchanged_and_changed() {
        let (_, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        let cm = config_map("default", "settings", "  key: a\n");

        manager.apply_all(&ctx, &[cm.clone(), object(SECRET)], &opts).await.unwrap();

        for unchanged in [cm.clone(), object(SECRET)] {
            let outcome = manager.diff(&ctx, &unchanged, &opts).await.unwrap();
            assert_eq!(outcome.entry.action, Action::Unchanged);
            assert_eq!(outcome.entry.patch, None);
        }

        let changed = config_map("default", "settings", "  key: diff-test\n");
        let outcome = manager.diff(&ctx, &changed, &opts).await.unwrap();
        assert_eq!(outcome.entry.action, Action::Configured);
        assert_eq!(
            outcome.merged.unwrap().get_nested_str(&["data", "key"]),
            Some("diff-test")
        );
        assert_eq!(
            outcome.live.unwrap().get_nested_str(&["data", "key"]),
            Some("a")
        );
        assert_eq!(
            outcome.entry.patch.as_deref(),
            Some(r#"~ .data.key: "a" -> "diff-test""#)
        );
    }

    #[tokio::test]
    async fn test_diff_masks_secret_values() {
        let (_, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        manager.apply(&ctx, &object(SECRET), &opts).await.unwrap();

        let mut changed = object(SECRET);
        changed.set_nested(&["stringData", "key.new"], "diff-test".into());

        let outcome = manager.diff(&ctx, &changed, &opts).await.unwrap();
        assert_eq!(outcome.entry.action, Action::Configured);

        let merged = outcome.merged.unwrap();
        assert_eq!(
            merged.get_nested_str(&["stringData", "key.new"]),
            Some("***")
        );
        assert_eq!(merged.get_nested_str(&["stringData", "key"]), Some("***"));
        assert!(!to_json(&merged).unwrap().contains("diff-test"));
        assert!(!to_json(&outcome.live.unwrap()).unwrap().contains("private"));

        let patch = outcome.entry.patch.unwrap();
        assert!(patch.contains("***"));
        assert!(!patch.contains("diff-test"));
    }

    #[tokio::test]
    async fn test_changed_secret_value_is_marked() {
        let (_, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        manager.apply(&ctx, &object(SECRET), &opts).await.unwrap();

        let mut changed = object(SECRET);
        changed.set_nested(&["stringData", "key"], "rotated".into());

        let outcome = manager.diff(&ctx, &changed, &opts).await.unwrap();
        assert_eq!(
            outcome.live.unwrap().get_nested_str(&["stringData", "key"]),
            Some("*** (before)")
        );
        assert_eq!(
            outcome.merged.unwrap().get_nested_str(&["stringData", "key"]),
            Some("*** (after)")
        );
    }

    #[tokio::test]
    async fn test_removed_field_is_pruned() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        let base = config_map("default", "settings", "  key: a\n");
        let with_token = config_map("default", "settings", "  key: a\n  token: t\n");

        manager.apply(&ctx, &base, &opts).await.unwrap();

        let added = manager.diff(&ctx, &with_token, &opts).await.unwrap();
        assert_eq!(added.entry.action, Action::Configured);
        assert_eq!(
            added.merged.unwrap().get_nested_str(&["data", "token"]),
            Some("t")
        );
        manager.apply(&ctx, &with_token, &opts).await.unwrap();

        let removed = manager.diff(&ctx, &base, &opts).await.unwrap();
        assert_eq!(removed.entry.action, Action::Configured);
        assert!(removed.merged.unwrap().get_nested(&["data", "token"]).is_none());

        let entry = manager.apply(&ctx, &base, &opts).await.unwrap();
        assert_eq!(entry.action, Action::Configured);
        let live = cluster.get(&id_of(&base)).await.unwrap().unwrap();
        assert!(live.get_nested(&["data", "token"]).is_none());
        assert_eq!(live.get_nested_str(&["data", "key"]), Some("a"));

        let again = manager.diff(&ctx, &base, &opts).await.unwrap();
        assert_eq!(again.entry.action, Action::Unchanged);
    }

    #[tokio::test]
    async fn test_removed_list_item_is_pruned() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        let one = object(HPA);
        let two = object(&format!("{}{}", HPA.trim_end(), PODS_METRIC));

        manager.apply(&ctx, &two, &opts).await.unwrap();

        let outcome = manager.diff(&ctx, &one, &opts).await.unwrap();
        assert_eq!(outcome.entry.action, Action::Configured);
        manager.apply(&ctx, &one, &opts).await.unwrap();

        let live = cluster.get(&id_of(&one)).await.unwrap().unwrap();
        let metrics = live.get_nested_list(&["spec", "metrics"]).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].get_nested_str(&["type"]), Some("Resource"));

        let outcome = manager.diff(&ctx, &one, &opts).await.unwrap();
        assert_eq!(outcome.entry.action, Action::Unchanged);

        let outcome = manager.diff(&ctx, &two, &opts).await.unwrap();
        assert_eq!(outcome.entry.action, Action::Configured);
    }

    /// Helper to build a single-container Deployment with extra container
    /// fields.
    fn deployment(container_fields: &str) -> Value {
        object(&format!(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: default
spec:
  template:
    spec:
      containers:
      - name: app
        image: nginx
{}"#,
            container_fields
        ))
    }

    #[tokio::test]
    async fn test_removed_field_of_kept_container_is_pruned() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        let with_policy = deployment("        imagePullPolicy: Always\n");
        let without_policy = deployment("");

        manager.apply(&ctx, &with_policy, &opts).await.unwrap();

        let outcome = manager.diff(&ctx, &without_policy, &opts).await.unwrap();
        assert_eq!(outcome.entry.action, Action::Configured);

        let entry = manager.apply(&ctx, &without_policy, &opts).await.unwrap();
        assert_eq!(entry.action, Action::Configured);

        let live = cluster.get(&id_of(&without_policy)).await.unwrap().unwrap();
        let containers = live
            .get_nested_list(&["spec", "template", "spec", "containers"])
            .unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].get_nested_str(&["image"]), Some("nginx"));
        assert!(containers[0].get_nested(&["imagePullPolicy"]).is_none());

        let again = manager.diff(&ctx, &without_policy, &opts).await.unwrap();
        assert_eq!(again.entry.action, Action::Unchanged);
    }

    #[tokio::test]
    async fn test_emptied_map_is_pruned() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        let filled = config_map("default", "settings", "  key: a\n");
        let emptied = object(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n  namespace: default\ndata: {}\n",
        );

        manager.apply(&ctx, &filled, &opts).await.unwrap();

        let outcome = manager.diff(&ctx, &emptied, &opts).await.unwrap();
        assert_eq!(outcome.entry.action, Action::Configured);

        let entry = manager.apply(&ctx, &emptied, &opts).await.unwrap();
        assert_eq!(entry.action, Action::Configured);

        let live = cluster.get(&id_of(&emptied)).await.unwrap().unwrap();
        assert!(live.get_nested(&["data", "key"]).is_none());

        let again = manager.diff(&ctx, &emptied, &opts).await.unwrap();
        assert_eq!(again.entry.action, Action::Unchanged);
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        let objects = vec![
            config_map("default", "settings", "  key: a\n"),
            object(SECRET),
        ];

        let first = manager.apply_all(&ctx, &objects, &opts).await.unwrap();
        assert_eq!(
            summary(&first),
            vec!["ConfigMap/default/settings created", "Secret/default/creds created"]
        );
        assert_eq!(cluster.writes(), 2);

        let second = manager.apply_all(&ctx, &objects, &opts).await.unwrap();
        assert!(!second.has_changes());
        assert_eq!(
            summary(&second),
            vec!["ConfigMap/default/settings unchanged", "Secret/default/creds unchanged"]
        );
        assert_eq!(cluster.writes(), 2);
    }

    #[tokio::test]
    async fn test_foreign_fields_are_not_drift() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        let cm = config_map("default", "settings", "  key: a\n");
        manager.apply(&ctx, &cm, &opts).await.unwrap();

        let mut edited = cluster.get(&id_of(&cm)).await.unwrap().unwrap();
        edited.set_nested(&["data", "other"], "x".into());
        cluster.update_as("kubectl-edit", edited).await.unwrap();

        let outcome = manager.diff(&ctx, &cm, &opts).await.unwrap();
        assert_eq!(outcome.entry.action, Action::Unchanged);

        // the foreign field is not ours to prune
        manager.apply(&ctx, &cm, &opts).await.unwrap();
        let live = cluster.get(&id_of(&cm)).await.unwrap().unwrap();
        assert_eq!(live.get_nested_str(&["data", "other"]), Some("x"));
    }

    #[tokio::test]
    async fn test_conflict_requires_force() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let cm = config_map("default", "settings", "  key: a\n");
        manager.apply(&ctx, &cm, &ApplyOptions::default()).await.unwrap();

        let mut edited = cluster.get(&id_of(&cm)).await.unwrap().unwrap();
        edited.set_nested(&["data", "key"], "edited".into());
        cluster.update_as("kubectl-edit", edited).await.unwrap();

        let err = manager
            .diff(&ctx, &cm, &ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = manager
            .apply_all(&ctx, &[cm.clone()], &ApplyOptions::default())
            .await
            .unwrap_err();
        let subject = id_of(&cm).subject();
        assert!(matches!(err.failure(&subject), Some(Error::Conflict(_))));
        assert!(!err.is_aborted());
        let entry = err.changeset.get(&subject).unwrap();
        assert_eq!(entry.action, Action::Unchanged);
        assert!(entry.is_failed());

        let forced = ApplyOptions::default().with_force(true);
        let changeset = manager.apply_all(&ctx, &[cm.clone()], &forced).await.unwrap();
        assert_eq!(changeset.get(&subject).unwrap().action, Action::Configured);
        let live = cluster.get(&id_of(&cm)).await.unwrap().unwrap();
        assert_eq!(live.get_nested_str(&["data", "key"]), Some("a"));
    }

    #[tokio::test]
    async fn test_exclusions_are_skipped() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let cm = config_map("default", "settings", "  key: a\n");

        let opts = ApplyOptions::default().with_exclusion(id_of(&cm));
        let entry = manager.apply(&ctx, &cm, &opts).await.unwrap();
        assert_eq!(entry.action, Action::Skipped);

        let mut annotated = cm.clone();
        annotated.set_nested(
            &["metadata", "annotations", "ssa.example.com/ignore"],
            "true".into(),
        );
        let opts = ApplyOptions::default().with_exclusion_annotation("ssa.example.com/ignore", "true");
        let entry = manager.apply(&ctx, &annotated, &opts).await.unwrap();
        assert_eq!(entry.action, Action::Skipped);

        assert_eq!(cluster.writes(), 0);
        assert_eq!(cluster.get(&id_of(&cm)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_if_not_present_only_creates() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let mut opts = ApplyOptions::default();
        opts.if_not_present_annotations
            .insert("ssa.example.com/create-only".into(), "true".into());

        let mut cm = config_map("default", "settings", "  key: a\n");
        cm.set_nested(
            &["metadata", "annotations", "ssa.example.com/create-only"],
            "true".into(),
        );
        let entry = manager.apply(&ctx, &cm, &opts).await.unwrap();
        assert_eq!(entry.action, Action::Created);

        cm.set_nested(&["data", "key"], "b".into());
        let outcome = manager.diff(&ctx, &cm, &opts).await.unwrap();
        assert_eq!(outcome.entry.action, Action::Skipped);
        assert!(outcome.live.is_some());

        manager.apply(&ctx, &cm, &opts).await.unwrap();
        let live = cluster.get(&id_of(&cm)).await.unwrap().unwrap();
        assert_eq!(live.get_nested_str(&["data", "key"]), Some("a"));
    }

    #[tokio::test]
    async fn test_invalid_batch_is_refused() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let cm = config_map("default", "settings", "  key: a\n");

        let err = manager
            .apply_all(&ctx, &[cm.clone(), cm.clone()], &ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.reason, Some(Error::InvalidObject(_))));
        assert!(err.changeset.is_empty());

        let nameless = object("apiVersion: v1\nkind: ConfigMap\nmetadata: {}\n");
        let err = manager
            .apply_all_staged(&ctx, &[cm, nameless], &ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.reason, Some(Error::InvalidObject(_))));
        assert_eq!(cluster.writes(), 0);
    }

    #[tokio::test]
    async fn test_rejected_object_does_not_stop_batch() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let bad_hpa = object(
            "apiVersion: autoscaling/v2\nkind: HorizontalPodAutoscaler\nmetadata:\n  name: web\n  namespace: default\nspec:\n  metrics:\n  - resource:\n      name: cpu\n",
        );
        let cm = config_map("default", "settings", "  key: a\n");

        let err = manager
            .apply_all(&ctx, &[bad_hpa.clone(), cm.clone()], &ApplyOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert!(matches!(
            err.failure(&id_of(&bad_hpa).subject()),
            Some(Error::ValidationRejected(_))
        ));
        assert_eq!(
            err.changeset.get(&id_of(&cm).subject()).unwrap().action,
            Action::Created
        );
        assert!(cluster.get(&id_of(&cm)).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_staged_apply_orders_definitions_first() {
        let (cluster, manager) = setup_with(InMemoryCluster::new().with_establish_polls(2));
        let ctx = Context::background();
        let objects = vec![
            object(WIDGET),
            object(CRD),
            object(NAMESPACE),
            config_map("team", "settings", "  key: a\n"),
        ];

        let changeset = manager
            .apply_all_staged(&ctx, &objects, &ApplyOptions::default())
            .await
            .unwrap();
        assert_eq!(
            summary(&changeset),
            vec![
                "CustomResourceDefinition/widgets.example.com created",
                "Namespace/team created",
                "Widget/team/w created",
                "ConfigMap/team/settings created",
            ]
        );
        assert!(cluster.get(&id_of(&object(WIDGET))).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_pending_definition_is_waited_for() {
        let (cluster, manager) = setup_with(InMemoryCluster::new().with_establish_polls(3));
        let ctx = Context::background();

        let no_wait = ApplyOptions {
            wait_for_definitions: false,
            ..ApplyOptions::default()
        };
        manager
            .apply_all_staged(&ctx, &[object(CRD)], &no_wait)
            .await
            .unwrap();

        let objects = vec![object(WIDGET), object(CRD), object(NAMESPACE)];
        let changeset = manager
            .apply_all_staged(&ctx, &objects, &ApplyOptions::default())
            .await
            .unwrap();
        assert_eq!(
            summary(&changeset),
            vec![
                "CustomResourceDefinition/widgets.example.com unchanged",
                "Namespace/team created",
                "Widget/team/w created",
            ]
        );
        assert!(cluster.get(&id_of(&object(WIDGET))).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unstaged_apply_fails_dependents() {
        let (_, manager) = setup();
        let ctx = Context::background();
        let objects = vec![
            object(WIDGET),
            object(CRD),
            object(NAMESPACE),
            config_map("team", "settings", "  key: a\n"),
        ];

        let err = manager
            .apply_all(&ctx, &objects, &ApplyOptions::default().with_concurrency(1))
            .await
            .unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert!(err.failure(&id_of(&object(WIDGET)).subject()).is_some());
        assert_eq!(err.changeset.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_definition_wait_times_out() {
        let (_, manager) = setup_with(InMemoryCluster::new().with_establish_polls(1000));
        let ctx = Context::background();
        let opts = ApplyOptions::default().with_wait_timeout(Duration::from_secs(5));
        let objects = vec![
            object(CRD),
            object(WIDGET),
            object(NAMESPACE),
            config_map("team", "settings", "  key: a\n"),
        ];

        let err = manager.apply_all_staged(&ctx, &objects, &opts).await.unwrap_err();

        let crd_subject = id_of(&object(CRD)).subject();
        assert!(matches!(
            err.failure(&crd_subject),
            Some(Error::WaitTimedOut(_))
        ));
        let crd_entry = err.changeset.get(&crd_subject).unwrap();
        assert_eq!(crd_entry.action, Action::Created);
        assert!(matches!(crd_entry.error, Some(Error::WaitTimedOut(_))));

        // the batch went on; the widget's kind is still unknown
        assert!(matches!(
            err.failure(&id_of(&object(WIDGET)).subject()),
            Some(Error::ValidationRejected(_))
        ));
        assert_eq!(
            err.changeset
                .get(&id_of(&config_map("team", "settings", "")).subject())
                .unwrap()
                .action,
            Action::Created
        );
        assert_eq!(err.reason, None);
    }

    #[tokio::test]
    async fn test_failed_stage_blocks_next_stage() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let ns = object(NAMESPACE);
        let cm = config_map("default", "settings", "  key: a\n");
        cluster.reject(id_of(&ns), "quota exceeded").await;

        let err = manager
            .apply_all_staged(&ctx, &[ns.clone(), cm.clone()], &ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.reason, Some(Error::StageFailed(_))));
        assert_eq!(summary(&err.changeset).len(), 1);
        assert!(cluster.get(&id_of(&cm)).await.unwrap().is_none());

        let mut opts = ApplyOptions::default();
        opts.stage_blocking = false;
        let err = manager
            .apply_all_staged(&ctx, &[ns, cm.clone()], &opts)
            .await
            .unwrap_err();
        assert_eq!(err.reason, None);
        assert_eq!(err.failures.len(), 1);
        assert!(cluster.get(&id_of(&cm)).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_batch() {
        let (cluster, manager) = setup();
        cluster.set_latency(Duration::from_secs(1));
        let (ctx, handle) = Context::background().with_cancel();
        let objects: Vec<Value> = (1..=3)
            .map(|i| config_map("default", &format!("cm-{}", i), "  key: a\n"))
            .collect();
        let opts = ApplyOptions::default().with_concurrency(1);

        // each object takes a read, a dry run and a write
        let (result, _) = tokio::join!(manager.apply_all(&ctx, &objects, &opts), async {
            tokio::time::sleep(Duration::from_millis(4500)).await;
            handle.cancel();
        });

        let err = result.unwrap_err();
        assert!(matches!(err.reason, Some(Error::Cancelled(_))));
        assert_eq!(summary(&err.changeset), vec!["ConfigMap/default/cm-1 created"]);
        assert!(err.failures.is_empty());
        assert_eq!(cluster.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_batch() {
        let (cluster, manager) = setup();
        cluster.set_latency(Duration::from_secs(1));
        let ctx = Context::background().with_timeout(Duration::from_millis(4500));
        let objects: Vec<Value> = (1..=3)
            .map(|i| config_map("default", &format!("cm-{}", i), "  key: a\n"))
            .collect();

        let err = manager
            .apply_all(&ctx, &objects, &ApplyOptions::default().with_concurrency(1))
            .await
            .unwrap_err();
        assert!(matches!(err.reason, Some(Error::DeadlineExceeded(_))));
        assert_eq!(err.changeset.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_fails_objects() {
        let (cluster, manager) = setup();
        cluster.set_reachable(false);
        let ctx = Context::background();
        let cm = config_map("default", "settings", "  key: a\n");

        let err = manager
            .apply_all(&ctx, &[cm.clone()], &ApplyOptions::default())
            .await
            .unwrap_err();
        let failure = err.failure(&id_of(&cm).subject()).unwrap();
        assert!(failure.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_set() {
        let (_, manager) = setup_with(InMemoryCluster::new().with_establish_polls(3));
        let ctx = Context::background();
        let crd = object(CRD);
        let mut opts = ApplyOptions::default();
        opts.wait_for_definitions = false;
        manager.apply_all_staged(&ctx, &[crd.clone()], &opts).await.unwrap();

        let short = WaitOptions {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(1),
        };
        let err = manager
            .wait_for_set(&ctx, &[id_of(&crd)], short)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::WaitTimedOut(
                "timeout waiting for: [CustomResourceDefinition/widgets.example.com]".into()
            )
        );

        let long = WaitOptions {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        };
        manager.wait_for_set(&ctx, &[id_of(&crd)], long).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let opts = ApplyOptions::default();
        let a = config_map("default", "a", "  key: a\n");
        let mut b = config_map("default", "b", "  key: b\n");
        b.set_nested(&["metadata", "annotations", "ssa.example.com/keep"], "true".into());
        let missing = config_map("default", "missing", "  key: c\n");
        manager.apply_all(&ctx, &[a.clone(), b.clone()], &opts).await.unwrap();

        let mut delete_opts = DeleteOptions::default();
        delete_opts
            .exclusion_annotations
            .insert("ssa.example.com/keep".into(), "true".into());
        let changeset = manager
            .delete_all(&ctx, &[a.clone(), b.clone(), missing], &delete_opts)
            .await
            .unwrap();

        assert_eq!(
            summary(&changeset),
            vec![
                "ConfigMap/default/a deleted",
                "ConfigMap/default/b skipped",
                "ConfigMap/default/missing unchanged",
            ]
        );
        assert!(cluster.get(&id_of(&a)).await.unwrap().is_none());
        assert!(cluster.get(&id_of(&b)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_stale() {
        let (cluster, manager) = setup();
        let ctx = Context::background();
        let a = config_map("default", "a", "  key: a\n");
        let b = config_map("default", "b", "  key: b\n");
        manager
            .apply_all(&ctx, &[a.clone(), b.clone()], &ApplyOptions::default())
            .await
            .unwrap();

        let previous = cluster.snapshot().await;
        let changeset = manager
            .delete_stale(&ctx, &previous, &[a.clone()], &DeleteOptions::default())
            .await
            .unwrap();

        assert_eq!(summary(&changeset), vec!["ConfigMap/default/b deleted"]);
        assert!(cluster.get(&id_of(&a)).await.unwrap().is_some());
    }
}
