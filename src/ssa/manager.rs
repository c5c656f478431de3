//! The reconciliation engine.

use super::changeset::{Action, ChangeSet, ChangeSetEntry};
use super::classify::{classify, drift};
use super::context::Context;
use super::mask::Masker;
use super::options::{ApplyOptions, DeleteOptions, WaitOptions};
use super::prune::{reconcile_removals, stale_identities, RemovalPatch};
use super::stage::plan_stages;
use crate::cluster::{ApplyRequest, ClusterClient};
use crate::error::{BatchError, Error};
use crate::resource::{matches_any, ResourceIdentity};
use crate::schema::{kubernetes, Schema};
use crate::value::Value;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Shortest pause between two readiness polls.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// DiffOutcome is what a dry run says about one object.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffOutcome {
    pub entry: ChangeSetEntry,
    /// The live object, masked. None when the object does not exist.
    pub live: Option<Value>,
    /// The dry-run result, masked. None for skipped objects.
    pub merged: Option<Value>,
}

impl DiffOutcome {
    fn skipped(id: ResourceIdentity, live: Option<Value>) -> Self {
        DiffOutcome {
            entry: ChangeSetEntry::new(id, Action::Skipped),
            live,
            merged: None,
        }
    }
}

/// ResourceManager reconciles desired objects against a cluster.
///
/// Every write is preceded by a dry-run apply. The live object and the
/// dry-run result are compared over the fields the field manager owns; only
/// objects that would change are written.
#[derive(Clone)]
pub struct ResourceManager {
    client: Arc<dyn ClusterClient>,
    schema: Arc<Schema>,
    masker: Masker,
}

impl ResourceManager {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        ResourceManager {
            client,
            schema: kubernetes(),
            masker: Masker::default(),
        }
    }

    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_masker(mut self, masker: Masker) -> Self {
        self.masker = masker;
        self
    }

    pub fn client(&self) -> &Arc<dyn ClusterClient> {
        &self.client
    }

    /// Reports what applying `object` would do, without writing anything.
    pub async fn diff(
        &self,
        ctx: &Context,
        object: &Value,
        opts: &ApplyOptions,
    ) -> Result<DiffOutcome, Error> {
        let id = ResourceIdentity::from_object(object)?;
        let (outcome, _) = self.plan(ctx, id, object, opts).await?;
        Ok(outcome)
    }

    /// Applies `object` when the dry run shows a change. Unchanged and
    /// skipped objects are not written.
    pub async fn apply(
        &self,
        ctx: &Context,
        object: &Value,
        opts: &ApplyOptions,
    ) -> Result<ChangeSetEntry, Error> {
        let id = ResourceIdentity::from_object(object)?;
        let (outcome, removals) = self.plan(ctx, id, object, opts).await?;
        let entry = outcome.entry;
        if !entry.action.is_change() {
            debug!(subject = %entry.object_meta, action = %entry.action, "nothing to write");
            return Ok(entry);
        }

        let request = ApplyRequest::new(object.clone(), opts.field_manager.as_str())
            .force(opts.force)
            .removals(removals);
        ctx.run(self.client.apply(request)).await?;
        info!(subject = %entry.object_meta, action = %entry.action, "applied");
        Ok(entry)
    }

    async fn plan(
        &self,
        ctx: &Context,
        id: ResourceIdentity,
        object: &Value,
        opts: &ApplyOptions,
    ) -> Result<(DiffOutcome, RemovalPatch), Error> {
        if opts.exclusions.contains(&id) || matches_any(object, &opts.exclusion_annotations) {
            debug!(subject = %id, "excluded");
            return Ok((DiffOutcome::skipped(id, None), RemovalPatch::default()));
        }

        let live = ctx.run(self.client.get(&id)).await?;
        if let Some(live) = &live {
            if matches_any(object, &opts.if_not_present_annotations) {
                debug!(subject = %id, "exists and is only created");
                let live = self.masker.mask(live);
                return Ok((DiffOutcome::skipped(id, Some(live)), RemovalPatch::default()));
            }
        }

        let removals = reconcile_removals(object, live.as_ref(), &opts.field_manager, &self.schema)?;
        if !removals.is_empty() {
            debug!(subject = %id, fields = removals.paths.len(), "pruning fields");
        }
        let request = ApplyRequest::new(object.clone(), opts.field_manager.as_str())
            .force(opts.force)
            .dry_run(true)
            .removals(removals.clone());
        let merged = ctx.run(self.client.apply(request)).await?;
        let action = classify(live.as_ref(), &merged, &opts.field_manager, &self.schema)?;

        let mut entry = ChangeSetEntry::new(id, action);
        let (live, merged) = match &live {
            Some(live) => {
                let (before, after) = self.masker.mask_pair(live, &merged);
                if action == Action::Configured {
                    let changes = drift(live, &merged, &opts.field_manager, &self.schema)?;
                    entry = entry.with_patch(changes.render(&before, &after));
                }
                (Some(before), after)
            }
            None => (None, self.masker.mask(&merged)),
        };

        let outcome = DiffOutcome {
            entry,
            live,
            merged: Some(merged),
        };
        Ok((outcome, removals))
    }

    /// Applies a batch in one go, at most `opts.concurrency` objects at a
    /// time. Entries follow the input order.
    #[instrument(skip_all, fields(objects = objects.len()))]
    pub async fn apply_all(
        &self,
        ctx: &Context,
        objects: &[Value],
        opts: &ApplyOptions,
    ) -> Result<ChangeSet, BatchError> {
        let ids = identify(objects)?;
        run_batch(objects, ids, opts.concurrency, |object| {
            self.apply(ctx, object, opts)
        })
        .await
        .into_result()
    }

    /// Applies a batch in stages: namespaces and custom resource
    /// definitions first, then everything else.
    ///
    /// Every definition applied in the first stage, changed or not, is
    /// waited for before the next stage starts. A definition that is not established
    /// in time is reported as failed but does not stop the batch. A stage
    /// with failed objects keeps later stages from running when
    /// `opts.stage_blocking` is set.
    #[instrument(skip_all, fields(objects = objects.len()))]
    pub async fn apply_all_staged(
        &self,
        ctx: &Context,
        objects: &[Value],
        opts: &ApplyOptions,
    ) -> Result<ChangeSet, BatchError> {
        identify(objects)?;

        let stages = plan_stages(objects);
        let count = stages.len();
        let mut outcome = BatchOutcome::default();
        for (position, mut stage) in stages.into_iter().enumerate() {
            stage.begin();
            debug!(stage = stage.index, objects = stage.objects.len(), "applying stage");

            let ids = identify(&stage.objects)?;
            let stage_outcome = run_batch(&stage.objects, ids, opts.concurrency, |object| {
                self.apply(ctx, object, opts)
            })
            .await;
            let failed = stage_outcome.failures.len();
            outcome.extend(stage_outcome);
            if outcome.reason.is_some() {
                return outcome.into_result();
            }
            stage.finish(failed > 0);

            if stage.index == 0 && opts.wait_for_definitions {
                if let Err(err) = self.wait_for_definitions(ctx, &mut outcome, opts).await {
                    outcome.reason = Some(err);
                    return outcome.into_result();
                }
            }

            info!(stage = stage.index, state = %stage.state, "stage finished");
            if position + 1 < count && stage.blocks(opts.stage_blocking) {
                outcome.reason = Some(Error::StageFailed(format!(
                    "stage {} has {} failed object(s)",
                    stage.index, failed
                )));
                return outcome.into_result();
            }
        }
        outcome.into_result()
    }

    /// Waits for the definitions the batch applied so far. Definitions that
    /// stay pending get a `WaitTimedOut` error.
    async fn wait_for_definitions(
        &self,
        ctx: &Context,
        outcome: &mut BatchOutcome,
        opts: &ApplyOptions,
    ) -> Result<(), Error> {
        let definitions: Vec<ResourceIdentity> = outcome
            .changeset
            .entries()
            .iter()
            .filter(|e| e.object_meta.is_custom_resource_definition())
            .filter(|e| e.action != Action::Skipped && !e.is_failed())
            .map(|e| e.object_meta.clone())
            .collect();
        if definitions.is_empty() {
            return Ok(());
        }

        let pending = self.poll_ready(ctx, &definitions, opts.wait_options()).await?;
        for id in pending {
            let err = Error::WaitTimedOut(format!(
                "{} not established after {:?}",
                id, opts.wait_timeout
            ));
            warn!(subject = %id, "definition not established");
            if let Some(entry) = outcome.changeset.get_mut(&id.subject()) {
                entry.error = Some(err.clone());
            }
            outcome.failures.push((id.subject(), err));
        }
        Ok(())
    }

    /// Waits until every object in `ids` is ready.
    #[instrument(skip_all, fields(objects = ids.len()))]
    pub async fn wait_for_set(
        &self,
        ctx: &Context,
        ids: &[ResourceIdentity],
        opts: WaitOptions,
    ) -> Result<(), Error> {
        let pending = self.poll_ready(ctx, ids, opts).await?;
        if pending.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = pending.iter().map(ToString::to_string).collect();
        Err(Error::WaitTimedOut(format!(
            "timeout waiting for: [{}]",
            names.join(", ")
        )))
    }

    /// Polls readiness until every object is ready or the timeout passes,
    /// and returns the objects still pending. Failed checks count as not
    /// ready; only the context ending is an error.
    async fn poll_ready(
        &self,
        ctx: &Context,
        ids: &[ResourceIdentity],
        opts: WaitOptions,
    ) -> Result<Vec<ResourceIdentity>, Error> {
        let deadline = Instant::now() + opts.timeout;
        let interval = opts.interval.max(MIN_POLL_INTERVAL);
        let mut pending = ids.to_vec();

        loop {
            let mut still_pending = Vec::new();
            for id in pending {
                match ctx.run(self.client.is_ready(&id)).await {
                    Ok(true) => debug!(subject = %id, "ready"),
                    Ok(false) => still_pending.push(id),
                    Err(err) if err.is_context() => return Err(err),
                    Err(err) => {
                        debug!(subject = %id, error = %err, "readiness check failed");
                        still_pending.push(id);
                    }
                }
            }
            pending = still_pending;

            let now = Instant::now();
            if pending.is_empty() || now >= deadline {
                return Ok(pending);
            }
            ctx.sleep(interval.min(deadline - now)).await?;
        }
    }

    /// Deletes `object` from the cluster. Objects that do not exist are
    /// reported unchanged; live objects carrying an exclusion label or
    /// annotation are skipped.
    pub async fn delete(
        &self,
        ctx: &Context,
        object: &Value,
        opts: &DeleteOptions,
    ) -> Result<ChangeSetEntry, Error> {
        let id = ResourceIdentity::from_object(object)?;
        let Some(live) = ctx.run(self.client.get(&id)).await? else {
            return Ok(ChangeSetEntry::new(id, Action::Unchanged));
        };
        if matches_any(object, &opts.exclusion_annotations)
            || matches_any(&live, &opts.exclusion_annotations)
        {
            debug!(subject = %id, "excluded");
            return Ok(ChangeSetEntry::new(id, Action::Skipped));
        }

        match ctx.run(self.client.delete(&id)).await {
            Ok(()) => {
                info!(subject = %id, "deleted");
                Ok(ChangeSetEntry::new(id, Action::Deleted))
            }
            Err(Error::NotFound(_)) => Ok(ChangeSetEntry::new(id, Action::Unchanged)),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(objects = objects.len()))]
    pub async fn delete_all(
        &self,
        ctx: &Context,
        objects: &[Value],
        opts: &DeleteOptions,
    ) -> Result<ChangeSet, BatchError> {
        let ids = identify(objects)?;
        run_batch(objects, ids, opts.concurrency, |object| {
            self.delete(ctx, object, opts)
        })
        .await
        .into_result()
    }

    /// Deletes the objects of `previous` that `desired` no longer contains.
    #[instrument(skip_all, fields(previous = previous.len(), desired = desired.len()))]
    pub async fn delete_stale(
        &self,
        ctx: &Context,
        previous: &[Value],
        desired: &[Value],
        opts: &DeleteOptions,
    ) -> Result<ChangeSet, BatchError> {
        let previous_ids = identify(previous)?;
        let desired_ids = identify(desired)?;
        let stale: HashSet<ResourceIdentity> = stale_identities(&previous_ids, &desired_ids)
            .into_iter()
            .collect();

        let objects: Vec<Value> = previous
            .iter()
            .zip(&previous_ids)
            .filter(|(_, id)| stale.contains(*id))
            .map(|(object, _)| object.clone())
            .collect();
        self.delete_all(ctx, &objects, opts).await
    }
}

/// Reads every identity of a batch. A batch with an invalid object or the
/// same object twice is refused as a whole.
fn identify(objects: &[Value]) -> Result<Vec<ResourceIdentity>, BatchError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(objects.len());
    for object in objects {
        let id = ResourceIdentity::from_object(object).map_err(BatchError::rejected)?;
        if !seen.insert(id.clone()) {
            return Err(BatchError::rejected(Error::InvalidObject(format!(
                "{} appears more than once",
                id
            ))));
        }
        ids.push(id);
    }
    Ok(ids)
}

#[derive(Debug, Default)]
struct BatchOutcome {
    changeset: ChangeSet,
    failures: Vec<(String, Error)>,
    reason: Option<Error>,
}

impl BatchOutcome {
    fn record(&mut self, id: ResourceIdentity, result: Result<ChangeSetEntry, Error>) {
        match result {
            Ok(entry) => self.changeset.add(entry),
            Err(err) if err.is_context() => {
                if self.reason.is_none() {
                    warn!(subject = %id, error = %err, "batch aborted");
                    self.reason = Some(err);
                }
            }
            Err(err) => {
                warn!(subject = %id, error = %err, "object failed");
                self.failures.push((id.subject(), err.clone()));
                self.changeset
                    .add(ChangeSetEntry::new(id, Action::Unchanged).with_error(err));
            }
        }
    }

    fn extend(&mut self, other: BatchOutcome) {
        self.changeset.append(other.changeset);
        self.failures.extend(other.failures);
        if self.reason.is_none() {
            self.reason = other.reason;
        }
    }

    fn into_result(self) -> Result<ChangeSet, BatchError> {
        if self.failures.is_empty() && self.reason.is_none() {
            return Ok(self.changeset);
        }
        Err(BatchError {
            changeset: self.changeset,
            failures: self.failures,
            reason: self.reason,
        })
    }
}

/// Runs `op` over a batch with bounded concurrency, collecting the results
/// in input order.
async fn run_batch<'a, F, Fut>(
    objects: &'a [Value],
    ids: Vec<ResourceIdentity>,
    concurrency: usize,
    op: F,
) -> BatchOutcome
where
    F: Fn(&'a Value) -> Fut,
    Fut: Future<Output = Result<ChangeSetEntry, Error>>,
{
    let results: Vec<(ResourceIdentity, Result<ChangeSetEntry, Error>)> =
        stream::iter(objects.iter().zip(ids))
            .map(|(object, id)| {
                let fut = op(object);
                async move { (id, fut.await) }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

    let mut outcome = BatchOutcome::default();
    for (id, result) in results {
        outcome.record(id, result);
    }
    outcome
}
