//! Reconciliation logic for ZookeeperCluster resources
//!
//! One pass: fetch, default, finalizer, rolling restart, children, orphan
//! claims, status. Any step error aborts the pass; the controller retries it
//! through [`error_policy`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::cleanup::{delete_all_pvcs, delete_orphan_pvcs};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::state_machine::{
    RolloutStatus, TransitionResult, UpgradeContext, UpgradeEvent, UpgradeStateMachine, evaluate,
};
use crate::controller::status::{ConditionBuilder, StatusManager, aggregate_members, reasons};
use crate::controller::validation::validate_spec;
use crate::crd::{VolumeReclaimPolicy, ZookeeperCluster, ZookeeperClusterStatus};
use crate::health::ControllerKind;
use crate::resources::common::{RESTART_TIME_ANNOTATION, client_service_uri, cluster_selector};
use crate::resources::sync::{ChildResource, synchronize, with_desired_hash};
use crate::resources::{config_map, pdb, service, service_account, statefulset};
use crate::zookeeper::{create_cluster_node, record_cluster_size};

/// Finalizer guarding data volume cleanup
pub const FINALIZER: &str = "cleanUpZookeeperPVC";

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<ZookeeperCluster>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let ns = cluster
        .namespace()
        .ok_or(Error::MissingObjectKey("namespace"))?;
    let name = cluster.name_any();

    debug!("Reconciling ZookeeperCluster");

    // The cached object may lag behind; always work on the latest version.
    let api: Api<ZookeeperCluster> = Api::namespaced(ctx.client.clone(), &ns);
    let Some(cluster) = api.get_opt(&name).await? else {
        debug!("ZookeeperCluster no longer exists");
        ctx.clear_failures(&failure_key(&ns, &name));
        return Ok(Action::await_change());
    };

    let result = reconcile_cluster(&api, cluster, &ctx).await;

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_reconcile(
            ControllerKind::Cluster,
            &ns,
            &name,
            start.elapsed().as_secs_f64(),
        );
    }
    if result.is_ok() {
        ctx.clear_failures(&failure_key(&ns, &name));
    }

    result
}

/// Error policy for the cluster controller with exponential backoff
pub fn error_policy(cluster: Arc<ZookeeperCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let ns = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();

    if let Some(ref health_state) = ctx.health_state {
        health_state
            .metrics
            .record_error(ControllerKind::Cluster, error.kind());
    }

    let attempt = ctx.record_failure(&failure_key(&ns, &name), error);
    let delay = ctx.backoff.delay_for_error(error, attempt);

    if error.is_retryable() {
        warn!(
            "Retryable error for {}/{}: {}, requeuing in {:?}",
            ns, name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}/{}: {}, requeuing in {:?}",
            ns, name, error, delay
        );
    }

    Action::requeue(delay)
}

fn failure_key(ns: &str, name: &str) -> String {
    format!("zookeepercluster/{}/{}", ns, name)
}

async fn reconcile_cluster(
    api: &Api<ZookeeperCluster>,
    mut cluster: ZookeeperCluster,
    ctx: &Context,
) -> Result<Action> {
    let name = cluster.name_any();
    let ns = cluster.namespace().unwrap_or_default();

    if cluster.spec.with_defaults() {
        info!("Applying spec defaults");
        api.replace(&name, &PostParams::default(), &cluster).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    if cluster.metadata.deletion_timestamp.is_some() {
        return handle_deletion(api, cluster, ctx).await;
    }

    cluster = ensure_finalizer(api, cluster, ctx.config.disable_finalizer).await?;

    if cluster.spec.trigger_rolling_restart {
        cluster = trigger_rolling_restart(api, cluster).await?;
    }

    validate_spec(&cluster)?;

    // Children, in a fixed order
    reconcile_child(ctx, &ns, config_map::generate_config_map(&cluster)).await?;
    let sts = reconcile_statefulset(ctx, &cluster).await?;
    reconcile_child(ctx, &ns, service::generate_client_service(&cluster)).await?;
    reconcile_child(ctx, &ns, service::generate_headless_service(&cluster)).await?;
    reconcile_child(ctx, &ns, service::generate_admin_service(&cluster)).await?;
    reconcile_child(ctx, &ns, pdb::generate_pdb(&cluster)).await?;
    if let Some(sa) = service_account::generate_service_account(&cluster) {
        reconcile_child(ctx, &ns, sa).await?;
    }

    cleanup_orphan_pvcs(ctx, &cluster, &sts).await?;

    if let Some(ref health_state) = ctx.health_state {
        let (_, ready) = sts_replicas(&sts);
        health_state.metrics.set_cluster_replicas(
            &ns,
            &name,
            i64::from(cluster.spec.replicas),
            i64::from(ready),
        );
    }

    update_status(ctx, &cluster, &sts).await?;

    Ok(Action::requeue(ctx.config.reconcile_interval))
}

/// Create a child if absent, otherwise write it back only when the desired
/// hash differs from the observed one. Returns the object as stored.
pub(crate) async fn reconcile_child<T: ChildResource>(
    ctx: &Context,
    ns: &str,
    desired: T,
) -> Result<T> {
    let desired = with_desired_hash(desired)?;
    let api: Api<T> = Api::namespaced(ctx.client.clone(), ns);
    let name = desired.name_any();
    let kind = T::kind(&());

    match api.get_opt(&name).await? {
        None => {
            let created = api.create(&PostParams::default(), &desired).await?;
            info!("Created {} {}", kind, name);
            Ok(created)
        }
        Some(observed) => match synchronize(&observed, &desired) {
            None => {
                debug!("{} {} is up to date", kind, name);
                Ok(observed)
            }
            Some(merged) => {
                let updated = api.replace(&name, &PostParams::default(), &merged).await?;
                info!("Updated {} {}", kind, name);
                Ok(updated)
            }
        },
    }
}

/// The StatefulSet is reconciled like any other child, except that a
/// replica change is recorded in the metadata znode before it is applied.
async fn reconcile_statefulset(
    ctx: &Context,
    cluster: &ZookeeperCluster,
) -> Result<StatefulSet> {
    let ns = cluster.namespace().unwrap_or_default();
    let api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), &ns);
    let desired = statefulset::generate_statefulset(cluster);

    if let Some(observed) = api.get_opt(&desired.name_any()).await? {
        let observed_replicas = observed.spec.as_ref().and_then(|s| s.replicas);
        let meta_root_created = cluster
            .status
            .as_ref()
            .is_some_and(|s| s.meta_root_created);

        if meta_root_created && observed_replicas != Some(cluster.spec.replicas) {
            info!(
                from = ?observed_replicas,
                to = cluster.spec.replicas,
                "Cluster size changing, updating metadata"
            );
            record_cluster_size(ctx.metadata.as_ref(), cluster).await?;
        }
    }

    reconcile_child(ctx, &ns, desired).await
}

/// Observed `(replicas, readyReplicas)` of the StatefulSet
fn sts_replicas(sts: &StatefulSet) -> (i32, i32) {
    sts.status
        .as_ref()
        .map(|s| (s.replicas, s.ready_replicas.unwrap_or(0)))
        .unwrap_or((0, 0))
}

/// Claims of members being removed stay until the StatefulSet runs exactly
/// the requested number of ready replicas.
fn scaling_settled(cluster: &ZookeeperCluster, sts: &StatefulSet) -> bool {
    let (replicas, ready) = sts_replicas(sts);
    replicas == cluster.spec.replicas && ready == cluster.spec.replicas
}

async fn cleanup_orphan_pvcs(
    ctx: &Context,
    cluster: &ZookeeperCluster,
    sts: &StatefulSet,
) -> Result<()> {
    if cluster.spec.persistence.reclaim_policy == VolumeReclaimPolicy::Retain {
        return Ok(());
    }

    if !scaling_settled(cluster, sts) {
        let (replicas, ready) = sts_replicas(sts);
        debug!(replicas, ready, "Skipping orphan claim cleanup until scaling settles");
        return Ok(());
    }

    let deleted = delete_orphan_pvcs(
        &ctx.client,
        &cluster.namespace().unwrap_or_default(),
        &cluster.name_any(),
        cluster.spec.replicas,
    )
    .await?;
    if deleted > 0 {
        info!(deleted, "Removed orphaned data volume claims");
    }
    Ok(())
}

/// Compute the new status, write it when it changed and surface a stalled
/// upgrade as an error.
async fn update_status(
    ctx: &Context,
    cluster: &ZookeeperCluster,
    sts: &StatefulSet,
) -> Result<()> {
    let ns = cluster.namespace().unwrap_or_default();
    let name = cluster.name_any();
    let now = Utc::now();

    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &ns);
    let pods = pods
        .list(&ListParams::default().labels(&cluster_selector(&name)))
        .await?
        .items;

    let mut status = cluster.status.clone().unwrap_or_default();
    let (replicas, ready) = sts_replicas(sts);
    status.replicas = replicas;
    status.ready_replicas = ready;
    status.members = aggregate_members(&pods);
    status.internal_client_endpoint = client_service_uri(cluster);

    let pods_ready = ready == cluster.spec.replicas;
    let (reason, message) = if pods_ready {
        (reasons::CLUSTER_READY, String::new())
    } else {
        (
            reasons::WAITING_FOR_PODS,
            format!("{}/{} replicas ready", ready, cluster.spec.replicas),
        )
    };
    status.conditions =
        ConditionBuilder::from_existing(std::mem::take(&mut status.conditions), now)
            .init()
            .pods_ready(pods_ready, reason, &message)
            .build();

    if pods_ready && !status.meta_root_created {
        create_cluster_node(ctx.metadata.as_ref(), cluster).await?;
        status.meta_root_created = true;
    }

    let upgrade = UpgradeContext::new(
        cluster,
        &status,
        RolloutStatus::from_statefulset(sts),
        now,
        ctx.config.progress_deadline,
    );
    let machine = UpgradeStateMachine::new();
    let stalled = match evaluate(&machine, &mut status, &upgrade) {
        Some(TransitionResult::Success {
            from,
            to,
            event,
            description,
        }) => {
            info!(%from, %to, %event, "{}", description);
            event == UpgradeEvent::ProgressStalled
        }
        Some(TransitionResult::GuardFailed { event, reason, .. }) => {
            debug!(%event, "Upgrade transition blocked: {}", reason);
            false
        }
        Some(TransitionResult::InvalidTransition { current, event }) => {
            debug!(%current, %event, "No upgrade transition for event");
            false
        }
        None => false,
    };

    let status_manager = StatusManager::new(cluster, ctx);
    if status_manager.changed(&status) {
        status_manager.update(&status).await?;
        debug!("Status updated");
    }

    if stalled {
        if let Some(ref health_state) = ctx.health_state {
            health_state.metrics.record_upgrade_failed(&ns, &name);
        }
        return Err(stalled_error(&status, &upgrade));
    }

    Ok(())
}

fn stalled_error(status: &ZookeeperClusterStatus, upgrade: &UpgradeContext) -> Error {
    Error::ProgressDeadlineExceeded {
        target_version: status.target_version.clone(),
        updated: upgrade.recorded_progress,
        deadline: upgrade.deadline,
    }
}

fn has_finalizer(cluster: &ZookeeperCluster) -> bool {
    cluster.finalizers().iter().any(|f| f == FINALIZER)
}

/// Make the finalizer list match the operator config.
///
/// Returns true when the list changed and must be persisted.
fn apply_finalizer_policy(cluster: &mut ZookeeperCluster, disable_finalizer: bool) -> bool {
    if has_finalizer(cluster) != disable_finalizer {
        return false;
    }
    if disable_finalizer {
        cluster.finalizers_mut().retain(|f| f != FINALIZER);
    } else {
        cluster.finalizers_mut().push(FINALIZER.to_string());
    }
    true
}

/// Add or remove the cleanup finalizer according to the operator config
async fn ensure_finalizer(
    api: &Api<ZookeeperCluster>,
    mut cluster: ZookeeperCluster,
    disable_finalizer: bool,
) -> Result<ZookeeperCluster> {
    if !apply_finalizer_policy(&mut cluster, disable_finalizer) {
        return Ok(cluster);
    }

    if disable_finalizer {
        info!("Removed finalizer {}", FINALIZER);
    } else {
        info!("Added finalizer {}", FINALIZER);
    }
    Ok(api
        .replace(&cluster.name_any(), &PostParams::default(), &cluster)
        .await?)
}

/// Stamp the pod template with `now` and clear the trigger, returning the
/// stamped restart time
fn stamp_rolling_restart(cluster: &mut ZookeeperCluster, now: DateTime<Utc>) -> String {
    let restart_time = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    cluster
        .spec
        .pod
        .annotations
        .insert(RESTART_TIME_ANNOTATION.to_string(), restart_time.clone());
    cluster.spec.trigger_rolling_restart = false;
    restart_time
}

/// Persist a requested rolling restart
async fn trigger_rolling_restart(
    api: &Api<ZookeeperCluster>,
    mut cluster: ZookeeperCluster,
) -> Result<ZookeeperCluster> {
    let restart_time = stamp_rolling_restart(&mut cluster, Utc::now());
    info!(restart_time = %restart_time, "Triggering rolling restart");
    Ok(api
        .replace(&cluster.name_any(), &PostParams::default(), &cluster)
        .await?)
}

/// Release data volumes (per reclaim policy) and drop the finalizer
async fn handle_deletion(
    api: &Api<ZookeeperCluster>,
    mut cluster: ZookeeperCluster,
    ctx: &Context,
) -> Result<Action> {
    if !has_finalizer(&cluster) {
        return Ok(Action::await_change());
    }

    let name = cluster.name_any();
    let ns = cluster.namespace().unwrap_or_default();
    info!("Handling deletion of {}", name);

    if cluster.spec.persistence.reclaim_policy == VolumeReclaimPolicy::Delete {
        let deleted = delete_all_pvcs(&ctx.client, &ns, &name).await?;
        info!(deleted, "Deleted data volume claims");
    } else {
        info!("Reclaim policy is Retain, keeping data volume claims");
    }

    cluster.finalizers_mut().retain(|f| f != FINALIZER);
    api.replace(&name, &PostParams::default(), &cluster).await?;
    info!("Removed finalizer from {}", name);

    Ok(Action::await_change())
}
