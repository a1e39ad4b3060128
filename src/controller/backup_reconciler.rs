//! Reconciliation logic for ZookeeperBackup resources
//!
//! The backup CronJob must run next to the data of the current quorum
//! leader. Every pass asks the ensemble's admin server who leads, finds the
//! matching member pod and pins the job to that pod's node and data claim.
//! The job stays suspended whenever the leader cannot be placed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::reconciler::reconcile_child;
use crate::crd::{ZookeeperBackup, ZookeeperCluster};
use crate::health::ControllerKind;
use crate::resources::backup::{
    generate_backup_cronjob, generate_backup_pvc, pin_to_leader, set_suspended,
};
use crate::resources::common::cluster_selector;
use crate::zookeeper::{find_leader_pod, lookup_leader};

/// Reconcile a ZookeeperBackup resource
#[instrument(skip(backup, ctx), fields(name = %backup.name_any(), namespace = backup.namespace().unwrap_or_default()))]
pub async fn reconcile_backup(backup: Arc<ZookeeperBackup>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let ns = backup
        .namespace()
        .ok_or(Error::MissingObjectKey("namespace"))?;
    let name = backup.name_any();

    debug!("Reconciling ZookeeperBackup");

    let api: Api<ZookeeperBackup> = Api::namespaced(ctx.client.clone(), &ns);
    let Some(backup) = api.get_opt(&name).await? else {
        debug!("ZookeeperBackup no longer exists");
        ctx.clear_failures(&failure_key(&ns, &name));
        return Ok(Action::await_change());
    };

    let result = reconcile_backup_inner(&api, backup, &ctx).await;

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_reconcile(
            ControllerKind::Backup,
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

/// Error policy for the backup controller with exponential backoff
pub fn backup_error_policy(
    backup: Arc<ZookeeperBackup>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    let ns = backup.namespace().unwrap_or_default();
    let name = backup.name_any();

    if let Some(ref health_state) = ctx.health_state {
        health_state
            .metrics
            .record_error(ControllerKind::Backup, error.kind());
    }

    let attempt = ctx.record_failure(&failure_key(&ns, &name), error);
    let delay = ctx.backoff.delay_for_error(error, attempt);

    if error.is_retryable() {
        warn!(
            "Retryable error for backup {}/{}: {}, requeuing in {:?}",
            ns, name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for backup {}/{}: {}, requeuing in {:?}",
            ns, name, error, delay
        );
    }

    Action::requeue(delay)
}

fn failure_key(ns: &str, name: &str) -> String {
    format!("zookeeperbackup/{}/{}", ns, name)
}

async fn reconcile_backup_inner(
    api: &Api<ZookeeperBackup>,
    mut backup: ZookeeperBackup,
    ctx: &Context,
) -> Result<Action> {
    let name = backup.name_any();
    let ns = backup.namespace().unwrap_or_default();

    if backup.spec.with_defaults() {
        info!("Applying backup defaults");
        api.replace(&name, &PostParams::default(), &backup).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    let clusters: Api<ZookeeperCluster> = Api::namespaced(ctx.client.clone(), &ns);
    let cluster = clusters
        .get_opt(&backup.spec.zookeeper_cluster)
        .await?
        .ok_or_else(|| {
            Error::ClusterNotFound(format!("{}/{}", ns, backup.spec.zookeeper_cluster))
        })?;

    reconcile_child(ctx, &ns, generate_backup_pvc(&backup)).await?;

    let leader = lookup_leader(&ctx.http, &cluster).await?;
    let hostname = leader.short_hostname();

    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &ns);
    let pods = pods
        .list(&ListParams::default().labels(&cluster_selector(&cluster.name_any())))
        .await?
        .items;

    let leader_pod = find_leader_pod(&pods, hostname);
    if leader_pod.is_none() {
        warn!(leader = %hostname, "No member pod matches the quorum leader, suspending backups");
    }

    let ready = cluster_ready(&cluster);
    let mut cronjob = generate_backup_cronjob(&backup);
    let suspended = place_backup_job(&mut cronjob, leader_pod, ready);
    debug!(leader = %hostname, cluster_ready = ready, suspended, "Placed backup job");

    reconcile_child(ctx, &ns, cronjob).await?;

    Ok(Action::requeue(ctx.config.reconcile_interval))
}

/// All replicas the cluster reports are ready
pub fn cluster_ready(cluster: &ZookeeperCluster) -> bool {
    cluster
        .status
        .as_ref()
        .is_some_and(|s| s.replicas > 0 && s.ready_replicas == s.replicas)
}

/// Point the job at the leader pod, or keep it suspended when the leader is
/// unknown, unscheduled, or the cluster is not ready.
///
/// Returns the resulting suspend flag.
pub fn place_backup_job(cronjob: &mut CronJob, leader: Option<&Pod>, cluster_ready: bool) -> bool {
    let node = leader.and_then(|pod| {
        pod.spec
            .as_ref()
            .and_then(|s| s.node_name.as_deref())
            .map(|node| (pod.name_any(), node))
    });

    let suspend = match node {
        Some((pod_name, node_name)) => {
            pin_to_leader(cronjob, &pod_name, node_name);
            !cluster_ready
        }
        None => true,
    };
    set_suspended(cronjob, suspend);
    suspend
}
