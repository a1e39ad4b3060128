pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;
pub mod zookeeper;

pub use controller::{
    BackoffConfig, Context, Error, FINALIZER, OperatorConfig, Result, backup_error_policy,
    error_policy, reconcile, reconcile_backup,
};
pub use crd::{ZookeeperBackup, ZookeeperCluster};
pub use health::{HealthState, Metrics};

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service, ServiceAccount};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Log a controller stream result. Reconciles of objects that were deleted
/// in the meantime are expected and only logged at debug level.
fn log_result<K, E>(
    result: std::result::Result<
        (kube::runtime::reflector::ObjectRef<K>, kube::runtime::controller::Action),
        kube::runtime::controller::Error<Error, E>,
    >,
) where
    K: Resource,
    E: std::error::Error,
{
    match result {
        Ok((obj, _action)) => {
            tracing::debug!("Reconciled: {}", obj.name);
        }
        Err(e) => {
            let is_not_found = matches!(
                &e,
                kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
            );
            if is_not_found {
                tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
            } else {
                tracing::error!("Reconciliation error: {:?}", e);
            }
        }
    }
}

/// Run the ZookeeperCluster controller.
///
/// When `ctx.config.watch_namespace` is set only that namespace is watched,
/// otherwise the whole cluster. The controller stops once `shutdown`
/// resolves.
pub async fn run_cluster_controller<F>(ctx: Arc<Context>, shutdown: F)
where
    F: Future<Output = ()> + Send + Sync + 'static,
{
    let client = ctx.client.clone();
    let namespace = ctx.config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    tracing::info!(
        "Starting controller for ZookeeperCluster resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    let clusters: Api<ZookeeperCluster> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let configmaps: Api<ConfigMap> = scoped_api(client.clone(), namespace);
    let pdbs: Api<PodDisruptionBudget> = scoped_api(client.clone(), namespace);
    let service_accounts: Api<ServiceAccount> = scoped_api(client.clone(), namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(clusters, watcher_config.clone())
        .owns(statefulsets, watcher_config.clone())
        .owns(services, watcher_config.clone())
        .owns(configmaps, watcher_config.clone())
        .owns(pdbs, watcher_config.clone())
        .owns(service_accounts, watcher_config)
        .graceful_shutdown_on(shutdown)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move { log_result(result) })
        .await;

    tracing::info!("ZookeeperCluster controller stopped");
}

/// Run the ZookeeperBackup controller, scoped like the cluster controller.
pub async fn run_backup_controller<F>(ctx: Arc<Context>, shutdown: F)
where
    F: Future<Output = ()> + Send + Sync + 'static,
{
    let client = ctx.client.clone();
    let namespace = ctx.config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    tracing::info!(
        "Starting controller for ZookeeperBackup resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    let backups: Api<ZookeeperBackup> = scoped_api(client.clone(), namespace);
    let cronjobs: Api<CronJob> = scoped_api(client.clone(), namespace);
    let claims: Api<PersistentVolumeClaim> = scoped_api(client.clone(), namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(backups, watcher_config.clone())
        .owns(cronjobs, watcher_config.clone())
        .owns(claims, watcher_config)
        .graceful_shutdown_on(shutdown)
        .run(reconcile_backup, backup_error_policy, ctx)
        .for_each(|result| async move { log_result(result) })
        .await;

    tracing::info!("ZookeeperBackup controller stopped");
}

/// Resolves on SIGTERM or SIGINT
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
