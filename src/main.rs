use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::channel::oneshot;
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tracing::{error, info, warn};

use zookeeper_operator::health::{HealthState, run_health_server};
use zookeeper_operator::{
    Context, OperatorConfig, run_backup_controller, run_cluster_controller, shutdown_signal,
};

/// Lease configuration
const LEASE_NAME: &str = "zookeeper-operator-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install the TLS crypto provider before any TLS operations
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err(
            "Failed to install rustls crypto provider and no provider is available".into(),
        );
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zookeeper_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .init();

    info!("Starting zookeeper-operator");

    let config = OperatorConfig::from_env();
    info!(
        disable_finalizer = config.disable_finalizer,
        progress_deadline_secs = config.progress_deadline.as_secs(),
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        "Loaded operator configuration"
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let health_state = Arc::new(HealthState::new());

    // Probes must answer even while waiting for leadership
    let mut health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };

    info!(
        holder_id = %config.pod_name,
        namespace = %config.pod_namespace,
        lease_name = LEASE_NAME,
        "Initializing leader election"
    );

    let lease_params = || LeaseLockParams {
        holder_id: config.pod_name.clone(),
        lease_name: LEASE_NAME.to_string(),
        lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
    };
    let is_leader = Arc::new(AtomicBool::new(false));

    // Acquire leadership before starting the controllers
    let lease_lock = LeaseLock::new(client.clone(), &config.pod_namespace, lease_params());
    info!("Waiting to acquire leadership...");
    let acquire = async {
        loop {
            match lease_lock.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => {
                    info!("Acquired leadership");
                    is_leader.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(_) => info!("Another instance is leader, waiting..."),
                Err(e) => warn!("Failed to acquire lease: {}, retrying...", e),
            }
            tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
        }
    };
    tokio::select! {
        _ = acquire => {}
        _ = shutdown_signal() => {
            info!("Received shutdown signal before acquiring leadership");
            return Ok(());
        }
    }

    // Renewal only exits the process; the task never completes normally
    let lease_renewal_handle = {
        let is_leader = is_leader.clone();
        let lease_lock = LeaseLock::new(client.clone(), &config.pod_namespace, lease_params());

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

                match lease_lock.try_acquire_or_renew().await {
                    Ok(result) if result.acquired_lease => {}
                    Ok(_) => {
                        error!("Lost leadership! Shutting down...");
                        is_leader.store(false, Ordering::SeqCst);
                        // Exit so Kubernetes restarts us and we re-enter election
                        std::process::exit(1);
                    }
                    Err(e) => {
                        error!("Failed to renew lease: {}. Shutting down...", e);
                        is_leader.store(false, Ordering::SeqCst);
                        std::process::exit(1);
                    }
                }
            }
        })
    };

    let ctx = Arc::new(Context::new(client, config, Some(health_state.clone()))?);

    info!("Watching ZookeeperCluster resources (apiVersion: zookeeper.pravega.io/v1beta1)");
    info!("Watching ZookeeperBackup resources (apiVersion: zookeeper.pravega.io/v1beta1)");

    let (cluster_stop_tx, cluster_stop_rx) = oneshot::channel::<()>();
    let (backup_stop_tx, backup_stop_rx) = oneshot::channel::<()>();

    let mut cluster_handle = tokio::spawn(run_cluster_controller(
        ctx.clone(),
        cluster_stop_rx.map(|_| ()),
    ));
    let mut backup_handle = tokio::spawn(run_backup_controller(
        ctx.clone(),
        backup_stop_rx.map(|_| ()),
    ));

    health_state.set_ready(true).await;

    tokio::select! {
        result = &mut cluster_handle => {
            if let Err(e) = result {
                error!("Cluster controller task panicked: {}", e);
            }
        }
        result = &mut backup_handle => {
            if let Err(e) = result {
                error!("Backup controller task panicked: {}", e);
            }
        }
        result = &mut health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        Err(e) = lease_renewal_handle => {
            error!("Lease renewal task panicked: {}", e);
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new work
            health_state.set_ready(false).await;

            let _ = cluster_stop_tx.send(());
            let _ = backup_stop_tx.send(());

            info!(
                "Waiting {}s for in-flight reconciliations to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            let drained = tokio::time::timeout(
                Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS),
                async {
                    let _ = (&mut cluster_handle).await;
                    let _ = (&mut backup_handle).await;
                },
            )
            .await;
            if drained.is_err() {
                warn!("Grace period elapsed with reconciliations still running");
            }
        }
    }

    info!("Operator stopped");
    Ok(())
}
