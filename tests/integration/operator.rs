//! Operator spawning utilities for integration tests
//!
//! Each test gets its own operator instance to avoid watch/state issues
//! between tests. The operator runs in the test's tokio runtime.

use futures::FutureExt;
use futures::channel::oneshot;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use zookeeper_operator::{Context, OperatorConfig, run_backup_controller, run_cluster_controller};

/// A scoped operator that runs for the duration of a test
pub struct ScopedOperator {
    handle: JoinHandle<()>,
    shutdown_tx: Option<(oneshot::Sender<()>, oneshot::Sender<()>)>,
}

impl ScopedOperator {
    /// Start a new operator instance
    ///
    /// Runs both the ZookeeperCluster and ZookeeperBackup controllers.
    /// They are stopped when the operator is dropped.
    pub async fn start(client: Client) -> Self {
        let (cluster_tx, cluster_rx) = oneshot::channel::<()>();
        let (backup_tx, backup_rx) = oneshot::channel::<()>();

        tracing::info!("Starting scoped operator controllers...");

        let ctx = Arc::new(
            Context::new(client, OperatorConfig::default(), None)
                .expect("Failed to build operator context"),
        );

        let handle = tokio::spawn(async move {
            tokio::join!(
                run_cluster_controller(ctx.clone(), cluster_rx.map(|_| ())),
                run_backup_controller(ctx, backup_rx.map(|_| ())),
            );
            tracing::debug!("Operator controllers exited");
        });

        // Give the controllers a moment to start watching
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        Self {
            handle,
            shutdown_tx: Some((cluster_tx, backup_tx)),
        }
    }
}

impl Drop for ScopedOperator {
    fn drop(&mut self) {
        // Send shutdown signals (ignore errors if receivers already dropped)
        if let Some((cluster_tx, backup_tx)) = self.shutdown_tx.take() {
            let _ = cluster_tx.send(());
            let _ = backup_tx.send(());
        }
        // Abort the task to ensure it stops
        self.handle.abort();
    }
}

/// Starts a scoped operator that will be properly cleaned up
pub async fn ensure_operator_running(client: Client) -> ScopedOperator {
    ScopedOperator::start(client).await
}
