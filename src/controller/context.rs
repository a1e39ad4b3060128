use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kube::Client;

use crate::controller::config::OperatorConfig;
use crate::controller::error::{BackoffConfig, Error, ErrorContext};
use crate::health::HealthState;
use crate::zookeeper::admin::admin_http_client;
use crate::zookeeper::{MetadataClient, ZkMetadataClient};

/// Shared context for the controllers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Operator settings
    pub config: OperatorConfig,
    /// Health state for metrics (optional)
    pub health_state: Option<Arc<HealthState>>,
    /// Opens znode sessions against managed ensembles
    pub metadata: Arc<dyn MetadataClient>,
    /// HTTP client for the ZooKeeper admin server
    pub http: reqwest::Client,
    /// Backoff applied by the error policies
    pub backoff: BackoffConfig,
    /// Consecutive failures per object key (`<kind>/<namespace>/<name>`)
    failures: Arc<Mutex<HashMap<String, ErrorContext>>>,
}

impl Context {
    /// Build the production context
    pub fn new(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client,
            config,
            health_state,
            metadata: Arc::new(ZkMetadataClient),
            http: admin_http_client()?,
            backoff: BackoffConfig::default(),
            failures: Arc::default(),
        })
    }

    /// Record a failed pass for `key`, returning how many passes in a row
    /// have failed before this one
    pub fn record_failure(&self, key: &str, error: &Error) -> u32 {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let entry = failures.entry(key.to_string()).or_default();
        let previous = entry.consecutive_errors;
        entry.record_error(error);
        previous
    }

    /// Forget failures of `key` after a successful pass
    pub fn clear_failures(&self, key: &str) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.remove(key);
    }
}
