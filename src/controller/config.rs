//! Operator configuration
//!
//! Read once at startup from the environment and shared with every
//! reconciler through [`Context`](crate::controller::Context).

use std::time::Duration;

use tracing::warn;

/// Default time an upgrade may go without progress before it is failed
pub const DEFAULT_PROGRESS_DEADLINE: Duration = Duration::from_secs(600);

/// Default requeue interval after a successful reconcile
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Runtime settings of the operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Skip the PVC cleanup finalizer on clusters
    pub disable_finalizer: bool,
    /// Upgrade progress deadline
    pub progress_deadline: Duration,
    /// Requeue interval of both reconcilers
    pub reconcile_interval: Duration,
    /// Watch a single namespace instead of the whole cluster
    pub watch_namespace: Option<String>,
    /// Identity of this operator pod (leader election holder)
    pub pod_name: String,
    /// Namespace the operator runs in (leader election lease)
    pub pod_namespace: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            disable_finalizer: false,
            progress_deadline: DEFAULT_PROGRESS_DEADLINE,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            watch_namespace: None,
            pod_name: "unknown".to_string(),
            pod_namespace: "default".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Build the configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let pod_name = lookup("POD_NAME").unwrap_or_else(|| {
            warn!("POD_NAME not set, using hostname");
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or(defaults.pod_name)
        });
        let pod_namespace = lookup("POD_NAMESPACE").unwrap_or_else(|| {
            warn!("POD_NAMESPACE not set, using 'default'");
            defaults.pod_namespace
        });

        Self {
            disable_finalizer: lookup("DISABLE_FINALIZER")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.disable_finalizer),
            progress_deadline: seconds(&lookup, "PROGRESS_DEADLINE_SECS")
                .unwrap_or(defaults.progress_deadline),
            reconcile_interval: seconds(&lookup, "RECONCILE_INTERVAL_SECS")
                .unwrap_or(defaults.reconcile_interval),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            pod_name,
            pod_namespace,
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn seconds<F>(lookup: &F, key: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            warn!(key, value = %raw, "Ignoring invalid duration, using default");
            None
        }
    }
}
