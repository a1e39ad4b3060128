//! Error types for the ZooKeeper controllers

use std::time::Duration;

use thiserror::Error;

use crate::zookeeper::{LeaderLookupError, MetadataError};

/// Error variants are named with the `Error` suffix for clarity (e.g., `KubeError`, `ValidationError`).
/// This is idiomatic for error enums and improves readability at call sites.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Leader lookup failed: {0}")]
    LeaderLookupError(#[from] LeaderLookupError),

    #[error("Metadata error: {0}")]
    MetadataError(#[from] MetadataError),

    #[error("Upgrade to {target_version} made no progress for {deadline:?} ({updated} replicas updated)")]
    ProgressDeadlineExceeded {
        target_version: String,
        updated: i32,
        deadline: Duration,
    },

    #[error("ZookeeperCluster {0} not found")]
    ClusterNotFound(String),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            // The ensemble may simply not be reachable yet
            Error::LeaderLookupError(_) => true,
            Error::MetadataError(_) => true,
            Error::ClusterNotFound(_) => true,
            // A stalled upgrade needs an administrator
            Error::ProgressDeadlineExceeded { .. } => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
            Error::ValidationError(_) => false,
        }
    }

    /// Check if this is a 404 from the API server
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(e)) if e.code == 404)
    }

    /// Short machine-readable label, used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::SerializationError(_) => "serialization",
            Error::LeaderLookupError(_) => "leader_lookup",
            Error::MetadataError(_) => "metadata",
            Error::ProgressDeadlineExceeded { .. } => "progress_deadline",
            Error::ClusterNotFound(_) => "cluster_not_found",
            Error::MissingObjectKey(_) => "missing_key",
            Error::ValidationError(_) => "validation",
        }
    }
}

/// Returns true for a 404 from the API server
pub fn is_kube_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(e) if e.code == 404)
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Past this exponent every delay is capped anyway; larger ones
        // overflow to infinity and turn the jitter into NaN.
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT) as i32;
        let base_delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Non-retryable errors wait for manual intervention or eventual resolution
            self.max_delay
        }
    }
}

/// Tracks consecutive failures per object between reconcile passes
#[derive(Clone, Debug, Default)]
pub struct ErrorContext {
    /// Number of consecutive errors
    pub consecutive_errors: u32,
    /// Last error message
    pub last_error: Option<String>,
}

impl ErrorContext {
    /// Record an error
    pub fn record_error(&mut self, error: &Error) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.last_error = Some(error.to_string());
    }

    /// Reset error tracking (called on successful reconciliation)
    pub fn reset(&mut self) {
        self.consecutive_errors = 0;
        self.last_error = None;
    }
}
