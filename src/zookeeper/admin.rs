//! Leader discovery through the ZooKeeper AdminServer
//!
//! `GET /commands/leader` on the admin-server Service returns the address
//! of the current quorum leader, e.g.
//! `{"leader_ip": "zk-1.zk-headless.default.svc.cluster.local", ...}`.
//! The first DNS label of that address is the leader pod's hostname.

use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::crd::{ZookeeperCluster, port_names};
use crate::resources::common::admin_service_name;

/// Timeout for a single AdminServer request
pub const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Leader lookup failures. All of them are hard errors for the pass.
#[derive(Error, Debug)]
pub enum LeaderLookupError {
    #[error("admin server request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("admin server returned HTTP {0}")]
    Status(u16),

    #[error("admin server response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("admin server response has an empty leader_ip")]
    EmptyLeader,
}

/// Typed body of the `leader` admin command
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct LeaderResponse {
    pub leader_ip: String,
}

impl LeaderResponse {
    /// Decode and validate a raw response body
    pub fn parse(body: &str) -> Result<Self, LeaderLookupError> {
        let response: LeaderResponse = serde_json::from_str(body)?;
        if response.leader_ip.trim().is_empty() {
            return Err(LeaderLookupError::EmptyLeader);
        }
        Ok(response)
    }

    /// Hostname of the leader: everything before the first `.`
    pub fn short_hostname(&self) -> &str {
        short_hostname(&self.leader_ip)
    }
}

/// Text before the first `.` (the whole string when there is none)
pub fn short_hostname(address: &str) -> &str {
    address.split('.').next().unwrap_or(address)
}

/// URL of the leader command on the cluster's admin-server Service
pub fn leader_url(cluster: &ZookeeperCluster) -> String {
    format!(
        "http://{}.{}.svc.{}:{}/commands/leader",
        admin_service_name(&cluster.name_any()),
        cluster.namespace().unwrap_or_default(),
        cluster.spec.cluster_domain(),
        cluster.spec.port(port_names::ADMIN_SERVER)
    )
}

/// Build the HTTP client used for admin requests
pub fn admin_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(ADMIN_REQUEST_TIMEOUT)
        .build()
}

/// Ask the ensemble which member currently leads the quorum
pub async fn lookup_leader(
    http: &reqwest::Client,
    cluster: &ZookeeperCluster,
) -> Result<LeaderResponse, LeaderLookupError> {
    let url = leader_url(cluster);
    debug!(url = %url, "Querying admin server for quorum leader");

    let response = http.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(LeaderLookupError::Status(status.as_u16()));
    }

    let body = response.text().await?;
    LeaderResponse::parse(&body)
}

/// Find the member pod whose `spec.hostname` matches the leader hostname
pub fn find_leader_pod<'a>(pods: &'a [Pod], hostname: &str) -> Option<&'a Pod> {
    pods.iter().find(|pod| {
        pod.spec
            .as_ref()
            .and_then(|s| s.hostname.as_deref())
            .is_some_and(|h| h == hostname)
    })
}
