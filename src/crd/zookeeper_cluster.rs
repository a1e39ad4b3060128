use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default ZooKeeper image repository
pub const DEFAULT_IMAGE_REPOSITORY: &str = "pravega/zookeeper";

/// Default ZooKeeper image tag
pub const DEFAULT_IMAGE_TAG: &str = "0.2.15";

/// Default image pull policy
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";

/// Default ensemble size
pub const DEFAULT_REPLICAS: i32 = 3;

/// Default per-replica data volume size
pub const DEFAULT_STORAGE_SIZE: &str = "20Gi";

/// Default Kubernetes cluster DNS domain
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Default pod termination grace period in seconds
pub const DEFAULT_TERMINATION_GRACE_PERIOD: i64 = 30;

/// Default service account name. A non-default name makes the operator
/// manage a dedicated ServiceAccount.
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Well-known port names
pub mod port_names {
    pub const CLIENT: &str = "client";
    pub const QUORUM: &str = "quorum";
    pub const LEADER_ELECTION: &str = "leader-election";
    pub const METRICS: &str = "metrics";
    pub const ADMIN_SERVER: &str = "admin-server";
}

/// Default port numbers
pub const DEFAULT_CLIENT_PORT: i32 = 2181;
pub const DEFAULT_QUORUM_PORT: i32 = 2888;
pub const DEFAULT_LEADER_ELECTION_PORT: i32 = 3888;
pub const DEFAULT_METRICS_PORT: i32 = 7000;
pub const DEFAULT_ADMIN_SERVER_PORT: i32 = 8080;

/// ZookeeperCluster is the Schema for the zookeeperclusters API
///
/// Fields are plain (zero-valued when omitted) and are filled in by
/// [`ZookeeperClusterSpec::with_defaults`], which the reconciler persists
/// before rendering any child resources.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[kube(
    group = "zookeeper.pravega.io",
    version = "v1beta1",
    kind = "ZookeeperCluster",
    plural = "zookeeperclusters",
    shortname = "zk",
    namespaced,
    status = "ZookeeperClusterStatus",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.currentVersion"}"#,
    printcolumn = r#"{"name":"Desired Version", "type":"string", "jsonPath":".spec.image.tag"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperClusterSpec {
    /// ZooKeeper container image
    #[serde(default)]
    pub image: ContainerImage,

    /// Number of ensemble members (1-7)
    #[serde(default)]
    pub replicas: i32,

    /// Named container ports: client, quorum, leader-election, metrics, admin-server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<NamedPort>,

    /// Pod-level scheduling and runtime policy
    #[serde(default)]
    pub pod: PodPolicy,

    /// Persistent storage policy for the data volumes
    #[serde(default)]
    pub persistence: Persistence,

    /// ZooKeeper server tuning (rendered into zoo.cfg)
    #[serde(default)]
    pub config: ZookeeperConfig,

    /// Setting this to true restarts every member once; the operator clears it
    #[serde(default)]
    pub trigger_rolling_restart: bool,

    /// Kubernetes cluster DNS domain used for service URIs
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubernetes_cluster_domain: String,

    /// Extra labels applied to every child resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Container image reference
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerImage {
    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub tag: String,

    #[serde(default)]
    pub pull_policy: String,
}

impl ContainerImage {
    /// Full image reference (`repository:tag`)
    pub fn to_image_name(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// A named container port
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamedPort {
    pub name: String,
    pub container_port: i32,
}

/// Anti-affinity mode for spreading members across nodes
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum AntiAffinity {
    /// Prefer, but do not require, one member per node
    #[default]
    Preferred,
    /// Never schedule two members on the same node
    Required,
}

/// Pod-level policy applied to every ZooKeeper member
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodPolicy {
    /// Extra pod labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Extra pod annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Node selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// How strictly members are spread across nodes
    #[serde(default)]
    pub anti_affinity: AntiAffinity,

    /// Compute resources for the ZooKeeper container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Tolerations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Extra environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Service account the pods run as
    #[serde(default)]
    pub service_account_name: String,

    /// Pod security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,

    /// Termination grace period in seconds
    #[serde(default)]
    pub termination_grace_period_seconds: i64,

    /// Names of image pull secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<String>,
}

/// Resource requirements for ZooKeeper pods
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// CPU and memory limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceList>,

    /// CPU and memory requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceList>,
}

/// Resource quantities for CPU and memory
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct ResourceList {
    /// CPU quantity (e.g., "500m", "2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory quantity (e.g., "512Mi", "2Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Pod toleration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

/// Environment variable with a literal value
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Subset of the pod security context exposed to users
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_group: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
}

/// What happens to data volumes once they are no longer used
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum VolumeReclaimPolicy {
    /// Keep orphaned claims (manual cleanup)
    #[default]
    Retain,
    /// Delete orphaned claims on scale-down and all claims on cluster deletion
    Delete,
}

/// Persistent storage for ZooKeeper data
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Persistence {
    #[serde(default)]
    pub reclaim_policy: VolumeReclaimPolicy,

    /// Storage class name (uses default if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Requested size of each data volume (e.g., "20Gi")
    #[serde(default)]
    pub size: String,
}

/// ZooKeeper server tuning parameters
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperConfig {
    #[serde(default)]
    pub init_limit: i32,
    #[serde(default)]
    pub tick_time: i32,
    #[serde(default)]
    pub sync_limit: i32,
    #[serde(default)]
    pub global_outstanding_limit: i32,
    #[serde(default)]
    pub pre_alloc_size: i32,
    #[serde(default)]
    pub snap_count: i32,
    #[serde(default)]
    pub commit_log_count: i32,
    #[serde(default)]
    pub snap_size_limit_in_kb: i32,
    #[serde(default)]
    pub max_cnxns: i32,
    #[serde(default)]
    pub max_client_cnxns: i32,
    #[serde(default)]
    pub min_session_timeout: i32,
    #[serde(default)]
    pub max_session_timeout: i32,
    #[serde(default)]
    pub auto_purge_snap_retain_count: i32,
    #[serde(default)]
    pub auto_purge_purge_interval: i32,
    #[serde(default)]
    pub quorum_listen_on_all_ips: bool,
    /// Extra `key=value` lines appended to zoo.cfg
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_config: BTreeMap<String, String>,
}

fn is_unset<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// Fill a zero-valued field with its default, recording whether anything changed
macro_rules! default_if_zero {
    ($changed:ident, $field:expr, $default:expr) => {
        if is_unset(&$field) {
            $field = $default;
            $changed = true;
        }
    };
}

impl ZookeeperConfig {
    /// Fill unset tuning parameters. Returns true if any field changed.
    pub fn with_defaults(&mut self) -> bool {
        let mut changed = false;
        default_if_zero!(changed, self.init_limit, 10);
        default_if_zero!(changed, self.tick_time, 2000);
        default_if_zero!(changed, self.sync_limit, 2);
        default_if_zero!(changed, self.global_outstanding_limit, 1000);
        default_if_zero!(changed, self.pre_alloc_size, 65536);
        default_if_zero!(changed, self.snap_count, 10000);
        default_if_zero!(changed, self.commit_log_count, 500);
        default_if_zero!(changed, self.snap_size_limit_in_kb, 4_194_304);
        default_if_zero!(changed, self.max_client_cnxns, 60);
        default_if_zero!(changed, self.min_session_timeout, 2 * self.tick_time);
        default_if_zero!(changed, self.max_session_timeout, 20 * self.tick_time);
        default_if_zero!(changed, self.auto_purge_snap_retain_count, 3);
        default_if_zero!(changed, self.auto_purge_purge_interval, 1);
        changed
    }
}

impl ZookeeperClusterSpec {
    /// Fill every unset field with its fixed default.
    ///
    /// Returns true if anything changed. Applying it to an already-defaulted
    /// spec is a no-op.
    pub fn with_defaults(&mut self) -> bool {
        let mut changed = false;

        default_if_zero!(changed, self.image.repository, DEFAULT_IMAGE_REPOSITORY.to_string());
        default_if_zero!(changed, self.image.tag, DEFAULT_IMAGE_TAG.to_string());
        default_if_zero!(changed, self.image.pull_policy, DEFAULT_PULL_POLICY.to_string());
        default_if_zero!(changed, self.replicas, DEFAULT_REPLICAS);
        default_if_zero!(
            changed,
            self.kubernetes_cluster_domain,
            DEFAULT_CLUSTER_DOMAIN.to_string()
        );

        for (name, port) in [
            (port_names::CLIENT, DEFAULT_CLIENT_PORT),
            (port_names::QUORUM, DEFAULT_QUORUM_PORT),
            (port_names::LEADER_ELECTION, DEFAULT_LEADER_ELECTION_PORT),
            (port_names::METRICS, DEFAULT_METRICS_PORT),
            (port_names::ADMIN_SERVER, DEFAULT_ADMIN_SERVER_PORT),
        ] {
            if !self.ports.iter().any(|p| p.name == name) {
                self.ports.push(NamedPort {
                    name: name.to_string(),
                    container_port: port,
                });
                changed = true;
            }
        }

        default_if_zero!(
            changed,
            self.pod.service_account_name,
            DEFAULT_SERVICE_ACCOUNT.to_string()
        );
        default_if_zero!(
            changed,
            self.pod.termination_grace_period_seconds,
            DEFAULT_TERMINATION_GRACE_PERIOD
        );

        default_if_zero!(changed, self.persistence.size, DEFAULT_STORAGE_SIZE.to_string());

        if self.config.with_defaults() {
            changed = true;
        }

        changed
    }

    /// Look up a named port, falling back to the well-known default
    pub fn port(&self, name: &str) -> i32 {
        self.ports
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.container_port)
            .unwrap_or(match name {
                port_names::CLIENT => DEFAULT_CLIENT_PORT,
                port_names::QUORUM => DEFAULT_QUORUM_PORT,
                port_names::LEADER_ELECTION => DEFAULT_LEADER_ELECTION_PORT,
                port_names::METRICS => DEFAULT_METRICS_PORT,
                _ => DEFAULT_ADMIN_SERVER_PORT,
            })
    }

    /// Cluster DNS domain, defaulted when unset
    pub fn cluster_domain(&self) -> &str {
        if self.kubernetes_cluster_domain.is_empty() {
            DEFAULT_CLUSTER_DOMAIN
        } else {
            &self.kubernetes_cluster_domain
        }
    }
}

/// Status of the ZookeeperCluster
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperClusterStatus {
    /// Number of pods in the StatefulSet
    #[serde(default)]
    pub replicas: i32,

    /// Number of ready pods in the StatefulSet
    #[serde(default)]
    pub ready_replicas: i32,

    /// Ready and unready member pod names
    #[serde(default)]
    pub members: MembersStatus,

    /// Version the whole ensemble is known to run
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_version: String,

    /// Version an in-progress upgrade is moving to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_version: String,

    /// Client endpoint reachable inside the Kubernetes cluster
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub internal_client_endpoint: String,

    /// Whether the metadata znode for this cluster has been created
    #[serde(default)]
    pub meta_root_created: bool,

    /// Kubernetes-style conditions (one per type once initialized)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClusterCondition>,
}

/// Ready and unready ensemble members
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct MembersStatus {
    #[serde(default)]
    pub ready: Vec<String>,
    #[serde(default)]
    pub unready: Vec<String>,
}

/// Condition types tracked on the cluster
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    PodsReady,
    Upgrading,
    Error,
}

impl ConditionType {
    /// All condition types, in the order they appear in status
    pub const ALL: [ConditionType; 3] = [
        ConditionType::PodsReady,
        ConditionType::Upgrading,
        ConditionType::Error,
    ];
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionType::PodsReady => write!(f, "PodsReady"),
            ConditionType::Upgrading => write!(f, "Upgrading"),
            ConditionType::Error => write!(f, "Error"),
        }
    }
}

/// Condition status values
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Status of the condition: True, False, or Unknown
    pub status: ConditionStatus,

    /// Machine-readable reason for the last change
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time status, reason or message changed (RFC 3339)
    #[serde(default)]
    pub last_update_time: String,

    /// Last time status changed (RFC 3339)
    #[serde(default)]
    pub last_transition_time: String,
}
