//! Common utilities for Kubernetes resource generation
//!
//! This module provides shared functions and constants used across
//! all resource generators to ensure consistency and reduce duplication.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::ZookeeperCluster;

/// Operator field manager / managed-by label value
pub const FIELD_MANAGER: &str = "zookeeper-operator";

/// Label identifying the cluster a resource belongs to
pub const CLUSTER_LABEL: &str = "zookeeper.pravega.io/cluster";

/// Label identifying the backup a resource belongs to
pub const BACKUP_LABEL: &str = "zookeeper.pravega.io/backup";

/// Annotation holding the hash of the last applied desired spec
pub const LAST_APPLIED_HASH_ANNOTATION: &str = "zookeeper.pravega.io/last-applied-hash";

/// Pod annotation stamped to force a rolling restart
pub const RESTART_TIME_ANNOTATION: &str = "restartTime";

/// Name of the per-replica data volume (and claim template)
pub const DATA_VOLUME_NAME: &str = "data";

/// Generate an owner reference to the parent custom resource
///
/// Every child gets exactly one owner reference, always built here, so a
/// child is never owned by more than one parent.
pub fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Generate standard labels for all resources belonging to a ZookeeperCluster
pub fn standard_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "zookeeper".to_string()),
        (
            "app.kubernetes.io/instance".to_string(),
            cluster_name.to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (CLUSTER_LABEL.to_string(), cluster_name.to_string()),
    ])
}

/// Labels for a ZookeeperCluster including user-defined labels.
///
/// User labels can override standard labels except for the cluster identifier.
pub fn cluster_labels(cluster: &ZookeeperCluster) -> BTreeMap<String, String> {
    let name = cluster.name_any();
    let mut labels = standard_labels(&name);

    for (key, value) in &cluster.spec.labels {
        if key != CLUSTER_LABEL {
            labels.insert(key.clone(), value.clone());
        }
    }

    labels
}

/// Selector labels matching every member pod and data claim of a cluster
pub fn selector_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(CLUSTER_LABEL.to_string(), cluster_name.to_string())])
}

/// Label selector string for list calls
pub fn cluster_selector(cluster_name: &str) -> String {
    format!("{}={}", CLUSTER_LABEL, cluster_name)
}

/// Name of the ConfigMap holding zoo.cfg and env.sh
pub fn config_map_name(cluster_name: &str) -> String {
    format!("{}-configmap", cluster_name)
}

/// Name of the client Service
pub fn client_service_name(cluster_name: &str) -> String {
    format!("{}-client", cluster_name)
}

/// Name of the headless Service used for member DNS
pub fn headless_service_name(cluster_name: &str) -> String {
    format!("{}-headless", cluster_name)
}

/// Name of the admin server Service
pub fn admin_service_name(cluster_name: &str) -> String {
    format!("{}-admin-server", cluster_name)
}

/// Name of the data claim of a member pod (`data-<pod>`)
pub fn data_claim_name(pod_name: &str) -> String {
    format!("{}-{}", DATA_VOLUME_NAME, pod_name)
}

/// Name of the data claim for a given ordinal (`data-<cluster>-<ordinal>`)
pub fn data_claim_name_for_ordinal(cluster_name: &str, ordinal: i32) -> String {
    data_claim_name(&format!("{}-{}", cluster_name, ordinal))
}

/// In-cluster client URI (`host:port`) of the ensemble
pub fn client_service_uri(cluster: &ZookeeperCluster) -> String {
    format!(
        "{}.{}.svc.{}:{}",
        client_service_name(&cluster.name_any()),
        cluster.namespace().unwrap_or_default(),
        cluster.spec.cluster_domain(),
        cluster.spec.port(crate::crd::port_names::CLIENT)
    )
}

/// Metadata znode path recorded for a cluster
pub fn meta_path(cluster_name: &str) -> String {
    format!("/zookeeper-operator/{}", cluster_name)
}
