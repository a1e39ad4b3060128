//! Dedicated ServiceAccount for ZooKeeper pods
//!
//! Only rendered when the cluster names a service account other than
//! `default`; the default account always exists in every namespace.

use k8s_openapi::api::core::v1::{LocalObjectReference, ServiceAccount};
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{DEFAULT_SERVICE_ACCOUNT, ZookeeperCluster};
use crate::resources::common::{cluster_labels, owner_reference};

/// Whether the cluster needs an operator-managed ServiceAccount
pub fn needs_service_account(cluster: &ZookeeperCluster) -> bool {
    let name = &cluster.spec.pod.service_account_name;
    !name.is_empty() && name != DEFAULT_SERVICE_ACCOUNT
}

/// Generate the ServiceAccount, or `None` for the namespace default
pub fn generate_service_account(cluster: &ZookeeperCluster) -> Option<ServiceAccount> {
    if !needs_service_account(cluster) {
        return None;
    }
    let pod = &cluster.spec.pod;

    let pull_secrets: Vec<LocalObjectReference> = pod
        .image_pull_secrets
        .iter()
        .map(|s| LocalObjectReference { name: s.clone() })
        .collect();

    Some(ServiceAccount {
        metadata: ObjectMeta {
            name: Some(pod.service_account_name.clone()),
            namespace: cluster.namespace(),
            labels: Some(cluster_labels(cluster)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        image_pull_secrets: (!pull_secrets.is_empty()).then_some(pull_secrets),
        ..Default::default()
    })
}
