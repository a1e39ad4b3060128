//! PodDisruptionBudget resource generation for ZooKeeper clusters
//!
//! At most one member may be voluntarily disrupted at a time, which keeps a
//! quorum for every ensemble of three or more members.

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::ZookeeperCluster;
use crate::resources::common::{cluster_labels, owner_reference, selector_labels};

/// Generate the PodDisruptionBudget (named after the cluster)
pub fn generate_pdb(cluster: &ZookeeperCluster) -> PodDisruptionBudget {
    let name = cluster.name_any();

    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: cluster.namespace(),
            labels: Some(cluster_labels(cluster)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            max_unavailable: Some(IntOrString::Int(1)),
            selector: Some(LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
