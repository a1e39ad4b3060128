//! Service generation for ZooKeeper clusters
//!
//! Three Services front every ensemble:
//! - `<cluster>-client`: ClusterIP service on the client port
//! - `<cluster>-headless`: stable per-member DNS for quorum traffic
//! - `<cluster>-admin-server`: the AdminServer HTTP endpoint used for leader
//!   discovery

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{ZookeeperCluster, port_names};
use crate::resources::common::{
    admin_service_name, client_service_name, cluster_labels, headless_service_name,
    owner_reference, selector_labels,
};

fn service_port(cluster: &ZookeeperCluster, name: &str) -> ServicePort {
    let port = cluster.spec.port(name);
    ServicePort {
        name: Some(format!("tcp-{}", name)),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn service(cluster: &ZookeeperCluster, name: String, spec: ServiceSpec) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: cluster.namespace(),
            labels: Some(cluster_labels(cluster)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(&cluster.name_any())),
            ..spec
        }),
        ..Default::default()
    }
}

/// Generate the client Service (`<cluster>-client`)
pub fn generate_client_service(cluster: &ZookeeperCluster) -> Service {
    service(
        cluster,
        client_service_name(&cluster.name_any()),
        ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![service_port(cluster, port_names::CLIENT)]),
            ..Default::default()
        },
    )
}

/// Generate the headless Service (`<cluster>-headless`)
///
/// Unready members are published so that peers can resolve each other
/// while the quorum is still forming.
pub fn generate_headless_service(cluster: &ZookeeperCluster) -> Service {
    let ports = [
        port_names::CLIENT,
        port_names::QUORUM,
        port_names::LEADER_ELECTION,
        port_names::METRICS,
        port_names::ADMIN_SERVER,
    ]
    .into_iter()
    .map(|name| service_port(cluster, name))
    .collect();

    service(
        cluster,
        headless_service_name(&cluster.name_any()),
        ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            ports: Some(ports),
            ..Default::default()
        },
    )
}

/// Generate the admin server Service (`<cluster>-admin-server`)
pub fn generate_admin_service(cluster: &ZookeeperCluster) -> Service {
    service(
        cluster,
        admin_service_name(&cluster.name_any()),
        ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![service_port(cluster, port_names::ADMIN_SERVER)]),
            ..Default::default()
        },
    )
}
