//! Unit tests for resource generators
//!
//! Tests for the ensemble StatefulSet, its Services, ConfigMap, PDB and
//! optional ServiceAccount.

use crate::common::*;
use kube::ResourceExt;
use zookeeper_operator::crd::port_names;
use zookeeper_operator::resources::common::{
    CLUSTER_LABEL, client_service_uri, cluster_selector, data_claim_name_for_ordinal, meta_path,
};
use zookeeper_operator::resources::{
    config_map, pdb, service, service_account, statefulset,
};

mod statefulset_tests {
    use super::*;

    #[test]
    fn test_statefulset_named_after_cluster() {
        let cluster = create_test_cluster("my-zk", "default", 3);
        let sts = statefulset::generate_statefulset(&cluster);

        assert_eq!(sts.name_any(), "my-zk");
        assert_eq!(sts.namespace(), Some("default".to_string()));
    }

    #[test]
    fn test_statefulset_replicas_follow_spec() {
        for replicas in [1, 3, 5] {
            let cluster = create_test_cluster("zk", "default", replicas);
            let sts = statefulset::generate_statefulset(&cluster);
            assert_eq!(sts.spec.unwrap().replicas, Some(replicas));
        }
    }

    #[test]
    fn test_statefulset_owned_by_cluster() {
        let cluster = create_test_cluster("zk", "default", 3);
        let sts = statefulset::generate_statefulset(&cluster);

        let owners = sts.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "ZookeeperCluster");
        assert_eq!(owners[0].name, "zk");
        assert_eq!(owners[0].uid, "test-uid-12345");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_statefulset_uses_requested_image() {
        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_version("3.8.4")
            .build();
        let sts = statefulset::generate_statefulset(&cluster);
        let container = &sts.spec.unwrap().template.spec.unwrap().containers[0];

        assert_eq!(container.name, statefulset::CONTAINER_NAME);
        assert_eq!(container.image, Some("pravega/zookeeper:3.8.4".to_string()));
    }

    #[test]
    fn test_statefulset_ordered_rolling_update() {
        let cluster = create_test_cluster("zk", "default", 3);
        let spec = statefulset::generate_statefulset(&cluster).spec.unwrap();

        assert_eq!(spec.pod_management_policy, Some("OrderedReady".to_string()));
        assert_eq!(
            spec.update_strategy.unwrap().type_,
            Some("RollingUpdate".to_string())
        );
    }

    #[test]
    fn test_restart_annotation_reaches_pod_template() {
        let mut cluster = create_test_cluster("zk", "default", 3);
        cluster.spec.pod.annotations.insert(
            "restartTime".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        );
        let template = statefulset::generate_statefulset(&cluster)
            .spec
            .unwrap()
            .template;

        let annotations = template.metadata.unwrap().annotations.unwrap();
        assert_eq!(
            annotations.get("restartTime"),
            Some(&"2024-01-01T00:00:00Z".to_string())
        );
    }

    #[test]
    fn test_cluster_labels_propagate() {
        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_label("team", "platform")
            .build();
        let sts = statefulset::generate_statefulset(&cluster);

        let labels = sts.metadata.labels.unwrap();
        assert_eq!(labels.get("team"), Some(&"platform".to_string()));
        assert_eq!(labels.get(CLUSTER_LABEL), Some(&"zk".to_string()));
    }

    #[test]
    fn test_custom_client_port() {
        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_port(port_names::CLIENT, 12181)
            .build();
        let sts = statefulset::generate_statefulset(&cluster);
        let container = &sts.spec.unwrap().template.spec.unwrap().containers[0];

        let client = container
            .ports
            .as_ref()
            .unwrap()
            .iter()
            .find(|p| p.name.as_deref() == Some(port_names::CLIENT))
            .unwrap();
        assert_eq!(client.container_port, 12181);
    }
}

mod service_tests {
    use super::*;

    #[test]
    fn test_service_names() {
        let cluster = create_test_cluster("zk", "default", 3);

        assert_eq!(service::generate_client_service(&cluster).name_any(), "zk-client");
        assert_eq!(
            service::generate_headless_service(&cluster).name_any(),
            "zk-headless"
        );
        assert_eq!(
            service::generate_admin_service(&cluster).name_any(),
            "zk-admin-server"
        );
    }

    #[test]
    fn test_client_service_exposes_client_port() {
        let cluster = create_test_cluster("zk", "default", 3);
        let spec = service::generate_client_service(&cluster).spec.unwrap();

        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 2181);
    }

    #[test]
    fn test_headless_service_publishes_unready_members() {
        let cluster = create_test_cluster("zk", "default", 3);
        let spec = service::generate_headless_service(&cluster).spec.unwrap();

        assert_eq!(spec.cluster_ip, Some("None".to_string()));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
    }

    #[test]
    fn test_services_select_cluster_members() {
        let cluster = create_test_cluster("zk", "default", 3);
        for svc in [
            service::generate_client_service(&cluster),
            service::generate_headless_service(&cluster),
            service::generate_admin_service(&cluster),
        ] {
            let selector = svc.spec.unwrap().selector.unwrap();
            assert_eq!(selector.get(CLUSTER_LABEL), Some(&"zk".to_string()));
        }
    }
}

mod config_map_tests {
    use super::*;

    #[test]
    fn test_zoo_cfg_defaults() {
        let cluster = create_test_cluster("zk", "default", 3);
        let cm = config_map::generate_config_map(&cluster);
        let cfg = cm.data.unwrap().remove("zoo.cfg").unwrap();

        assert!(cfg.contains("tickTime=2000\n"));
        assert!(cfg.contains("syncLimit=2\n"));
        assert!(cfg.contains("minSessionTimeout=4000\n"));
        assert!(cfg.contains("maxSessionTimeout=40000\n"));
        assert!(cfg.contains("reconfigEnabled=true\n"));
    }

    #[test]
    fn test_env_sh_tracks_cluster_size() {
        let cluster = create_test_cluster("zk", "prod", 5);
        let env = config_map::generate_env_sh(&cluster);

        assert!(env.contains("CLUSTER_SIZE=5\n"));
        assert!(env.contains("DOMAIN=zk-headless.prod.svc.cluster.local\n"));
    }

    #[test]
    fn test_env_sh_custom_domain() {
        let cluster = ZookeeperClusterBuilder::new("zk", "prod")
            .with_cluster_domain("example.internal")
            .build();
        let env = config_map::generate_env_sh(&cluster);
        assert!(env.contains("DOMAIN=zk-headless.prod.svc.example.internal\n"));
    }
}

mod pdb_tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    #[test]
    fn test_pdb_max_unavailable_one() {
        let cluster = create_test_cluster("zk", "default", 5);
        let spec = pdb::generate_pdb(&cluster).spec.unwrap();
        assert_eq!(spec.max_unavailable, Some(IntOrString::Int(1)));
    }
}

mod service_account_tests {
    use super::*;

    #[test]
    fn test_default_account_is_not_managed() {
        let cluster = create_test_cluster("zk", "default", 3);
        assert!(!service_account::needs_service_account(&cluster));
        assert!(service_account::generate_service_account(&cluster).is_none());
    }

    #[test]
    fn test_named_account_is_generated() {
        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_service_account("zookeeper")
            .build();
        let sa = service_account::generate_service_account(&cluster).unwrap();

        assert_eq!(sa.name_any(), "zookeeper");
        assert_eq!(sa.namespace(), Some("default".to_string()));
    }
}

mod naming_tests {
    use super::*;

    #[test]
    fn test_client_service_uri() {
        let cluster = create_test_cluster("zk", "prod", 3);
        assert_eq!(
            client_service_uri(&cluster),
            "zk-client.prod.svc.cluster.local:2181"
        );
    }

    #[test]
    fn test_data_claim_names() {
        assert_eq!(data_claim_name_for_ordinal("zk", 0), "data-zk-0");
        assert_eq!(data_claim_name_for_ordinal("my-zk", 4), "data-my-zk-4");
    }

    #[test]
    fn test_meta_path_and_selector() {
        assert_eq!(meta_path("zk"), "/zookeeper-operator/zk");
        assert_eq!(cluster_selector("zk"), format!("{}=zk", CLUSTER_LABEL));
    }
}
