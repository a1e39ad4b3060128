//! Unit tests for cluster spec validation

use zookeeper_operator::controller::Error;
use zookeeper_operator::controller::validation::{
    MAX_REPLICAS, MIN_REPLICAS, validate_replicas, validate_spec,
};
use zookeeper_operator::crd::port_names;

use crate::common::*;

fn assert_invalid(result: Result<(), Error>, fragment: &str) {
    match result {
        Err(Error::ValidationError(msg)) => {
            assert!(msg.contains(fragment), "unexpected message: {}", msg)
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

mod replica_tests {
    use super::*;

    #[test]
    fn test_supported_ensemble_sizes() {
        for replicas in MIN_REPLICAS..=MAX_REPLICAS {
            assert!(validate_replicas(replicas).is_ok(), "{} rejected", replicas);
        }
    }

    #[test]
    fn test_zero_replicas_rejected() {
        assert_invalid(validate_replicas(0), "below minimum");
    }

    #[test]
    fn test_negative_replicas_rejected() {
        assert_invalid(validate_replicas(-3), "below minimum");
    }

    #[test]
    fn test_oversized_ensemble_rejected() {
        assert_invalid(validate_replicas(MAX_REPLICAS + 1), "exceeds maximum");
    }
}

mod storage_tests {
    use super::*;

    #[test]
    fn test_defaulted_cluster_is_valid() {
        assert!(validate_spec(&create_test_cluster("zk", "default", 3)).is_ok());
    }

    #[test]
    fn test_storage_suffixes() {
        for size in ["512Mi", "20Gi", "1Ti", "100G", "10M", "4096Ki"] {
            let cluster = ZookeeperClusterBuilder::new("zk", "default")
                .with_storage(size, None)
                .build();
            assert!(validate_spec(&cluster).is_ok(), "{} rejected", size);
        }
    }

    #[test]
    fn test_storage_without_unit_rejected() {
        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_storage("20", None)
            .build();
        assert_invalid(validate_spec(&cluster), "storage size");
    }

    #[test]
    fn test_zero_storage_rejected() {
        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_storage("0Gi", None)
            .build();
        assert_invalid(validate_spec(&cluster), "invalid storage size");
    }

    #[test]
    fn test_fractional_storage_rejected() {
        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_storage("1.5Gi", None)
            .build();
        assert_invalid(validate_spec(&cluster), "invalid storage size");
    }
}

mod port_tests {
    use super::*;

    #[test]
    fn test_port_out_of_range_rejected() {
        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_port(port_names::METRICS, 70000)
            .build();
        assert_invalid(validate_spec(&cluster), "invalid number");
    }

    #[test]
    fn test_duplicate_port_rejected() {
        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_port(port_names::METRICS, 2181)
            .build();
        assert_invalid(validate_spec(&cluster), "reuses container port 2181");
    }
}
