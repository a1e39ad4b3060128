//! Unit tests for the per-cluster metadata znode

use zookeeper_operator::resources::common::meta_path;
use zookeeper_operator::zookeeper::metadata::{META_ROOT, cluster_size_data};
use zookeeper_operator::zookeeper::{MetadataError, create_cluster_node, record_cluster_size};

use crate::common::*;

#[tokio::test]
async fn test_create_cluster_node_with_parent() {
    let store = InMemoryMetadataClient::new();
    let cluster = create_test_cluster("zk", "default", 3);

    create_cluster_node(&store, &cluster).await.unwrap();

    assert_eq!(store.data(&meta_path("zk")), Some(cluster_size_data(3)));
    assert!(store.data(META_ROOT).is_some());
    assert_eq!(
        *store.connected_uris.lock().unwrap(),
        vec!["zk-client.default.svc.cluster.local:2181".to_string()]
    );
}

#[tokio::test]
async fn test_create_cluster_node_is_idempotent() {
    let store = InMemoryMetadataClient::new();
    let cluster = create_test_cluster("zk", "default", 3);

    create_cluster_node(&store, &cluster).await.unwrap();
    create_cluster_node(&store, &cluster).await.unwrap();

    assert_eq!(store.version(&meta_path("zk")), Some(0));
}

#[tokio::test]
async fn test_record_cluster_size_updates_existing_node() {
    let store = InMemoryMetadataClient::new();
    store.insert(&meta_path("zk"), &cluster_size_data(3), 4);
    let cluster = create_test_cluster("zk", "default", 5);

    record_cluster_size(&store, &cluster).await.unwrap();

    assert_eq!(store.data(&meta_path("zk")), Some("CLUSTER_SIZE=5".to_string()));
    assert_eq!(store.version(&meta_path("zk")), Some(5));
}

#[tokio::test]
async fn test_record_cluster_size_recreates_missing_node() {
    let store = InMemoryMetadataClient::new();
    let cluster = create_test_cluster("zk", "default", 1);

    record_cluster_size(&store, &cluster).await.unwrap();

    assert_eq!(store.data(&meta_path("zk")), Some("CLUSTER_SIZE=1".to_string()));
}

#[tokio::test]
async fn test_unreachable_ensemble_is_reported() {
    let store = InMemoryMetadataClient::unreachable();
    let cluster = create_test_cluster("zk", "default", 3);

    let result = record_cluster_size(&store, &cluster).await;
    match result {
        Err(MetadataError::Connect { uri, .. }) => {
            assert_eq!(uri, "zk-client.default.svc.cluster.local:2181")
        }
        other => panic!("expected connect error, got {:?}", other),
    }
    assert!(store.nodes.lock().unwrap().is_empty());
}
