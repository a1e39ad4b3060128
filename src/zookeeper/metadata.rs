//! Operator metadata stored inside the ensemble
//!
//! Each cluster gets a persistent znode `/zookeeper-operator/<cluster>`
//! whose data is `CLUSTER_SIZE=<replicas>`. Member scripts read it to
//! decide whether a departing server must be removed from the dynamic
//! membership.
//!
//! The [`MetadataClient`] trait is the seam between the reconciler and the
//! network; production uses [`ZkMetadataClient`], tests substitute an
//! in-memory implementation.

use async_trait::async_trait;
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info, warn};
use zookeeper_client as zk;

use crate::crd::ZookeeperCluster;
use crate::resources::common::{client_service_uri, meta_path};

/// Parent znode of all per-cluster metadata nodes
pub const META_ROOT: &str = "/zookeeper-operator";

/// Znode client failures
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: zk::Error,
    },

    #[error("znode operation on {path} failed: {source}")]
    Operation {
        path: String,
        #[source]
        source: zk::Error,
    },

    #[error("znode {0} does not exist")]
    NoNode(String),
}

/// Znode data recorded for a cluster of the given size
pub fn cluster_size_data(replicas: i32) -> String {
    format!("CLUSTER_SIZE={}", replicas)
}

/// Opens sessions against an ensemble
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Connect to the ensemble at `uri` (`host:port`)
    async fn connect(&self, uri: &str) -> Result<Box<dyn MetadataSession>, MetadataError>;
}

/// An open znode session
#[async_trait]
pub trait MetadataSession: Send + Sync {
    /// Version of the node at `path`, or `None` when it does not exist
    async fn node_exists(&self, path: &str) -> Result<Option<i32>, MetadataError>;

    /// Create the metadata node for `cluster` at `path`, including parents
    async fn create_node(&self, cluster: &ZookeeperCluster, path: &str)
    -> Result<(), MetadataError>;

    /// Overwrite the data of `path`, guarded by the expected `version`
    async fn update_node(&self, path: &str, data: &str, version: i32)
    -> Result<(), MetadataError>;

    /// End the session
    async fn close(self: Box<Self>);
}

/// [`MetadataClient`] backed by the `zookeeper-client` crate
#[derive(Clone, Debug, Default)]
pub struct ZkMetadataClient;

#[async_trait]
impl MetadataClient for ZkMetadataClient {
    async fn connect(&self, uri: &str) -> Result<Box<dyn MetadataSession>, MetadataError> {
        let client = zk::Client::connect(uri)
            .await
            .map_err(|source| MetadataError::Connect {
                uri: uri.to_string(),
                source,
            })?;
        debug!(uri = %uri, "Connected to ZooKeeper");
        Ok(Box::new(ZkSession { client }))
    }
}

struct ZkSession {
    client: zk::Client,
}

impl ZkSession {
    async fn create_persistent(&self, path: &str, data: &[u8]) -> Result<(), MetadataError> {
        let options = zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all());
        match self.client.create(path, data, &options).await {
            Ok(_) | Err(zk::Error::NodeExists) => Ok(()),
            Err(source) => Err(MetadataError::Operation {
                path: path.to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl MetadataSession for ZkSession {
    async fn node_exists(&self, path: &str) -> Result<Option<i32>, MetadataError> {
        let stat = self
            .client
            .check_stat(path)
            .await
            .map_err(|source| MetadataError::Operation {
                path: path.to_string(),
                source,
            })?;
        Ok(stat.map(|s| s.version))
    }

    async fn create_node(
        &self,
        cluster: &ZookeeperCluster,
        path: &str,
    ) -> Result<(), MetadataError> {
        // Parents first; an existing parent is fine.
        let mut parent = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            parent.push('/');
            parent.push_str(segment);
            self.create_persistent(&parent, b"").await?;
        }

        let data = cluster_size_data(cluster.spec.replicas);
        self.create_persistent(path, data.as_bytes()).await?;
        info!(path = %path, data = %data, "Created cluster metadata znode");
        Ok(())
    }

    async fn update_node(
        &self,
        path: &str,
        data: &str,
        version: i32,
    ) -> Result<(), MetadataError> {
        match self
            .client
            .set_data(path, data.as_bytes(), Some(version))
            .await
        {
            Ok(_) => {
                info!(path = %path, data = %data, "Updated cluster metadata znode");
                Ok(())
            }
            Err(zk::Error::NoNode) => Err(MetadataError::NoNode(path.to_string())),
            Err(source) => Err(MetadataError::Operation {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn close(self: Box<Self>) {
        // Dropping the last client handle closes the session.
        drop(self.client);
    }
}

/// Create the metadata znode of a newly ready cluster
pub async fn create_cluster_node(
    client: &dyn MetadataClient,
    cluster: &ZookeeperCluster,
) -> Result<(), MetadataError> {
    let path = meta_path(&cluster.name_any());
    let session = client.connect(&client_service_uri(cluster)).await?;
    let result = session.create_node(cluster, &path).await;
    session.close().await;
    result
}

/// Record the desired ensemble size in the cluster's metadata znode,
/// recreating the node if it disappeared
pub async fn record_cluster_size(
    client: &dyn MetadataClient,
    cluster: &ZookeeperCluster,
) -> Result<(), MetadataError> {
    let path = meta_path(&cluster.name_any());
    let session = client.connect(&client_service_uri(cluster)).await?;

    let result = match session.node_exists(&path).await {
        Ok(Some(version)) => {
            session
                .update_node(&path, &cluster_size_data(cluster.spec.replicas), version)
                .await
        }
        Ok(None) => {
            warn!(path = %path, "Metadata znode missing, recreating");
            session.create_node(cluster, &path).await
        }
        Err(e) => Err(e),
    };

    session.close().await;
    result
}
