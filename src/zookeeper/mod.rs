//! Clients for talking to a running ZooKeeper ensemble
//!
//! - [`admin`]: AdminServer HTTP API, used to discover the quorum leader
//! - [`metadata`]: znode client recording per-cluster operator metadata

pub mod admin;
pub mod metadata;

pub use admin::{LeaderLookupError, LeaderResponse, find_leader_pod, lookup_leader};
pub use metadata::{
    MetadataClient, MetadataError, MetadataSession, ZkMetadataClient, create_cluster_node,
    record_cluster_size,
};
