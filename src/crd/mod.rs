mod zookeeper_backup;
mod zookeeper_cluster;

pub use zookeeper_backup::*;
pub use zookeeper_cluster::*;
