//! Validation of ZookeeperCluster specs
//!
//! Runs on the defaulted spec before any child resource is rendered:
//! - Replica count within the supported ensemble size
//! - Data volume size is a parseable quantity
//! - Container ports are distinct

use std::collections::BTreeSet;

use crate::controller::error::{Error, Result};
use crate::crd::ZookeeperCluster;

/// Minimum number of replicas
pub const MIN_REPLICAS: i32 = 1;

/// Maximum number of replicas. Larger ensembles slow down every write
/// without adding useful fault tolerance.
pub const MAX_REPLICAS: i32 = 7;

const SIZE_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "G", "M"];

/// Validate the cluster spec
pub fn validate_spec(cluster: &ZookeeperCluster) -> Result<()> {
    validate_replicas(cluster.spec.replicas)?;
    validate_storage(&cluster.spec.persistence.size)?;
    validate_ports(cluster)?;
    Ok(())
}

/// Validate replica count
pub fn validate_replicas(replicas: i32) -> Result<()> {
    if replicas < MIN_REPLICAS {
        return Err(Error::ValidationError(format!(
            "replica count {} is below minimum {}",
            replicas, MIN_REPLICAS
        )));
    }

    if replicas > MAX_REPLICAS {
        return Err(Error::ValidationError(format!(
            "replica count {} exceeds maximum {}",
            replicas, MAX_REPLICAS
        )));
    }

    Ok(())
}

/// Validate the data volume size (e.g. "20Gi")
fn validate_storage(size: &str) -> Result<()> {
    let Some(suffix) = SIZE_SUFFIXES.iter().find(|s| size.ends_with(*s)) else {
        return Err(Error::ValidationError(format!(
            "storage size must end with one of {:?}: {}",
            SIZE_SUFFIXES, size
        )));
    };

    let number = &size[..size.len() - suffix.len()];
    match number.parse::<u64>() {
        Ok(n) if n > 0 => Ok(()),
        _ => Err(Error::ValidationError(format!(
            "invalid storage size number: {}",
            size
        ))),
    }
}

fn validate_ports(cluster: &ZookeeperCluster) -> Result<()> {
    let mut seen = BTreeSet::new();
    for port in &cluster.spec.ports {
        if !(1..=65535).contains(&port.container_port) {
            return Err(Error::ValidationError(format!(
                "port {} has invalid number {}",
                port.name, port.container_port
            )));
        }
        if !seen.insert(port.container_port) {
            return Err(Error::ValidationError(format!(
                "port {} reuses container port {}",
                port.name, port.container_port
            )));
        }
    }
    Ok(())
}
