use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::ContainerImage;

/// Default backup cron schedule (daily at midnight)
pub const DEFAULT_BACKUP_SCHEDULE: &str = "0 0 */1 * *";

/// Default number of backups kept on the backup volume
pub const DEFAULT_BACKUPS_TO_KEEP: &str = "7";

/// Default storage class of the backup volume
pub const DEFAULT_BACKUP_STORAGE_CLASS: &str = "standard";

/// Default capacity of the backup volume
pub const DEFAULT_BACKUP_CAPACITY: &str = "1Gi";

/// Default backup image repository
pub const DEFAULT_BACKUP_IMAGE_REPOSITORY: &str = "pravega/zkbackup";

/// Default backup image tag
pub const DEFAULT_BACKUP_IMAGE_TAG: &str = "0.1";

/// ZookeeperBackup schedules periodic snapshots of a ZookeeperCluster.
///
/// The backup job always runs on the node of the current quorum leader and
/// mounts the leader's data volume.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[kube(
    group = "zookeeper.pravega.io",
    version = "v1beta1",
    kind = "ZookeeperBackup",
    plural = "zookeeperbackups",
    shortname = "zkbackup",
    namespaced,
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".spec.zookeeperCluster"}"#,
    printcolumn = r#"{"name":"Schedule", "type":"string", "jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperBackupSpec {
    /// Name of the ZookeeperCluster (same namespace) to back up
    pub zookeeper_cluster: String,

    /// Cron schedule of the backup job
    #[serde(default)]
    pub schedule: String,

    /// Number of backups to retain
    #[serde(default)]
    pub backups_to_keep: String,

    /// Storage class of the backup volume
    #[serde(default)]
    pub data_storage_class: String,

    /// Capacity of the backup volume
    #[serde(default)]
    pub data_capacity: String,

    /// Backup container image
    #[serde(default)]
    pub image: ContainerImage,
}

impl ZookeeperBackupSpec {
    /// Fill every unset field. Returns true if anything changed.
    pub fn with_defaults(&mut self) -> bool {
        let mut changed = false;
        for (field, default) in [
            (&mut self.schedule, DEFAULT_BACKUP_SCHEDULE),
            (&mut self.backups_to_keep, DEFAULT_BACKUPS_TO_KEEP),
            (&mut self.data_storage_class, DEFAULT_BACKUP_STORAGE_CLASS),
            (&mut self.data_capacity, DEFAULT_BACKUP_CAPACITY),
            (&mut self.image.repository, DEFAULT_BACKUP_IMAGE_REPOSITORY),
            (&mut self.image.tag, DEFAULT_BACKUP_IMAGE_TAG),
            (&mut self.image.pull_policy, "IfNotPresent"),
        ] {
            if field.is_empty() {
                *field = default.to_string();
                changed = true;
            }
        }
        changed
    }
}
