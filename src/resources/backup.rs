//! Backup resources for ZooKeeper clusters
//!
//! A ZookeeperBackup owns two children:
//! - PVC `<backup>-pvc` holding the backup archives
//! - CronJob `<backup>-backup` running the backup image against the data
//!   volume of the current quorum leader
//!
//! The CronJob is rendered suspended and pointed at the first member's
//! claim. [`pin_to_leader`] retargets it once the leader pod is known.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvVar, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::ZookeeperBackup;
use crate::resources::common::{
    BACKUP_LABEL, FIELD_MANAGER, data_claim_name, data_claim_name_for_ordinal, owner_reference,
};

/// Mount path of the backup volume inside the job
pub const BACKUP_DIR: &str = "/var/backup";

/// Mount path of the ZooKeeper data volume inside the job
pub const ZOOKEEPER_DATA_DIR: &str = "/data";

const BACKUP_VOLUME_NAME: &str = "zookeeperbackup-vol";
const DATA_VOLUME_NAME: &str = "zookeeperdata-vol";
const BACKUP_CONTAINER_NAME: &str = "run-zkbackup";
const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Name of the backup PVC (`<backup>-pvc`)
pub fn backup_pvc_name(backup_name: &str) -> String {
    format!("{}-pvc", backup_name)
}

/// Name of the backup CronJob (`<backup>-backup`)
pub fn backup_cronjob_name(backup_name: &str) -> String {
    format!("{}-backup", backup_name)
}

fn backup_labels(backup: &ZookeeperBackup) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "zookeeper-backup".to_string()),
        ("app.kubernetes.io/instance".to_string(), backup.name_any()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (BACKUP_LABEL.to_string(), backup.name_any()),
    ])
}

fn metadata(backup: &ZookeeperBackup, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: backup.namespace(),
        labels: Some(backup_labels(backup)),
        owner_references: Some(vec![owner_reference(backup)]),
        ..Default::default()
    }
}

/// Generate the backup PVC
pub fn generate_backup_pvc(backup: &ZookeeperBackup) -> PersistentVolumeClaim {
    let spec = &backup.spec;

    PersistentVolumeClaim {
        metadata: metadata(backup, backup_pvc_name(&backup.name_any())),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: Some(spec.data_storage_class.clone()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(spec.data_capacity.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn claim_volume(name: &str, claim_name: String) -> Volume {
    Volume {
        name: name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the backup CronJob, suspended until a leader is found
pub fn generate_backup_cronjob(backup: &ZookeeperBackup) -> CronJob {
    let name = backup.name_any();
    let spec = &backup.spec;

    let env = [
        ("BACKUPDIR", BACKUP_DIR.to_string()),
        ("ZOOKEEPERDATADIR", ZOOKEEPER_DATA_DIR.to_string()),
        ("BACKUPS_TO_KEEP", spec.backups_to_keep.clone()),
    ]
    .into_iter()
    .map(|(name, value)| EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    })
    .collect();

    let container = Container {
        name: BACKUP_CONTAINER_NAME.to_string(),
        image: Some(spec.image.to_image_name()),
        image_pull_policy: Some(spec.image.pull_policy.clone()),
        env: Some(env),
        volume_mounts: Some(vec![
            VolumeMount {
                name: BACKUP_VOLUME_NAME.to_string(),
                mount_path: BACKUP_DIR.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: DATA_VOLUME_NAME.to_string(),
                mount_path: ZOOKEEPER_DATA_DIR.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let volumes = vec![
        claim_volume(BACKUP_VOLUME_NAME, backup_pvc_name(&name)),
        claim_volume(
            DATA_VOLUME_NAME,
            data_claim_name_for_ordinal(&spec.zookeeper_cluster, 0),
        ),
    ];

    CronJob {
        metadata: metadata(backup, backup_cronjob_name(&name)),
        spec: Some(CronJobSpec {
            schedule: spec.schedule.clone(),
            concurrency_policy: Some("Forbid".to_string()),
            suspend: Some(true),
            job_template: JobTemplateSpec {
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        metadata: Some(ObjectMeta {
                            labels: Some(backup_labels(backup)),
                            ..Default::default()
                        }),
                        spec: Some(PodSpec {
                            restart_policy: Some("Never".to_string()),
                            containers: vec![container],
                            volumes: Some(volumes),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pin the backup job to the leader pod's node and data volume
pub fn pin_to_leader(cronjob: &mut CronJob, leader_pod: &str, node_name: &str) {
    let Some(pod) = cronjob
        .spec
        .as_mut()
        .and_then(|s| s.job_template.spec.as_mut())
        .and_then(|j| j.template.spec.as_mut())
    else {
        return;
    };

    pod.affinity = Some(Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![NodeSelectorRequirement {
                        key: HOSTNAME_LABEL.to_string(),
                        operator: "In".to_string(),
                        values: Some(vec![node_name.to_string()]),
                    }]),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    });

    for volume in pod.volumes.iter_mut().flatten() {
        if volume.name == DATA_VOLUME_NAME {
            if let Some(claim) = volume.persistent_volume_claim.as_mut() {
                claim.claim_name = data_claim_name(leader_pod);
            }
        }
    }
}

/// Set the CronJob's suspend flag
pub fn set_suspended(cronjob: &mut CronJob, suspend: bool) {
    if let Some(spec) = cronjob.spec.as_mut() {
        spec.suspend = Some(suspend);
    }
}
