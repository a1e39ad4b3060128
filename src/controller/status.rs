//! Status and conditions management for ZookeeperCluster resources
//!
//! This module provides utilities for managing Kubernetes-style conditions,
//! aggregating member readiness, and writing the status subresource.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use serde_json::json;

use crate::controller::Context;
use crate::controller::error::{Error, Result};
use crate::crd::{
    ClusterCondition, ConditionStatus, ConditionType, MembersStatus, ZookeeperCluster,
    ZookeeperClusterStatus,
};
use crate::resources::common::FIELD_MANAGER;

/// Condition reasons written by the operator
pub mod reasons {
    pub const UPDATING_ZOOKEEPER: &str = "UpdatingZookeeper";
    pub const UPGRADE_FAILED: &str = "UpgradeFailed";
    pub const UPGRADE_COMPLETED: &str = "UpgradeCompleted";
    pub const UPGRADE_CANCELLED: &str = "UpgradeCancelled";
    pub const UPGRADE_HEALED: &str = "UpgradeHealed";
    pub const CLUSTER_READY: &str = "ClusterReady";
    pub const WAITING_FOR_PODS: &str = "WaitingForPods";
}

/// Builder for creating and updating status conditions
///
/// `lastTransitionTime` moves only when a condition's status changes;
/// `lastUpdateTime` moves whenever status, reason or message changes.
pub struct ConditionBuilder {
    conditions: Vec<ClusterCondition>,
    now: DateTime<Utc>,
}

impl ConditionBuilder {
    /// Create a new, empty condition builder
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            conditions: Vec::new(),
            now,
        }
    }

    /// Create from existing conditions
    pub fn from_existing(existing: Vec<ClusterCondition>, now: DateTime<Utc>) -> Self {
        Self {
            conditions: existing,
            now,
        }
    }

    /// Ensure exactly one condition per type exists, adding missing types as
    /// `False` and dropping duplicates (first occurrence wins)
    pub fn init(mut self) -> Self {
        let mut seen = Vec::with_capacity(ConditionType::ALL.len());
        self.conditions.retain(|c| {
            if seen.contains(&c.type_) {
                false
            } else {
                seen.push(c.type_);
                true
            }
        });

        let now = self.now.to_rfc3339();
        for type_ in ConditionType::ALL {
            if !seen.contains(&type_) {
                self.conditions.push(ClusterCondition {
                    type_,
                    status: ConditionStatus::False,
                    reason: String::new(),
                    message: String::new(),
                    last_update_time: now.clone(),
                    last_transition_time: now.clone(),
                });
            }
        }
        self
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    pub fn set_condition(
        mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) -> Self {
        let now = self.now.to_rfc3339();

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.status = status;
                existing.reason = reason.to_string();
                existing.message = message.to_string();
                existing.last_transition_time = now.clone();
                existing.last_update_time = now;
            } else if existing.reason != reason || existing.message != message {
                existing.reason = reason.to_string();
                existing.message = message.to_string();
                existing.last_update_time = now;
            }
        } else {
            self.conditions.push(ClusterCondition {
                type_,
                status,
                reason: reason.to_string(),
                message: message.to_string(),
                last_update_time: now.clone(),
                last_transition_time: now,
            });
        }
        self
    }

    /// Set the PodsReady condition
    pub fn pods_ready(self, ready: bool, reason: &str, message: &str) -> Self {
        self.set_condition(ConditionType::PodsReady, ready.into(), reason, message)
    }

    /// Set the Upgrading condition
    pub fn upgrading(self, upgrading: bool, reason: &str, message: &str) -> Self {
        self.set_condition(ConditionType::Upgrading, upgrading.into(), reason, message)
    }

    /// Set the Error condition
    pub fn error(self, error: bool, reason: &str, message: &str) -> Self {
        self.set_condition(ConditionType::Error, error.into(), reason, message)
    }

    /// Look up a condition by type
    pub fn get(&self, type_: ConditionType) -> Option<&ClusterCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<ClusterCondition> {
        self.conditions
    }
}

/// Look up a condition by type on a status
pub fn condition(status: &ZookeeperClusterStatus, type_: ConditionType) -> Option<&ClusterCondition> {
    status.conditions.iter().find(|c| c.type_ == type_)
}

/// Whether a condition is present with status `True`
pub fn is_condition_true(status: &ZookeeperClusterStatus, type_: ConditionType) -> bool {
    condition(status, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Parse an RFC 3339 condition timestamp
pub fn parse_condition_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// A member pod is ready iff it reports container statuses and every one
/// of them is ready
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .is_some_and(|statuses| !statuses.is_empty() && statuses.iter().all(|c| c.ready))
}

/// Split member pods into ready and unready name lists (each sorted)
pub fn aggregate_members(pods: &[Pod]) -> MembersStatus {
    let mut members = MembersStatus::default();
    for pod in pods {
        if is_pod_ready(pod) {
            members.ready.push(pod.name_any());
        } else {
            members.unready.push(pod.name_any());
        }
    }
    members.ready.sort();
    members.unready.sort();
    members
}

/// Writes the status subresource of a ZookeeperCluster
pub struct StatusManager<'a> {
    cluster: &'a ZookeeperCluster,
    ctx: &'a Context,
}

impl<'a> StatusManager<'a> {
    /// Create a new status manager
    pub fn new(cluster: &'a ZookeeperCluster, ctx: &'a Context) -> Self {
        Self { cluster, ctx }
    }

    /// Whether `status` differs from what is already stored
    pub fn changed(&self, status: &ZookeeperClusterStatus) -> bool {
        self.cluster.status.as_ref() != Some(status)
    }

    /// Replace the stored status.
    ///
    /// The patch carries the observed `resourceVersion`, so a concurrent
    /// writer makes this fail with a conflict instead of being overwritten.
    pub async fn update(&self, status: &ZookeeperClusterStatus) -> Result<()> {
        let ns = self
            .cluster
            .namespace()
            .ok_or(Error::MissingObjectKey("namespace"))?;
        let resource_version = self
            .cluster
            .resource_version()
            .ok_or(Error::MissingObjectKey("resourceVersion"))?;
        let api: Api<ZookeeperCluster> = Api::namespaced(self.ctx.client.clone(), &ns);

        let patch = json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status_patch(status)?,
        });

        api.patch_status(
            &self.cluster.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }
}

/// Status fields that serialize to nothing when empty. A merge patch
/// leaves omitted fields untouched, so they are sent as explicit nulls.
const CLEARABLE_FIELDS: [&str; 4] = [
    "currentVersion",
    "targetVersion",
    "internalClientEndpoint",
    "conditions",
];

/// Merge-patch body for a status, clearing emptied fields
pub fn status_patch(status: &ZookeeperClusterStatus) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(status)?;
    if let Some(object) = value.as_object_mut() {
        for field in CLEARABLE_FIELDS {
            object
                .entry(field)
                .or_insert(serde_json::Value::Null);
        }
    }
    Ok(value)
}
