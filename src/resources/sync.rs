//! Drift detection and synchronization of child resources
//!
//! Desired objects are rendered fresh on every pass and never mutated
//! afterwards. When a child already exists, [`synchronize`] builds the
//! object to write by copying only the fields this operator owns onto a
//! clone of the freshly fetched observed object, so server-assigned fields
//! (cluster IPs, claim templates, resource versions) survive the update.
//!
//! A write is needed when the desired hash changed or when someone edited
//! an owned field out of band. The second check compares only fields the
//! API server never defaults, so a converged child compares equal.

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec,
    Service, ServiceAccount, ServiceSpec,
};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::resources::common::LAST_APPLIED_HASH_ANNOTATION;
use crate::resources::hash::{content_hash, last_applied_hash, set_last_applied_hash};

/// A namespaced child resource managed by a reconciler
pub trait ChildResource:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    /// The controller-owned part of the object, as JSON
    fn owned_payload(&self) -> Value;

    /// Copy the controller-owned fields of `desired` onto `observed`
    fn apply_owned(observed: &mut Self, desired: &Self);

    /// Whether an owned field of `observed` no longer matches `desired`
    fn drifted(observed: &Self, desired: &Self) -> bool;
}

/// Hash of everything the controller owns on an object
pub fn desired_hash<T: ChildResource>(desired: &T) -> Result<String, serde_json::Error> {
    let meta = desired.meta();
    let annotations = meta
        .annotations
        .as_ref()
        .map(|a| {
            a.iter()
                .filter(|(k, _)| k.as_str() != LAST_APPLIED_HASH_ANNOTATION)
                .collect::<Vec<_>>()
        })
        .filter(|a| !a.is_empty());
    content_hash(&json!({
        "labels": meta.labels,
        "annotations": annotations,
        "payload": desired.owned_payload(),
    }))
}

/// Stamp the desired hash annotation onto a freshly rendered object
pub fn with_desired_hash<T: ChildResource>(mut desired: T) -> Result<T, serde_json::Error> {
    let hash = desired_hash(&desired)?;
    set_last_applied_hash(desired.meta_mut(), hash);
    Ok(desired)
}

/// Compare a hash-stamped desired object against the observed one.
///
/// Returns `None` when the observed object carries the desired hash and its
/// owned fields still match, otherwise the merged object to write back.
pub fn synchronize<T: ChildResource>(observed: &T, desired: &T) -> Option<T> {
    let desired_hash = last_applied_hash(desired.meta());
    let hash_matches =
        desired_hash.is_some() && last_applied_hash(observed.meta()) == desired_hash;
    if hash_matches && !T::drifted(observed, desired) {
        return None;
    }

    let mut merged = observed.clone();
    {
        let target = merged.meta_mut();
        let source = desired.meta();
        if let Some(labels) = &source.labels {
            target
                .labels
                .get_or_insert_with(Default::default)
                .extend(labels.clone());
        }
        if let Some(annotations) = &source.annotations {
            target
                .annotations
                .get_or_insert_with(Default::default)
                .extend(annotations.clone());
        }
        if source.owner_references.is_some() {
            target.owner_references = source.owner_references.clone();
        }
    }
    T::apply_owned(&mut merged, desired);
    Some(merged)
}

/// Entries of `desired` that are missing or different in `observed`
fn entries_differ(
    observed: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> bool {
    desired
        .into_iter()
        .flatten()
        .any(|(key, value)| observed.and_then(|o| o.get(key)) != Some(value))
}

/// Container names, images and env of a pod spec
fn containers_fingerprint(spec: Option<&PodSpec>) -> Value {
    let containers = spec.map(|s| s.containers.as_slice()).unwrap_or_default();
    containers
        .iter()
        .map(|c| {
            let env: Vec<Value> = c
                .env
                .iter()
                .flatten()
                .map(|e| {
                    json!({
                        "name": e.name,
                        "value": e.value,
                        "fieldPath": e
                            .value_from
                            .as_ref()
                            .and_then(|v| v.field_ref.as_ref())
                            .map(|f| &f.field_path),
                    })
                })
                .collect();
            json!({ "name": c.name, "image": c.image, "env": env })
        })
        .collect()
}

fn template_annotations(template: &PodTemplateSpec) -> Option<&BTreeMap<String, String>> {
    template.metadata.as_ref().and_then(|m| m.annotations.as_ref())
}

fn pod_template_drifted(observed: &PodTemplateSpec, desired: &PodTemplateSpec) -> bool {
    entries_differ(template_annotations(observed), template_annotations(desired))
        || containers_fingerprint(observed.spec.as_ref())
            != containers_fingerprint(desired.spec.as_ref())
}

impl ChildResource for ConfigMap {
    fn owned_payload(&self) -> Value {
        json!({ "data": self.data, "binaryData": self.binary_data })
    }

    fn apply_owned(observed: &mut Self, desired: &Self) {
        observed.data = desired.data.clone();
        observed.binary_data = desired.binary_data.clone();
    }

    fn drifted(observed: &Self, desired: &Self) -> bool {
        observed.data != desired.data || observed.binary_data != desired.binary_data
    }
}

impl ChildResource for StatefulSet {
    fn owned_payload(&self) -> Value {
        let spec = self.spec.as_ref();
        json!({
            "replicas": spec.and_then(|s| s.replicas),
            "template": spec.map(|s| &s.template),
            "updateStrategy": spec.and_then(|s| s.update_strategy.as_ref()),
        })
    }

    // Selector, serviceName, podManagementPolicy and volumeClaimTemplates
    // are immutable after creation and stay as observed.
    fn apply_owned(observed: &mut Self, desired: &Self) {
        let Some(desired_spec) = desired.spec.as_ref() else {
            return;
        };
        let spec = observed.spec.get_or_insert_with(|| desired_spec.clone());
        spec.replicas = desired_spec.replicas;
        spec.template = desired_spec.template.clone();
        spec.update_strategy = desired_spec.update_strategy.clone();
    }

    fn drifted(observed: &Self, desired: &Self) -> bool {
        let Some(desired_spec) = desired.spec.as_ref() else {
            return false;
        };
        let Some(spec) = observed.spec.as_ref() else {
            return true;
        };
        spec.replicas != desired_spec.replicas
            || pod_template_drifted(&spec.template, &desired_spec.template)
    }
}

impl ChildResource for Service {
    fn owned_payload(&self) -> Value {
        let spec = self.spec.as_ref();
        json!({
            "ports": spec.and_then(|s| s.ports.as_ref()),
            "selector": spec.and_then(|s| s.selector.as_ref()),
            "type": spec.and_then(|s| s.type_.as_ref()),
            "publishNotReadyAddresses": spec.and_then(|s| s.publish_not_ready_addresses),
        })
    }

    // clusterIP(s), ipFamilies and allocated node ports are assigned by the
    // API server and must be carried over from the observed object.
    fn apply_owned(observed: &mut Self, desired: &Self) {
        let Some(desired_spec) = desired.spec.as_ref() else {
            return;
        };
        let spec = observed.spec.get_or_insert_with(ServiceSpec::default);
        let observed_ports = spec.ports.clone().unwrap_or_default();

        spec.ports = desired_spec.ports.clone().map(|ports| {
            ports
                .into_iter()
                .map(|mut port| {
                    if port.node_port.is_none() {
                        port.node_port = observed_ports
                            .iter()
                            .find(|p| p.name == port.name)
                            .and_then(|p| p.node_port);
                    }
                    port
                })
                .collect()
        });
        spec.selector = desired_spec.selector.clone();
        spec.type_ = desired_spec.type_.clone();
        spec.publish_not_ready_addresses = desired_spec.publish_not_ready_addresses;
    }

    // Ports are compared by name and number; protocol and targetPort are
    // defaulted by the API server.
    fn drifted(observed: &Self, desired: &Self) -> bool {
        let Some(desired_spec) = desired.spec.as_ref() else {
            return false;
        };
        let Some(spec) = observed.spec.as_ref() else {
            return true;
        };
        let ports = |s: &ServiceSpec| -> Vec<(Option<String>, i32)> {
            s.ports
                .iter()
                .flatten()
                .map(|p| (p.name.clone(), p.port))
                .collect()
        };
        ports(spec) != ports(desired_spec)
            || spec.selector != desired_spec.selector
            || (desired_spec.type_.is_some() && spec.type_ != desired_spec.type_)
            || (desired_spec.publish_not_ready_addresses.is_some()
                && spec.publish_not_ready_addresses != desired_spec.publish_not_ready_addresses)
    }
}

impl ChildResource for PodDisruptionBudget {
    fn owned_payload(&self) -> Value {
        json!({ "spec": self.spec })
    }

    fn apply_owned(observed: &mut Self, desired: &Self) {
        observed.spec = desired.spec.clone();
    }

    fn drifted(observed: &Self, desired: &Self) -> bool {
        let Some(desired_spec) = desired.spec.as_ref() else {
            return false;
        };
        let Some(spec) = observed.spec.as_ref() else {
            return true;
        };
        spec.max_unavailable != desired_spec.max_unavailable
            || spec.min_available != desired_spec.min_available
            || spec.selector != desired_spec.selector
    }
}

impl ChildResource for ServiceAccount {
    fn owned_payload(&self) -> Value {
        json!({ "imagePullSecrets": self.image_pull_secrets })
    }

    fn apply_owned(observed: &mut Self, desired: &Self) {
        observed.image_pull_secrets = desired.image_pull_secrets.clone();
    }

    fn drifted(observed: &Self, desired: &Self) -> bool {
        observed.image_pull_secrets != desired.image_pull_secrets
    }
}

impl ChildResource for PersistentVolumeClaim {
    fn owned_payload(&self) -> Value {
        let spec = self.spec.as_ref();
        json!({
            "resources": spec.and_then(|s| s.resources.as_ref()),
            "storageClassName": spec.and_then(|s| s.storage_class_name.as_ref()),
        })
    }

    // volumeName and accessModes are bound by the API server; only the
    // requested capacity and class are driven from the backup spec.
    fn apply_owned(observed: &mut Self, desired: &Self) {
        let Some(desired_spec) = desired.spec.as_ref() else {
            return;
        };
        let spec = observed.spec.get_or_insert_with(|| desired_spec.clone());
        spec.resources = desired_spec.resources.clone();
        spec.storage_class_name = desired_spec.storage_class_name.clone();
    }

    // An unset class is filled in with the cluster default and is not drift.
    fn drifted(observed: &Self, desired: &Self) -> bool {
        let Some(desired_spec) = desired.spec.as_ref() else {
            return false;
        };
        let Some(spec) = observed.spec.as_ref() else {
            return true;
        };
        let requests = |s: &PersistentVolumeClaimSpec| {
            s.resources.as_ref().and_then(|r| r.requests.clone())
        };
        requests(spec) != requests(desired_spec)
            || (desired_spec.storage_class_name.is_some()
                && spec.storage_class_name != desired_spec.storage_class_name)
    }
}

impl ChildResource for CronJob {
    fn owned_payload(&self) -> Value {
        json!({ "spec": self.spec })
    }

    fn apply_owned(observed: &mut Self, desired: &Self) {
        observed.spec = desired.spec.clone();
    }

    // Schedule, suspension and leader placement; the job defaults
    // (history limits, concurrency policy) are left to the API server.
    fn drifted(observed: &Self, desired: &Self) -> bool {
        let Some(desired_spec) = desired.spec.as_ref() else {
            return false;
        };
        let Some(spec) = observed.spec.as_ref() else {
            return true;
        };
        let pod = |s: &CronJobSpec| {
            s.job_template
                .spec
                .as_ref()
                .and_then(|j| j.template.spec.clone())
        };
        let placement = |pod: Option<PodSpec>| {
            let claims: Vec<String> = pod
                .iter()
                .flat_map(|p| p.volumes.iter().flatten())
                .filter_map(|v| v.persistent_volume_claim.as_ref())
                .map(|c| c.claim_name.clone())
                .collect();
            json!({
                "affinity": pod.as_ref().and_then(|p| p.affinity.as_ref()),
                "claims": claims,
                "containers": containers_fingerprint(pod.as_ref()),
            })
        };
        spec.schedule != desired_spec.schedule
            || spec.suspend != desired_spec.suspend
            || placement(pod(spec)) != placement(pod(desired_spec))
    }
}
