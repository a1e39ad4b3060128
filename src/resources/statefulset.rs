//! ZooKeeper ensemble StatefulSet
//!
//! One StatefulSet named after the cluster runs every member. Members find
//! each other through the headless Service, read their configuration from
//! the `<cluster>-configmap` volume and keep their data on a per-replica
//! claim created from the `data` volume claim template.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource, ExecAction,
    Lifecycle, LifecycleHandler, LocalObjectReference, ObjectFieldSelector, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Toleration, Volume, VolumeMount, VolumeResourceRequirements,
    WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{self, AntiAffinity, ZookeeperCluster};
use crate::resources::common::{
    CLUSTER_LABEL, DATA_VOLUME_NAME, cluster_labels, config_map_name, headless_service_name,
    owner_reference, selector_labels,
};

/// Name of the ZooKeeper container in every member pod
pub const CONTAINER_NAME: &str = "zookeeper";

/// Name of the ConfigMap volume mounted at `/conf`
const CONF_VOLUME_NAME: &str = "conf";

/// Topology key used for member spreading
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

fn probe(script: &str, initial_delay: i32, failure_threshold: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![script.to_string()]),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        timeout_seconds: Some(10),
        failure_threshold: Some(failure_threshold),
        ..Default::default()
    }
}

/// Pod anti-affinity spreading members across nodes.
///
/// `Required` refuses to co-schedule two members; `Preferred` only weights
/// the scheduler against it.
pub fn generate_anti_affinity(cluster_name: &str, mode: AntiAffinity) -> Affinity {
    let term = PodAffinityTerm {
        label_selector: Some(LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: CLUSTER_LABEL.to_string(),
                operator: "In".to_string(),
                values: Some(vec![cluster_name.to_string()]),
            }]),
            ..Default::default()
        }),
        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
        ..Default::default()
    };

    let anti_affinity = match mode {
        AntiAffinity::Required => PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![term]),
            ..Default::default()
        },
        AntiAffinity::Preferred => PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: 20,
                    pod_affinity_term: term,
                },
            ]),
            ..Default::default()
        },
    };

    Affinity {
        pod_anti_affinity: Some(anti_affinity),
        ..Default::default()
    }
}

fn resource_list(list: &crd::ResourceList) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    if let Some(cpu) = &list.cpu {
        map.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &list.memory {
        map.insert("memory".to_string(), Quantity(memory.clone()));
    }
    map
}

fn container_ports(cluster: &ZookeeperCluster) -> Vec<ContainerPort> {
    cluster
        .spec
        .ports
        .iter()
        .map(|p| ContainerPort {
            name: Some(p.name.clone()),
            container_port: p.container_port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect()
}

fn container_env(cluster: &ZookeeperCluster) -> Vec<EnvVar> {
    let field_ref = |path: &str| {
        Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: path.to_string(),
            }),
            ..Default::default()
        })
    };

    let mut env = vec![
        EnvVar {
            name: "POD_NAME".to_string(),
            value_from: field_ref("metadata.name"),
            ..Default::default()
        },
        EnvVar {
            name: "POD_NAMESPACE".to_string(),
            value_from: field_ref("metadata.namespace"),
            ..Default::default()
        },
    ];

    env.extend(cluster.spec.pod.env.iter().map(|e| EnvVar {
        name: e.name.clone(),
        value: Some(e.value.clone()),
        ..Default::default()
    }));

    env
}

/// Pod template labels: cluster labels plus user pod labels (which cannot
/// override the selector label)
fn pod_labels(cluster: &ZookeeperCluster) -> BTreeMap<String, String> {
    let mut labels = cluster_labels(cluster);
    for (key, value) in &cluster.spec.pod.labels {
        if key != CLUSTER_LABEL {
            labels.insert(key.clone(), value.clone());
        }
    }
    labels
}

fn data_claim_template(cluster: &ZookeeperCluster) -> PersistentVolumeClaim {
    let persistence = &cluster.spec.persistence;

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME_NAME.to_string()),
            labels: Some(selector_labels(&cluster.name_any())),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: persistence.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(persistence.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the ensemble StatefulSet
pub fn generate_statefulset(cluster: &ZookeeperCluster) -> StatefulSet {
    let name = cluster.name_any();
    let spec = &cluster.spec;
    let pod = &spec.pod;

    let volume_mounts = vec![
        VolumeMount {
            name: DATA_VOLUME_NAME.to_string(),
            mount_path: "/data".to_string(),
            ..Default::default()
        },
        VolumeMount {
            name: CONF_VOLUME_NAME.to_string(),
            mount_path: "/conf".to_string(),
            ..Default::default()
        },
    ];

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(spec.image.to_image_name()),
        image_pull_policy: Some(spec.image.pull_policy.clone()),
        command: Some(vec!["/usr/local/bin/zookeeperStart.sh".to_string()]),
        ports: Some(container_ports(cluster)),
        env: Some(container_env(cluster)),
        volume_mounts: Some(volume_mounts),
        resources: pod.resources.as_ref().map(|r| ResourceRequirements {
            limits: r.limits.as_ref().map(resource_list),
            requests: r.requests.as_ref().map(resource_list),
            ..Default::default()
        }),
        readiness_probe: Some(probe("zookeeperReady.sh", 10, 3)),
        liveness_probe: Some(probe("zookeeperLive.sh", 10, 3)),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec!["zookeeperTeardown.sh".to_string()]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    let volumes = vec![Volume {
        name: CONF_VOLUME_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name(&name),
            ..Default::default()
        }),
        ..Default::default()
    }];

    // Includes the restartTime stamp written by a rolling restart.
    let annotations = pod.annotations.clone();

    let tolerations: Vec<Toleration> = pod
        .tolerations
        .iter()
        .map(|t| Toleration {
            key: t.key.clone(),
            operator: t.operator.clone(),
            value: t.value.clone(),
            effect: t.effect.clone(),
            toleration_seconds: t.toleration_seconds,
        })
        .collect();

    let image_pull_secrets: Vec<LocalObjectReference> = pod
        .image_pull_secrets
        .iter()
        .map(|s| LocalObjectReference { name: s.clone() })
        .collect();

    let security_context =
        pod.security_context
            .as_ref()
            .map(|sc| k8s_openapi::api::core::v1::PodSecurityContext {
                run_as_user: sc.run_as_user,
                run_as_group: sc.run_as_group,
                fs_group: sc.fs_group,
                run_as_non_root: sc.run_as_non_root,
                ..Default::default()
            });

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: cluster.namespace(),
            labels: Some(cluster_labels(cluster)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: Some(headless_service_name(&name)),
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..Default::default()
            },
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateStatefulSetStrategy {
                    partition: Some(0),
                    ..Default::default()
                }),
            }),
            pod_management_policy: Some("OrderedReady".to_string()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(name.clone()),
                    labels: Some(pod_labels(cluster)),
                    annotations: (!annotations.is_empty()).then_some(annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    affinity: Some(generate_anti_affinity(&name, pod.anti_affinity)),
                    node_selector: (!pod.node_selector.is_empty())
                        .then(|| pod.node_selector.clone()),
                    tolerations: (!tolerations.is_empty()).then_some(tolerations),
                    service_account_name: Some(pod.service_account_name.clone()),
                    security_context,
                    termination_grace_period_seconds: Some(pod.termination_grace_period_seconds),
                    image_pull_secrets: (!image_pull_secrets.is_empty())
                        .then_some(image_pull_secrets),
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![data_claim_template(cluster)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
