//! ZooKeeper configuration ConfigMap
//!
//! The ConfigMap carries three files mounted into every member:
//! - `zoo.cfg`: static server configuration (the dynamic membership file
//!   is managed by the container entrypoint)
//! - `env.sh`: service endpoints sourced by the entrypoint scripts
//! - `log4j.properties`: console logging

use std::collections::BTreeMap;
use std::fmt::Write;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{ZookeeperCluster, port_names};
use crate::resources::common::{
    admin_service_name, client_service_name, cluster_labels, config_map_name,
    headless_service_name, owner_reference,
};

const LOG4J_PROPERTIES: &str = "zookeeper.root.logger=CONSOLE
zookeeper.console.threshold=INFO
log4j.rootLogger=${zookeeper.root.logger}
log4j.appender.CONSOLE=org.apache.log4j.ConsoleAppender
log4j.appender.CONSOLE.Threshold=${zookeeper.console.threshold}
log4j.appender.CONSOLE.layout=org.apache.log4j.PatternLayout
log4j.appender.CONSOLE.layout.ConversionPattern=%d{ISO8601} [myid:%X{myid}] - %-5p [%t:%C{1}@%L] - %m%n
";

/// Generate the configuration ConfigMap (`<cluster>-configmap`)
pub fn generate_config_map(cluster: &ZookeeperCluster) -> ConfigMap {
    let cluster_name = cluster.name_any();

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(&cluster_name)),
            namespace: cluster.namespace(),
            labels: Some(cluster_labels(cluster)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            ("zoo.cfg".to_string(), generate_zoo_cfg(cluster)),
            ("env.sh".to_string(), generate_env_sh(cluster)),
            ("log4j.properties".to_string(), LOG4J_PROPERTIES.to_string()),
        ])),
        ..Default::default()
    }
}

/// Render zoo.cfg from the cluster's tuning parameters
pub fn generate_zoo_cfg(cluster: &ZookeeperCluster) -> String {
    let spec = &cluster.spec;
    let c = &spec.config;

    let mut cfg = String::new();
    let lines: [(&str, String); 25] = [
        (
            "4lw.commands.whitelist",
            "cons, envi, conf, crst, srvr, stat, mntr, ruok".to_string(),
        ),
        ("dataDir", "/data".to_string()),
        ("standaloneEnabled", "false".to_string()),
        ("reconfigEnabled", "true".to_string()),
        ("skipACL", "yes".to_string()),
        (
            "metricsProvider.className",
            "org.apache.zookeeper.metrics.prometheus.PrometheusMetricsProvider".to_string(),
        ),
        (
            "metricsProvider.httpPort",
            spec.port(port_names::METRICS).to_string(),
        ),
        ("metricsProvider.exportJvmInfo", "true".to_string()),
        ("initLimit", c.init_limit.to_string()),
        ("syncLimit", c.sync_limit.to_string()),
        ("tickTime", c.tick_time.to_string()),
        ("globalOutstandingLimit", c.global_outstanding_limit.to_string()),
        ("preAllocSize", c.pre_alloc_size.to_string()),
        ("snapCount", c.snap_count.to_string()),
        ("commitLogCount", c.commit_log_count.to_string()),
        ("snapSizeLimitInKb", c.snap_size_limit_in_kb.to_string()),
        ("maxCnxns", c.max_cnxns.to_string()),
        ("maxClientCnxns", c.max_client_cnxns.to_string()),
        ("minSessionTimeout", c.min_session_timeout.to_string()),
        ("maxSessionTimeout", c.max_session_timeout.to_string()),
        (
            "autopurge.snapRetainCount",
            c.auto_purge_snap_retain_count.to_string(),
        ),
        ("autopurge.purgeInterval", c.auto_purge_purge_interval.to_string()),
        ("quorumListenOnAllIPs", c.quorum_listen_on_all_ips.to_string()),
        (
            "admin.serverPort",
            spec.port(port_names::ADMIN_SERVER).to_string(),
        ),
        ("dynamicConfigFile", "/data/zoo.cfg.dynamic".to_string()),
    ];

    for (key, value) in lines {
        let _ = writeln!(cfg, "{}={}", key, value);
    }
    for (key, value) in &c.additional_config {
        let _ = writeln!(cfg, "{}={}", key, value);
    }

    cfg
}

/// Render env.sh with the DNS names and ports members use to find each other
pub fn generate_env_sh(cluster: &ZookeeperCluster) -> String {
    let name = cluster.name_any();
    let ns = cluster.namespace().unwrap_or_default();
    let spec = &cluster.spec;
    let domain = spec.cluster_domain();

    format!(
        "#!/usr/bin/env bash\n\n\
         DOMAIN={headless}.{ns}.svc.{domain}\n\
         QUORUM_PORT={quorum}\n\
         LEADER_PORT={leader}\n\
         CLIENT_HOST={client}\n\
         CLIENT_PORT={client_port}\n\
         ADMIN_SERVER_HOST={admin}\n\
         ADMIN_SERVER_PORT={admin_port}\n\
         CLUSTER_NAME={name}\n\
         CLUSTER_SIZE={size}\n",
        headless = headless_service_name(&name),
        quorum = spec.port(port_names::QUORUM),
        leader = spec.port(port_names::LEADER_ELECTION),
        client = client_service_name(&name),
        client_port = spec.port(port_names::CLIENT),
        admin = admin_service_name(&name),
        admin_port = spec.port(port_names::ADMIN_SERVER),
        size = spec.replicas,
    )
}
