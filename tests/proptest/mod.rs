// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for ZookeeperCluster defaults, validation, resource
//! generation and the upgrade state machine
//!
//! These tests use proptest to generate random configurations and verify that:
//! 1. Defaulting is idempotent and never overrides user values
//! 2. Valid specs always generate consistent resources without panicking
//! 3. Orphaned data claims are exactly those beyond the ensemble size
//! 4. Conditions always hold one entry per type
//! 5. The upgrade state machine only ever picks events its table allows

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use chrono::DateTime;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::core::ObjectMeta;
use proptest::prelude::*;

use common::*;
use zookeeper_operator::controller::cleanup::{is_pvc_orphan, orphan_claims, pvc_ordinal};
use zookeeper_operator::controller::state_machine::{
    RolloutStatus, TransitionResult, UpgradeContext, UpgradeStateMachine, derive_state,
    determine_event, evaluate,
};
use zookeeper_operator::controller::status::ConditionBuilder;
use zookeeper_operator::controller::validation::{MAX_REPLICAS, MIN_REPLICAS, validate_replicas};
use zookeeper_operator::crd::{ConditionType, ZookeeperClusterSpec, ZookeeperClusterStatus};
use zookeeper_operator::resources::common::data_claim_name_for_ordinal;
use zookeeper_operator::resources::{config_map, pdb, service, statefulset};
use zookeeper_operator::zookeeper::admin::short_hostname;

// =============================================================================
// Strategies
// =============================================================================

fn cluster_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,20}[a-z0-9]"
}

fn version() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("0.2.15".to_string()),
        Just("0.2.16".to_string()),
        Just("0.2.17".to_string()),
    ]
}

fn condition_type() -> impl Strategy<Value = ConditionType> {
    prop_oneof![
        Just(ConditionType::PodsReady),
        Just(ConditionType::Upgrading),
        Just(ConditionType::Error),
    ]
}

fn claim(name: String) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name),
            ..Default::default()
        },
        ..Default::default()
    }
}

// =============================================================================
// Defaulting and validation
// =============================================================================

proptest! {
    #[test]
    fn defaults_are_idempotent(replicas in 0i32..10, tick in 0i32..5000) {
        let mut spec = ZookeeperClusterSpec {
            replicas,
            ..Default::default()
        };
        spec.config.tick_time = tick;

        spec.with_defaults();
        let once = spec.clone();
        prop_assert!(!spec.with_defaults());
        prop_assert_eq!(spec, once);
    }

    #[test]
    fn defaults_keep_user_replicas(replicas in 1i32..10) {
        let mut spec = ZookeeperClusterSpec {
            replicas,
            ..Default::default()
        };
        spec.with_defaults();
        prop_assert_eq!(spec.replicas, replicas);
        prop_assert_eq!(spec.ports.len(), 5);
    }

    #[test]
    fn replica_validation_matches_range(replicas in -5i32..20) {
        let valid = (MIN_REPLICAS..=MAX_REPLICAS).contains(&replicas);
        prop_assert_eq!(validate_replicas(replicas).is_ok(), valid);
    }
}

// =============================================================================
// Resource generation
// =============================================================================

proptest! {
    #[test]
    fn generated_resources_are_consistent(
        name in cluster_name(),
        replicas in MIN_REPLICAS..=MAX_REPLICAS,
    ) {
        let cluster = create_test_cluster(&name, "default", replicas);

        let sts = statefulset::generate_statefulset(&cluster);
        let spec = sts.spec.unwrap();
        prop_assert_eq!(spec.replicas, Some(replicas));
        prop_assert_eq!(spec.service_name, Some(format!("{}-headless", name)));

        let env = config_map::generate_env_sh(&cluster);
        let expected_size = format!("CLUSTER_SIZE={}\n", replicas);
        prop_assert!(env.contains(&expected_size));

        let selector = pdb::generate_pdb(&cluster).spec.unwrap().selector.unwrap();
        prop_assert_eq!(
            selector.match_labels,
            spec.selector.match_labels
        );

        for svc in [
            service::generate_client_service(&cluster),
            service::generate_headless_service(&cluster),
            service::generate_admin_service(&cluster),
        ] {
            let owners = svc.metadata.owner_references.unwrap();
            prop_assert_eq!(owners.len(), 1);
            prop_assert_eq!(&owners[0].name, &name);
        }
    }
}

// =============================================================================
// Orphaned data claims
// =============================================================================

proptest! {
    #[test]
    fn orphans_are_exactly_claims_beyond_size(
        name in cluster_name(),
        existing in 0i32..10,
        replicas in 1i32..8,
    ) {
        let claims: Vec<_> = (0..existing)
            .map(|i| claim(data_claim_name_for_ordinal(&name, i)))
            .collect();
        let orphans = orphan_claims(&claims, replicas);

        prop_assert_eq!(orphans.len() as i32, (existing - replicas).max(0));
        for orphan in &orphans {
            prop_assert!(pvc_ordinal(orphan).unwrap() >= replicas);
        }
    }

    #[test]
    fn claims_without_ordinal_are_never_orphans(suffix in "[a-z]{1,8}", replicas in 0i32..8) {
        let claim_name = format!("data-zk-{}", suffix);
        prop_assert!(!is_pvc_orphan(&claim_name, replicas));
    }
}

// =============================================================================
// Conditions and upgrade machine
// =============================================================================

proptest! {
    #[test]
    fn init_yields_one_condition_per_type(
        updates in prop::collection::vec((condition_type(), any::<bool>(), "[A-Za-z]{0,10}"), 0..12),
    ) {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut builder = ConditionBuilder::new(now);
        for (type_, value, reason) in &updates {
            builder = builder.set_condition(*type_, (*value).into(), reason, "");
        }
        let conditions = builder.init().build();

        prop_assert_eq!(conditions.len(), ConditionType::ALL.len());
        for type_ in ConditionType::ALL {
            prop_assert_eq!(conditions.iter().filter(|c| c.type_ == type_).count(), 1);
        }
    }

    #[test]
    fn machine_only_picks_allowed_events(
        desired in version(),
        current in prop_oneof![Just(String::new()), version()],
        target in prop_oneof![Just(String::new()), version()],
        ready in 0i32..4,
        updated in 0i32..4,
        recorded in 0i32..4,
        upgrading in any::<bool>(),
        failed in any::<bool>(),
        elapsed in 0i64..2000,
    ) {
        let now = DateTime::from_timestamp(1_700_000_000 + elapsed, 0).unwrap();
        let since = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let mut conditions = ConditionBuilder::new(since).init();
        if upgrading {
            conditions = conditions.upgrading(true, "UpdatingZookeeper", &recorded.to_string());
        }
        if failed {
            conditions = conditions.error(true, "UpgradeFailed", &recorded.to_string());
        }
        let mut status = ZookeeperClusterStatus {
            replicas: 3,
            ready_replicas: ready,
            current_version: current,
            target_version: target,
            conditions: conditions.build(),
            ..Default::default()
        };

        let cluster = ZookeeperClusterBuilder::new("zk", "default")
            .with_replicas(3)
            .with_version(&desired)
            .build();
        let rollout = RolloutStatus::from_statefulset(&observed_statefulset(
            3,
            ready,
            updated,
            "rev-a",
            if updated == 3 { "rev-a" } else { "rev-b" },
        ));
        let ctx = UpgradeContext::new(&cluster, &status, rollout, now, Duration::from_secs(600));

        let machine = UpgradeStateMachine::new();
        let state = derive_state(&status);
        if let Some(event) = determine_event(state, &ctx) {
            prop_assert!(machine.can_transition(state, event));
        }

        // Events picked from the observed state always pass their guards
        if let Some(result) = evaluate(&machine, &mut status, &ctx) {
            let succeeded = matches!(result, TransitionResult::Success { .. });
            prop_assert!(succeeded, "{:?}", result);
        }
        prop_assert_eq!(status.conditions.len(), 3);
    }

    #[test]
    fn short_hostname_is_first_label(host in "[a-z0-9-]{1,12}", domain in "(\\.[a-z0-9-]{1,8}){0,4}") {
        let address = format!("{}{}", host, domain);
        prop_assert_eq!(short_hostname(&address), host.as_str());
    }
}
