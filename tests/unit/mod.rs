// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for the ZooKeeper Operator
//!
//! This module contains unit tests for:
//! - Resource generators (StatefulSet, Services, ConfigMap, PDB, backup CronJob)
//! - Child resource drift detection
//! - Validation logic
//! - Status conditions and member aggregation
//! - Upgrade state machine scenarios
//! - Cluster metadata znodes and backup placement
//! - Operator configuration and error handling
//! - Whole reconcile passes against an in-memory API server

#[path = "../common/mod.rs"]
mod common;

mod metadata;
mod resources;
mod validation;
