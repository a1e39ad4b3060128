//! Finite state machine for ZookeeperCluster upgrades
//!
//! The upgrade state is not stored as a field; it is derived from the
//! `Upgrading` and `Error` conditions so that status alone is the source of
//! truth. Each reconcile pass derives the current state, picks at most one
//! event from the observed rollout, checks the transition table and guards,
//! and applies the transition's side effects to the status.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::StatefulSet;

use crate::controller::status::{
    ConditionBuilder, condition, is_condition_true, parse_condition_time, reasons,
};
use crate::crd::{ConditionType, ZookeeperCluster, ZookeeperClusterStatus};

/// Upgrade lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpgradeState {
    /// Ensemble runs a single recorded version
    Stable,
    /// A rolling upgrade to `targetVersion` is in progress
    Upgrading,
    /// The rollout made no progress within the deadline
    UpgradeFailed,
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeState::Stable => write!(f, "Stable"),
            UpgradeState::Upgrading => write!(f, "Upgrading"),
            UpgradeState::UpgradeFailed => write!(f, "UpgradeFailed"),
        }
    }
}

/// Events that trigger upgrade state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpgradeEvent {
    /// First time the cluster is ready with no version recorded
    VersionRecorded,
    /// The image tag differs from the running version
    UpgradeRequested,
    /// More replicas run the new revision than last recorded
    ReplicasUpdated,
    /// No rollout progress within the deadline
    ProgressStalled,
    /// Every replica runs the new revision
    RolloutCompleted,
    /// The upgrade target was cleared or replaced
    UpgradeCancelled,
    /// A failed upgrade was corrected and the ensemble is ready again
    Healed,
}

impl fmt::Display for UpgradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeEvent::VersionRecorded => write!(f, "VersionRecorded"),
            UpgradeEvent::UpgradeRequested => write!(f, "UpgradeRequested"),
            UpgradeEvent::ReplicasUpdated => write!(f, "ReplicasUpdated"),
            UpgradeEvent::ProgressStalled => write!(f, "ProgressStalled"),
            UpgradeEvent::RolloutCompleted => write!(f, "RolloutCompleted"),
            UpgradeEvent::UpgradeCancelled => write!(f, "UpgradeCancelled"),
            UpgradeEvent::Healed => write!(f, "Healed"),
        }
    }
}

/// Rollout progress reported by the StatefulSet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutStatus {
    pub generation: Option<i64>,
    pub observed_generation: Option<i64>,
    pub current_revision: Option<String>,
    pub update_revision: Option<String>,
    pub updated_replicas: i32,
}

impl RolloutStatus {
    /// Read rollout progress from an observed StatefulSet
    pub fn from_statefulset(sts: &StatefulSet) -> Self {
        let status = sts.status.as_ref();
        Self {
            generation: sts.metadata.generation,
            observed_generation: status.and_then(|s| s.observed_generation),
            current_revision: status.and_then(|s| s.current_revision.clone()),
            update_revision: status.and_then(|s| s.update_revision.clone()),
            updated_replicas: status.and_then(|s| s.updated_replicas).unwrap_or(0),
        }
    }

    /// The controller has seen the latest spec and every replica runs the
    /// update revision
    pub fn is_complete(&self, desired_replicas: i32) -> bool {
        let observed_latest = match (self.observed_generation, self.generation) {
            (Some(observed), Some(generation)) => observed >= generation,
            _ => false,
        };
        observed_latest
            && self.current_revision.is_some()
            && self.current_revision == self.update_revision
            && self.updated_replicas == desired_replicas
    }
}

/// Inputs available when evaluating upgrade transitions
#[derive(Debug, Clone)]
pub struct UpgradeContext {
    /// `spec.image.tag`
    pub desired_version: String,
    /// `status.currentVersion`
    pub current_version: String,
    /// `status.targetVersion`
    pub target_version: String,
    /// `spec.replicas`
    pub desired_replicas: i32,
    /// Ready replicas reported by the StatefulSet
    pub ready_replicas: i32,
    pub rollout: RolloutStatus,
    /// Updated replica count recorded in the `Upgrading` condition message
    pub recorded_progress: i32,
    /// When progress was last recorded (`Upgrading` lastUpdateTime)
    pub progress_since: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    pub deadline: Duration,
}

impl UpgradeContext {
    /// Gather the context from a cluster, its status as computed so far and
    /// the observed StatefulSet
    pub fn new(
        cluster: &ZookeeperCluster,
        status: &ZookeeperClusterStatus,
        rollout: RolloutStatus,
        now: DateTime<Utc>,
        deadline: Duration,
    ) -> Self {
        let upgrading = condition(status, ConditionType::Upgrading);
        Self {
            desired_version: cluster.spec.image.tag.clone(),
            current_version: status.current_version.clone(),
            target_version: status.target_version.clone(),
            desired_replicas: cluster.spec.replicas,
            ready_replicas: status.ready_replicas,
            rollout,
            recorded_progress: upgrading
                .and_then(|c| c.message.trim().parse().ok())
                .unwrap_or(0),
            progress_since: upgrading.and_then(|c| parse_condition_time(&c.last_update_time)),
            now,
            deadline,
        }
    }

    /// Every desired replica is ready
    pub fn all_replicas_ready(&self) -> bool {
        self.ready_replicas == self.desired_replicas
    }

    /// The rollout to the target version finished
    pub fn rollout_complete(&self) -> bool {
        self.rollout.is_complete(self.desired_replicas)
    }

    /// Progress has not moved for longer than the deadline
    pub fn is_stalled(&self) -> bool {
        let Some(since) = self.progress_since else {
            return false;
        };
        let Ok(deadline) = chrono::Duration::from_std(self.deadline) else {
            return false;
        };
        self.now.signed_duration_since(since) > deadline
    }

    /// The current upgrade target no longer matches what was requested
    pub fn target_abandoned(&self) -> bool {
        self.target_version.is_empty() || self.desired_version != self.target_version
    }

    /// A failed upgrade was rolled back or finished on its own
    pub fn can_heal(&self) -> bool {
        self.all_replicas_ready()
            && (self.desired_version == self.current_version
                || (self.desired_version == self.target_version && self.rollout_complete()))
    }
}

/// Derive the upgrade state from status conditions
pub fn derive_state(status: &ZookeeperClusterStatus) -> UpgradeState {
    let failed = is_condition_true(status, ConditionType::Error)
        && condition(status, ConditionType::Error).is_some_and(|c| c.reason == reasons::UPGRADE_FAILED);
    if failed {
        UpgradeState::UpgradeFailed
    } else if is_condition_true(status, ConditionType::Upgrading) {
        UpgradeState::Upgrading
    } else {
        UpgradeState::Stable
    }
}

/// A state transition definition
#[derive(Debug)]
pub struct Transition {
    pub from: UpgradeState,
    pub to: UpgradeState,
    pub event: UpgradeEvent,
    /// Human-readable description of this transition
    pub description: &'static str,
}

impl Transition {
    const fn new(
        from: UpgradeState,
        to: UpgradeState,
        event: UpgradeEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a state transition
#[derive(Debug, PartialEq)]
pub enum TransitionResult {
    /// Transition was successful
    Success {
        from: UpgradeState,
        to: UpgradeState,
        event: UpgradeEvent,
        description: &'static str,
    },
    /// Transition was not valid for current state
    InvalidTransition {
        current: UpgradeState,
        event: UpgradeEvent,
    },
    /// Guard condition prevented the transition
    GuardFailed {
        from: UpgradeState,
        to: UpgradeState,
        event: UpgradeEvent,
        reason: String,
    },
}

/// Transition table of the upgrade lifecycle
pub struct UpgradeStateMachine {
    transitions: Vec<Transition>,
}

impl Default for UpgradeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeStateMachine {
    pub fn new() -> Self {
        Self {
            transitions: vec![
                // === Stable ===
                Transition::new(
                    UpgradeState::Stable,
                    UpgradeState::Stable,
                    UpgradeEvent::VersionRecorded,
                    "Recording the running version",
                ),
                Transition::new(
                    UpgradeState::Stable,
                    UpgradeState::Upgrading,
                    UpgradeEvent::UpgradeRequested,
                    "Image tag changed, starting rolling upgrade",
                ),
                // === Upgrading ===
                Transition::new(
                    UpgradeState::Upgrading,
                    UpgradeState::Upgrading,
                    UpgradeEvent::ReplicasUpdated,
                    "More replicas updated",
                ),
                Transition::new(
                    UpgradeState::Upgrading,
                    UpgradeState::UpgradeFailed,
                    UpgradeEvent::ProgressStalled,
                    "Upgrade made no progress within the deadline",
                ),
                Transition::new(
                    UpgradeState::Upgrading,
                    UpgradeState::Stable,
                    UpgradeEvent::RolloutCompleted,
                    "All replicas run the target version",
                ),
                Transition::new(
                    UpgradeState::Upgrading,
                    UpgradeState::Stable,
                    UpgradeEvent::UpgradeCancelled,
                    "Upgrade target changed, abandoning upgrade",
                ),
                // === UpgradeFailed ===
                Transition::new(
                    UpgradeState::UpgradeFailed,
                    UpgradeState::Stable,
                    UpgradeEvent::Healed,
                    "Failed upgrade corrected, cluster is ready",
                ),
            ],
        }
    }

    /// Attempt to transition to a new state based on an event
    pub fn transition(
        &self,
        current: UpgradeState,
        event: UpgradeEvent,
        ctx: &UpgradeContext,
    ) -> TransitionResult {
        let transition = self
            .transitions
            .iter()
            .find(|t| t.from == current && t.event == event);

        match transition {
            Some(t) => {
                if let Some(reason) = self.check_guard(t, ctx) {
                    TransitionResult::GuardFailed {
                        from: t.from,
                        to: t.to,
                        event,
                        reason,
                    }
                } else {
                    TransitionResult::Success {
                        from: t.from,
                        to: t.to,
                        event,
                        description: t.description,
                    }
                }
            }
            None => TransitionResult::InvalidTransition { current, event },
        }
    }

    /// Check if a transition is valid (ignoring guards)
    pub fn can_transition(&self, from: UpgradeState, event: UpgradeEvent) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.event == event)
    }

    /// Get all valid events for a given state
    pub fn valid_events(&self, state: UpgradeState) -> Vec<UpgradeEvent> {
        self.transitions
            .iter()
            .filter(|t| t.from == state)
            .map(|t| t.event)
            .collect()
    }

    fn check_guard(&self, transition: &Transition, ctx: &UpgradeContext) -> Option<String> {
        match transition.event {
            UpgradeEvent::VersionRecorded => {
                if !ctx.current_version.is_empty() {
                    Some(format!("Version {} already recorded", ctx.current_version))
                } else if !ctx.all_replicas_ready() {
                    Some(format!(
                        "Not all replicas ready: {}/{}",
                        ctx.ready_replicas, ctx.desired_replicas
                    ))
                } else {
                    None
                }
            }
            UpgradeEvent::UpgradeRequested => {
                if ctx.current_version.is_empty() {
                    Some("No running version recorded yet".to_string())
                } else if ctx.desired_version == ctx.current_version {
                    Some(format!("Already running {}", ctx.current_version))
                } else {
                    None
                }
            }
            UpgradeEvent::ReplicasUpdated => {
                if ctx.rollout.updated_replicas <= ctx.recorded_progress {
                    Some(format!(
                        "No new replicas updated: {} recorded, {} observed",
                        ctx.recorded_progress, ctx.rollout.updated_replicas
                    ))
                } else {
                    None
                }
            }
            UpgradeEvent::ProgressStalled => {
                if !ctx.is_stalled() {
                    Some(format!(
                        "Progress deadline of {}s not exceeded",
                        ctx.deadline.as_secs()
                    ))
                } else {
                    None
                }
            }
            UpgradeEvent::RolloutCompleted => {
                if !ctx.rollout_complete() {
                    Some(format!(
                        "Rollout incomplete: {}/{} replicas updated",
                        ctx.rollout.updated_replicas, ctx.desired_replicas
                    ))
                } else {
                    None
                }
            }
            UpgradeEvent::UpgradeCancelled => {
                if !ctx.target_abandoned() {
                    Some(format!("Upgrade to {} still requested", ctx.target_version))
                } else {
                    None
                }
            }
            UpgradeEvent::Healed => {
                if !ctx.can_heal() {
                    Some(format!(
                        "Cluster not healed: {}/{} replicas ready, desired {}, current {}",
                        ctx.ready_replicas,
                        ctx.desired_replicas,
                        ctx.desired_version,
                        ctx.current_version
                    ))
                } else {
                    None
                }
            }
        }
    }
}

/// Pick the event the observed state calls for, if any
pub fn determine_event(state: UpgradeState, ctx: &UpgradeContext) -> Option<UpgradeEvent> {
    match state {
        UpgradeState::Stable => {
            if ctx.current_version.is_empty() {
                ctx.all_replicas_ready().then_some(UpgradeEvent::VersionRecorded)
            } else if ctx.desired_version != ctx.current_version {
                Some(UpgradeEvent::UpgradeRequested)
            } else {
                None
            }
        }
        UpgradeState::Upgrading => {
            if ctx.target_abandoned() {
                Some(UpgradeEvent::UpgradeCancelled)
            } else if ctx.rollout_complete() {
                Some(UpgradeEvent::RolloutCompleted)
            } else if ctx.rollout.updated_replicas > ctx.recorded_progress {
                Some(UpgradeEvent::ReplicasUpdated)
            } else if ctx.is_stalled() {
                Some(UpgradeEvent::ProgressStalled)
            } else {
                None
            }
        }
        UpgradeState::UpgradeFailed => ctx.can_heal().then_some(UpgradeEvent::Healed),
    }
}

/// Apply the side effects of a successful transition to the status
pub fn apply_event(status: &mut ZookeeperClusterStatus, event: UpgradeEvent, ctx: &UpgradeContext) {
    let conditions =
        ConditionBuilder::from_existing(std::mem::take(&mut status.conditions), ctx.now).init();

    let conditions = match event {
        UpgradeEvent::VersionRecorded => {
            status.current_version = ctx.desired_version.clone();
            conditions
        }
        UpgradeEvent::UpgradeRequested => {
            status.target_version = ctx.desired_version.clone();
            conditions.upgrading(true, reasons::UPDATING_ZOOKEEPER, "0")
        }
        UpgradeEvent::ReplicasUpdated => conditions.upgrading(
            true,
            reasons::UPDATING_ZOOKEEPER,
            &ctx.rollout.updated_replicas.to_string(),
        ),
        UpgradeEvent::ProgressStalled => conditions.error(
            true,
            reasons::UPGRADE_FAILED,
            &ctx.recorded_progress.to_string(),
        ),
        UpgradeEvent::RolloutCompleted => {
            status.current_version = std::mem::take(&mut status.target_version);
            conditions.upgrading(false, reasons::UPGRADE_COMPLETED, "")
        }
        UpgradeEvent::UpgradeCancelled => {
            status.target_version.clear();
            conditions.upgrading(false, reasons::UPGRADE_CANCELLED, "")
        }
        UpgradeEvent::Healed => {
            status.current_version = ctx.desired_version.clone();
            status.target_version.clear();
            conditions
                .upgrading(false, reasons::UPGRADE_HEALED, "")
                .error(false, reasons::UPGRADE_HEALED, "")
        }
    };

    status.conditions = conditions.build();
}

/// Run one step of the machine against `status`.
///
/// Returns the attempted transition, or `None` when the observed state calls
/// for no event. Side effects are applied only on success.
pub fn evaluate(
    machine: &UpgradeStateMachine,
    status: &mut ZookeeperClusterStatus,
    ctx: &UpgradeContext,
) -> Option<TransitionResult> {
    let state = derive_state(status);
    let event = determine_event(state, ctx)?;
    let result = machine.transition(state, event, ctx);
    if let TransitionResult::Success { event, .. } = &result {
        apply_event(status, *event, ctx);
    }
    Some(result)
}
