pub mod backup_reconciler;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod error;
pub mod reconciler;
pub mod state_machine;
pub mod status;
pub mod validation;

pub use backup_reconciler::{backup_error_policy, reconcile_backup};
pub use config::OperatorConfig;
pub use context::Context;
pub use error::{BackoffConfig, Error, ErrorContext, Result};
pub use reconciler::{FINALIZER, error_policy, reconcile};
pub use state_machine::{
    TransitionResult, UpgradeContext, UpgradeEvent, UpgradeState, UpgradeStateMachine,
    derive_state, determine_event,
};
pub use status::{ConditionBuilder, StatusManager};
pub use validation::{MAX_REPLICAS, MIN_REPLICAS, validate_spec};
