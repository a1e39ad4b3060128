pub mod backup;
pub mod common;
pub mod config_map;
pub mod hash;
pub mod pdb;
pub mod service;
pub mod service_account;
pub mod statefulset;
pub mod sync;

pub use common::{FIELD_MANAGER, owner_reference, standard_labels};
pub use sync::{ChildResource, synchronize, with_desired_hash};
