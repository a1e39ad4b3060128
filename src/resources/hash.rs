//! Deterministic content hashing for drift detection
//!
//! Every rendered child carries the hash of its desired payload in the
//! `last-applied-hash` annotation. Comparing hashes lets a reconcile pass
//! skip writes for children that have not changed.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::resources::common::LAST_APPLIED_HASH_ANNOTATION;

/// Compute the SHA-256 hex digest of a value's JSON encoding.
///
/// k8s-openapi types serialize fields in declaration order and maps as
/// `BTreeMap`s, so equal values always produce equal hashes.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Read the last-applied hash annotation from object metadata
pub fn last_applied_hash(meta: &kube::core::ObjectMeta) -> Option<&str> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(LAST_APPLIED_HASH_ANNOTATION))
        .map(String::as_str)
}

/// Store a hash in the last-applied annotation
pub fn set_last_applied_hash(meta: &mut kube::core::ObjectMeta, hash: String) {
    meta.annotations
        .get_or_insert_with(Default::default)
        .insert(LAST_APPLIED_HASH_ANNOTATION.to_string(), hash);
}
