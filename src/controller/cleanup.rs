//! Cleanup of per-member data volume claims
//!
//! The StatefulSet creates one `data-<cluster>-<ordinal>` claim per member
//! from its volume claim template. Those claims are not owned by the
//! cluster, so nothing garbage collects them: claims left behind by a
//! scale-down, and all claims once the cluster is deleted, are removed here
//! unless the reclaim policy is `Retain`.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{Api, DeleteParams, ListParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use crate::controller::error::{Result, is_kube_not_found};
use crate::resources::common::cluster_selector;

/// Ordinal of a data claim: the number after its last `-`
pub fn pvc_ordinal(claim_name: &str) -> Option<i32> {
    claim_name
        .rsplit_once('-')
        .and_then(|(_, ordinal)| ordinal.parse().ok())
}

/// A claim is orphaned once its ordinal is outside the ensemble
pub fn is_pvc_orphan(claim_name: &str, replicas: i32) -> bool {
    pvc_ordinal(claim_name).is_some_and(|ordinal| ordinal >= replicas)
}

/// Names of the claims in `claims` that no member uses any more
pub fn orphan_claims(claims: &[PersistentVolumeClaim], replicas: i32) -> Vec<String> {
    claims
        .iter()
        .map(|c| c.name_any())
        .filter(|name| is_pvc_orphan(name, replicas))
        .collect()
}

async fn list_claims(
    client: &Client,
    ns: &str,
    cluster_name: &str,
) -> Result<Vec<PersistentVolumeClaim>> {
    let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), ns);
    let list = api
        .list(&ListParams::default().labels(&cluster_selector(cluster_name)))
        .await?;
    Ok(list.items)
}

async fn delete_claim(api: &Api<PersistentVolumeClaim>, name: &str) -> Result<()> {
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(claim = %name, "Deleted data volume claim");
            Ok(())
        }
        Err(e) if is_kube_not_found(&e) => {
            debug!(claim = %name, "Data volume claim already gone");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete the data claims of members beyond `replicas`.
///
/// Returns the number of claims deleted.
pub async fn delete_orphan_pvcs(
    client: &Client,
    ns: &str,
    cluster_name: &str,
    replicas: i32,
) -> Result<usize> {
    let claims = list_claims(client, ns, cluster_name).await?;
    let orphans = orphan_claims(&claims, replicas);
    if orphans.is_empty() {
        return Ok(0);
    }

    let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), ns);
    for name in &orphans {
        delete_claim(&api, name).await?;
    }
    Ok(orphans.len())
}

/// Delete every data claim of a cluster, regardless of ordinal.
///
/// Returns the number of claims deleted.
pub async fn delete_all_pvcs(client: &Client, ns: &str, cluster_name: &str) -> Result<usize> {
    let claims = list_claims(client, ns, cluster_name).await?;
    let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), ns);
    for claim in &claims {
        delete_claim(&api, &claim.name_any()).await?;
    }
    Ok(claims.len())
}
