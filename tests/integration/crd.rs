//! CRD installation helpers for integration tests

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::{Api, Client, CustomResourceExt};
use std::time::Duration;
use thiserror::Error;
use zookeeper_operator::crd::{ZookeeperBackup, ZookeeperCluster};

#[derive(Error, Debug)]
pub enum CrdError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("CRD establishment timeout: {0}")]
    EstablishmentTimeout(String),

    #[error("Wait error: {0}")]
    WaitError(#[from] kube::runtime::wait::Error),
}

/// Install the ZookeeperCluster and ZookeeperBackup CRDs into the cluster
pub async fn install_crds(client: Client) -> Result<(), CrdError> {
    let crds: Api<CustomResourceDefinition> = Api::all(client);

    for crd in [ZookeeperCluster::crd(), ZookeeperBackup::crd()] {
        install_crd(&crds, crd).await?;
    }

    Ok(())
}

async fn install_crd(
    crds: &Api<CustomResourceDefinition>,
    crd: CustomResourceDefinition,
) -> Result<(), CrdError> {
    let name = crd.metadata.name.clone().unwrap_or_default();
    let params = PatchParams::apply("integration-test").force();

    tracing::info!("Installing CRD {}...", name);
    crds.patch(&name, &params, &Patch::Apply(&crd)).await?;

    // Wait for CRD to be established (up to 30 seconds)
    let establish = await_condition(crds.clone(), &name, conditions::is_crd_established());
    tokio::time::timeout(Duration::from_secs(30), establish)
        .await
        .map_err(|_| CrdError::EstablishmentTimeout(name.clone()))??;

    tracing::info!("CRD {} installed and established", name);
    Ok(())
}
