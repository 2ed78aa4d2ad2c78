//! CRD manifests served by the operator

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt, ResourceExt};

use ridge_common::crd::{App, Feature, PublicDomain, Router};

const FIELD_MANAGER: &str = "ridge-operator";

/// Every CRD owned by Ridge
pub fn all() -> Vec<CustomResourceDefinition> {
    vec![App::crd(), Router::crd(), PublicDomain::crd(), Feature::crd()]
}

/// All CRDs as a multi-document YAML stream
pub fn to_yaml() -> anyhow::Result<String> {
    let docs = all()
        .iter()
        .map(|crd| {
            serde_yaml::to_string(crd)
                .map_err(|e| anyhow::anyhow!("failed to serialize CRD {}: {}", crd.name_any(), e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(docs.join("---\n"))
}

/// Install or update all CRDs using server-side apply
pub async fn ensure_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in all() {
        let name = crd.name_any();
        tracing::info!(crd = %name, "installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("all Ridge CRDs installed/updated");
    Ok(())
}
