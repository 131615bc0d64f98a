//! CRD installation on startup
//!
//! The operator installs its own CRDs using server-side apply so the CRD
//! versions always match the operator version. The self-bootstrap path has
//! its own CRD handling (it installs from the baked-in bundle before any
//! schema exists); this is for the normal run path.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use parcel_common::crd::{
    ClusterObjectDeployment, ClusterObjectSet, ClusterPackage, ObjectDeployment, ObjectSet, Package,
};

/// CRD definition with name and resource
struct CrdDef {
    name: &'static str,
    crd: CustomResourceDefinition,
}

fn all_crds() -> Vec<CrdDef> {
    vec![
        CrdDef {
            name: "packages.parcel.dev",
            crd: Package::crd(),
        },
        CrdDef {
            name: "clusterpackages.parcel.dev",
            crd: ClusterPackage::crd(),
        },
        CrdDef {
            name: "objectdeployments.parcel.dev",
            crd: ObjectDeployment::crd(),
        },
        CrdDef {
            name: "clusterobjectdeployments.parcel.dev",
            crd: ClusterObjectDeployment::crd(),
        },
        CrdDef {
            name: "objectsets.parcel.dev",
            crd: ObjectSet::crd(),
        },
        CrdDef {
            name: "clusterobjectsets.parcel.dev",
            crd: ClusterObjectSet::crd(),
        },
    ]
}

/// Ensure all Parcel CRDs are installed using server-side apply
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("parcel-operator").force();

    for def in all_crds() {
        tracing::info!("Installing {} CRD...", def.name);
        crds.patch(def.name, &params, &Patch::Apply(&def.crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", def.name, e))?;
    }

    tracing::info!("All Parcel CRDs installed/updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crd_names_match_their_definitions() {
        for def in all_crds() {
            assert_eq!(def.crd.metadata.name.as_deref(), Some(def.name));
        }
    }
}
