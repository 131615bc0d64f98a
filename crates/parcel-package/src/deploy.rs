//! Default collaborators for the unpack step
//!
//! [`BundleSourcePuller`] adapts any [`BundleSource`] (the folder loader, or
//! a registry puller provided by the deployment) to the engine's
//! [`ImagePuller`] seam. [`EnsureDeployer`] materialises the parsed contents
//! as the package's generated ObjectDeployment; revision fan-out from there
//! is the deployment controller's job, not the package engine's.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use tracing::info;

use parcel_common::bundle::{BundleSource, PackageContents};
use parcel_common::crd::ObjectSetTemplateSpec;
use parcel_common::{Error, INSTANCE_LABEL_KEY, PACKAGE_LABEL_KEY};

use crate::adapters::{package_owner_ref, DeploymentAccessor, PackageAccessor};
use crate::controller::Context;
use crate::unpack::{ImagePuller, PackageDeployer};

/// [`ImagePuller`] backed by a [`BundleSource`]
pub struct BundleSourcePuller {
    source: Arc<dyn BundleSource>,
}

impl BundleSourcePuller {
    /// Adapt a bundle source to the puller seam
    pub fn new(source: Arc<dyn BundleSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ImagePuller for BundleSourcePuller {
    async fn pull(&self, image: &str) -> Result<PackageContents, Error> {
        self.source.load(image).await
    }
}

/// Default [`PackageDeployer`]: server-side apply of the ObjectDeployment
#[derive(Default)]
pub struct EnsureDeployer;

/// Instance labels stamped on every object generated for a package
pub fn instance_labels(package_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (INSTANCE_LABEL_KEY.to_string(), package_name.to_string()),
        (PACKAGE_LABEL_KEY.to_string(), package_name.to_string()),
    ])
}

#[async_trait]
impl<P: PackageAccessor> PackageDeployer<P> for EnsureDeployer {
    async fn deploy(
        &self,
        ctx: &Context<P>,
        pkg: &P,
        contents: &PackageContents,
    ) -> Result<(), Error> {
        let name = pkg.name_any();
        let owner = package_owner_ref(pkg).ok_or_else(|| {
            Error::internal("deployer", format!("package {name} has no uid yet"))
        })?;

        let meta = ObjectMeta {
            name: Some(name.clone()),
            namespace: pkg.meta().namespace.clone(),
            labels: Some(instance_labels(&name)),
            owner_references: Some(vec![owner]),
            ..Default::default()
        };
        let template = ObjectSetTemplateSpec {
            phases: contents.phases.clone(),
        };
        let deployment = P::Deployment::build(meta, template);

        // Forced field claims are scoped to the bootstrap window; a normal
        // run must conflict on objects some other manager already owns.
        ctx.api
            .apply_deployment(pkg, &deployment, ctx.force_adoption)
            .await?;
        info!(deployment = %name, forced = ctx.force_adoption, "object deployment applied");
        Ok(())
    }
}
