//! Unpack step: pull the bundle image and hand contents to the deployer
//!
//! First step of the chain. Skips itself once the Unpacked condition covers
//! the spec's current image. A pull failure is recorded as `Unpacked=False`
//! (patched eagerly, since a stopped chain skips status projection) and the
//! chain stops with a fixed requeue instead of erroring, so a bad image tag
//! does not hammer the scheduler's backoff path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{info, warn};

use parcel_common::bundle::PackageContents;
use parcel_common::crd::{
    is_condition_true, set_condition, Condition, ConditionStatus, CONDITION_UNPACKED,
};
use parcel_common::Error;

use crate::adapters::PackageAccessor;
use crate::controller::{Context, Next, SubReconciler};
use crate::metrics;

/// Requeue delay after a failed image pull
const PULL_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Pulls and parses a bundle image
///
/// The pull mechanics (registry auth, unpacking layers into object trees)
/// live outside the engine; the engine only consumes the parsed contents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImagePuller: Send + Sync {
    /// Pull the bundle at the given image reference
    async fn pull(&self, image: &str) -> Result<PackageContents, Error>;
}

/// Turns parsed bundle contents into the package's generated rollout objects
#[async_trait]
pub trait PackageDeployer<P: PackageAccessor>: Send + Sync {
    /// Create or update the ObjectDeployment for this package
    async fn deploy(
        &self,
        ctx: &Context<P>,
        pkg: &P,
        contents: &PackageContents,
    ) -> Result<(), Error>;
}

/// Sub-reconciler driving the unpack step
pub struct UnpackReconciler<P: PackageAccessor> {
    puller: Arc<dyn ImagePuller>,
    deployer: Arc<dyn PackageDeployer<P>>,
}

impl<P: PackageAccessor> UnpackReconciler<P> {
    /// Build the unpack step from its two collaborators
    pub fn new(puller: Arc<dyn ImagePuller>, deployer: Arc<dyn PackageDeployer<P>>) -> Self {
        Self { puller, deployer }
    }

    fn already_unpacked(pkg: &P) -> bool {
        let Some(status) = pkg.status() else {
            return false;
        };
        status.unpacked_image.as_deref() == Some(pkg.image())
            && is_condition_true(&status.conditions, CONDITION_UNPACKED)
    }
}

#[async_trait]
impl<P: PackageAccessor> SubReconciler<P> for UnpackReconciler<P> {
    async fn reconcile(&self, ctx: &Context<P>, pkg: &mut P) -> Result<Next, Error> {
        if Self::already_unpacked(pkg) {
            return Ok(Next::Continue);
        }

        let image = pkg.image().to_string();
        let first_unpack = pkg
            .status()
            .map_or(true, |s| s.unpacked_image.is_none());
        let started = Instant::now();

        let contents = match self.puller.pull(&image).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(image = %image, error = %e, "bundle image pull failed");
                set_condition(
                    &mut pkg.status_mut().conditions,
                    Condition::new(
                        CONDITION_UNPACKED,
                        ConditionStatus::False,
                        "ImagePullError",
                        e.to_string(),
                    ),
                );
                persist_status(ctx, pkg).await?;
                return Ok(Next::requeue(PULL_RETRY_INTERVAL));
            }
        };

        self.deployer.deploy(ctx, pkg, &contents).await?;

        if first_unpack {
            metrics::record_load_duration(&pkg.name_any(), started.elapsed());
        }

        let status = pkg.status_mut();
        status.unpacked_image = Some(image.clone());
        set_condition(
            &mut status.conditions,
            Condition::new(
                CONDITION_UNPACKED,
                ConditionStatus::True,
                "UnpackSuccess",
                format!("unpacked {image}"),
            ),
        );
        info!(image = %image, "bundle unpacked");

        Ok(Next::Continue)
    }
}

/// Eagerly persist the status after a pull failure
///
/// The engine's projection step will not run for a stopped chain.
async fn persist_status<P: PackageAccessor>(ctx: &Context<P>, pkg: &mut P) -> Result<(), Error> {
    let status = pkg.status_mut();
    status.phase = status.projected_phase();
    ctx.api.patch_status(pkg).await
}
