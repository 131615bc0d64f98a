//! Generic package reconciliation loop
//!
//! One reconcile pass: re-fetch the object, short-circuit deleted objects
//! into finalizer teardown, then run the ordered sub-reconciler chain. The
//! chain stops at the first step that asks to stop (optionally requeueing)
//! or errors; status projection runs only when every step continued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use parcel_common::error::kube_not_found;
use parcel_common::{Error, LOADER_JOB_FINALIZER};

use crate::adapters::{DeploymentAccessor, PackageAccessor};
use crate::deployment_status::DeploymentStatusReconciler;
use crate::metrics;
use crate::unpack::{ImagePuller, PackageDeployer, UnpackReconciler};

/// Interval for the periodic full resync of a healthy package
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Field manager used for all patches issued by the engine
pub const FIELD_MANAGER: &str = "parcel-package-controller";

/// Cluster access the engine needs for one package kind
///
/// Mirrors the package/deployment API surface so the reconcile path can be
/// driven against a mock in tests while production wires the real client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageApi<P: PackageAccessor>: Send + Sync {
    /// Fetch a fresh copy of the package; NotFound folds into `None`
    async fn get_package(&self, pkg: &P) -> Result<Option<P>, Error>;

    /// Fetch the package's generated deployment; NotFound folds into `None`
    async fn get_deployment(&self, pkg: &P) -> Result<Option<P::Deployment>, Error>;

    /// Replace the package's finalizer list
    async fn patch_finalizers(&self, pkg: &P, finalizers: &[String]) -> Result<(), Error>;

    /// Persist the package's status subresource
    async fn patch_status(&self, pkg: &P) -> Result<(), Error>;

    /// Server-side apply the generated deployment
    ///
    /// With `force` set, fields held by other managers are claimed; without
    /// it the apply conflicts instead of adopting.
    async fn apply_deployment(
        &self,
        pkg: &P,
        deployment: &P::Deployment,
        force: bool,
    ) -> Result<(), Error>;
}

/// [`PackageApi`] over a real cluster connection
pub struct KubePackageApi {
    client: kube::Client,
}

impl KubePackageApi {
    /// Wrap a kube client
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<P: PackageAccessor> PackageApi<P> for KubePackageApi {
    async fn get_package(&self, pkg: &P) -> Result<Option<P>, Error> {
        let api = P::package_api(self.client.clone(), pkg.namespace().as_deref());
        match api.get(&pkg.name_any()).await {
            Ok(p) => Ok(Some(p)),
            Err(e) if kube_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_deployment(&self, pkg: &P) -> Result<Option<P::Deployment>, Error> {
        let api = P::Deployment::deployment_api(self.client.clone(), pkg.namespace().as_deref());
        match api.get(&pkg.name_any()).await {
            Ok(d) => Ok(Some(d)),
            Err(e) if kube_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_finalizers(&self, pkg: &P, finalizers: &[String]) -> Result<(), Error> {
        let api = P::package_api(self.client.clone(), pkg.namespace().as_deref());
        let patch = serde_json::json!({
            "metadata": { "finalizers": finalizers }
        });
        api.patch(
            &pkg.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn patch_status(&self, pkg: &P) -> Result<(), Error> {
        let api = P::package_api(self.client.clone(), pkg.namespace().as_deref());
        let patch = serde_json::json!({ "status": pkg.status() });
        api.patch_status(
            &pkg.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn apply_deployment(
        &self,
        pkg: &P,
        deployment: &P::Deployment,
        force: bool,
    ) -> Result<(), Error> {
        let api = P::Deployment::deployment_api(self.client.clone(), pkg.namespace().as_deref());
        let mut params = PatchParams::apply(FIELD_MANAGER);
        if force {
            params = params.force();
        }
        api.patch(&deployment.name_any(), &params, &Patch::Apply(deployment))
            .await?;
        Ok(())
    }
}

/// Outcome of one sub-reconciler step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    /// Proceed to the next step in the chain
    Continue,
    /// Stop the chain; requeue after the given delay, or wait for a watch event
    Stop {
        /// Delay before the next reconcile, if any
        requeue_after: Option<Duration>,
    },
}

impl Next {
    /// Stop and wait for the next watch event
    pub fn stop() -> Self {
        Next::Stop {
            requeue_after: None,
        }
    }

    /// Stop and requeue after the given delay
    pub fn requeue(after: Duration) -> Self {
        Next::Stop {
            requeue_after: Some(after),
        }
    }
}

/// One step in the ordered reconciliation chain
#[async_trait]
pub trait SubReconciler<P: PackageAccessor>: Send + Sync {
    /// Run this step against the in-memory object
    ///
    /// Steps see the object state left behind by earlier steps. Mutations are
    /// persisted by the engine's final status projection, except where a step
    /// documents that it patches eagerly.
    async fn reconcile(&self, ctx: &Context<P>, pkg: &mut P) -> Result<Next, Error>;
}

/// Shared context for one package kind's controller
pub struct Context<P: PackageAccessor> {
    /// Cluster access for the engine and its steps
    pub api: Arc<dyn PackageApi<P>>,

    /// During the bootstrap window, pre-existing unowned prerequisites may be
    /// adopted instead of rejected. Threaded explicitly; never ambient state.
    pub force_adoption: bool,

    reconcilers: Vec<Box<dyn SubReconciler<P>>>,
}

impl<P: PackageAccessor> Context<P> {
    /// Build the standard chain: unpack, then deployment status projection
    pub fn new(
        client: kube::Client,
        puller: Arc<dyn ImagePuller>,
        deployer: Arc<dyn PackageDeployer<P>>,
        force_adoption: bool,
    ) -> Self {
        Self {
            api: Arc::new(KubePackageApi::new(client)),
            force_adoption,
            reconcilers: vec![
                Box::new(UnpackReconciler::new(puller, deployer)),
                Box::new(DeploymentStatusReconciler::default()),
            ],
        }
    }

    /// Build a context with an explicit chain and API backend
    pub fn with_chain(
        api: Arc<dyn PackageApi<P>>,
        reconcilers: Vec<Box<dyn SubReconciler<P>>>,
        force_adoption: bool,
    ) -> Self {
        Self {
            api,
            force_adoption,
            reconcilers,
        }
    }
}

/// Reconcile one Package or ClusterPackage
#[instrument(skip(pkg, ctx), fields(package = %pkg.name_any()))]
pub async fn reconcile<P: PackageAccessor>(
    pkg: Arc<P>,
    ctx: Arc<Context<P>>,
) -> Result<Action, Error> {
    // The watch event may be stale; work from a fresh copy.
    let Some(mut pkg) = ctx.api.get_package(pkg.as_ref()).await? else {
        debug!("package already removed");
        return Ok(Action::await_change());
    };

    let action = run_chain(&ctx, &mut pkg).await?;

    // Aggregate metrics observe every reconcile that completed without error.
    metrics::record_package(&pkg);

    info!("reconciled");
    Ok(action)
}

async fn run_chain<P: PackageAccessor>(ctx: &Context<P>, pkg: &mut P) -> Result<Action, Error> {
    // An object in deletion never re-enters the forward chain.
    if pkg.meta().deletion_timestamp.is_some() {
        handle_deletion(ctx, pkg).await?;
        return Ok(Action::await_change());
    }

    for reconciler in &ctx.reconcilers {
        match reconciler.reconcile(ctx, pkg).await? {
            Next::Continue => {}
            Next::Stop { requeue_after } => {
                debug!(?requeue_after, "sub-reconciler stopped the chain");
                return Ok(match requeue_after {
                    Some(after) => Action::requeue(after),
                    None => Action::await_change(),
                });
            }
        }
    }

    update_status(ctx, pkg).await?;
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Finalizer list with the legacy loader-job token removed
///
/// Returns `None` when the token is not present and no update is needed.
fn finalizers_without_loader_job(finalizers: &[String]) -> Option<Vec<String>> {
    if !finalizers.iter().any(|f| f == LOADER_JOB_FINALIZER) {
        return None;
    }
    Some(
        finalizers
            .iter()
            .filter(|f| *f != LOADER_JOB_FINALIZER)
            .cloned()
            .collect(),
    )
}

/// Deletion path: strip the legacy loader-job finalizer so pre-1.0 objects
/// can be reaped, then leave the rest to owner-reference garbage collection.
async fn handle_deletion<P: PackageAccessor>(ctx: &Context<P>, pkg: &mut P) -> Result<(), Error> {
    let Some(remaining) = finalizers_without_loader_job(pkg.finalizers()) else {
        return Ok(());
    };
    info!("removing legacy loader-job finalizer");
    ctx.api.patch_finalizers(pkg, &remaining).await
}

/// Project the aggregate phase from the current conditions and persist it
async fn update_status<P: PackageAccessor>(ctx: &Context<P>, pkg: &mut P) -> Result<(), Error> {
    let status = pkg.status_mut();
    status.phase = status.projected_phase();
    ctx.api.patch_status(pkg).await
}

/// Requeue policy for failed reconciles
///
/// Errors surface here unmodified; the scheduler owns backoff.
pub fn error_policy<P: PackageAccessor>(pkg: Arc<P>, error: &Error, _ctx: Arc<Context<P>>) -> Action {
    error!(
        ?error,
        package = %pkg.name_any(),
        "reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}
