//! Controller runner, builds controller futures for the package kinds
//!
//! Each `build_*` function returns a boxed future the caller composes. This
//! keeps controller construction pure and reusable between the normal run
//! path and the self-bootstrap window.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use parcel_common::bundle::{BundleSource, FolderBundleSource};
use parcel_common::crd::{ClusterObjectDeployment, ClusterPackage, ObjectDeployment, Package};
use parcel_package::controller::{error_policy, reconcile, Context};
use parcel_package::deploy::{BundleSourcePuller, EnsureDeployer};
use parcel_package::MAX_CONCURRENT_RECONCILES;

/// Boxed controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn runner_config() -> ControllerConfig {
    ControllerConfig::default().concurrency(MAX_CONCURRENT_RECONCILES)
}

/// Build the Package and ClusterPackage controller futures
///
/// `force_adoption` is true only for the self-bootstrap window.
pub fn build_package_controllers(client: Client, force_adoption: bool) -> Vec<ControllerFuture> {
    let source: Arc<dyn BundleSource> = Arc::new(FolderBundleSource);
    let puller = Arc::new(BundleSourcePuller::new(source));

    let pkg_ctx = Arc::new(Context::<Package>::new(
        client.clone(),
        puller.clone(),
        Arc::new(EnsureDeployer),
        force_adoption,
    ));
    let cluster_pkg_ctx = Arc::new(Context::<ClusterPackage>::new(
        client.clone(),
        puller,
        Arc::new(EnsureDeployer),
        force_adoption,
    ));

    let packages: Api<Package> = Api::all(client.clone());
    let deployments: Api<ObjectDeployment> = Api::all(client.clone());
    let cluster_packages: Api<ClusterPackage> = Api::all(client.clone());
    let cluster_deployments: Api<ClusterObjectDeployment> = Api::all(client);

    tracing::info!("- Package controller");
    tracing::info!("- ClusterPackage controller");

    let pkg_ctrl = Controller::new(packages, WatcherConfig::default())
        .owns(deployments, WatcherConfig::default())
        .with_config(runner_config())
        .shutdown_on_signal()
        .run(reconcile, error_policy, pkg_ctx)
        .for_each(log_reconcile_result("Package"));

    let cluster_pkg_ctrl = Controller::new(cluster_packages, WatcherConfig::default())
        .owns(cluster_deployments, WatcherConfig::default())
        .with_config(runner_config())
        .shutdown_on_signal()
        .run(reconcile, error_policy, cluster_pkg_ctx)
        .for_each(log_reconcile_result("ClusterPackage"));

    vec![Box::pin(pkg_ctrl), Box::pin(cluster_pkg_ctrl)]
}

/// Run all controllers until the first one completes (shutdown signal)
pub async fn run_controllers(controllers: Vec<ControllerFuture>) {
    futures::future::select_all(controllers).await;
    tracing::info!("controller stopped, shutting down");
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
