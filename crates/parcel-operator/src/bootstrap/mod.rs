//! Self-bootstrap state machine
//!
//! Parcel manages its own installation as a ClusterPackage, which creates a
//! chicken-and-egg problem at first start: nothing exists yet to reconcile
//! that package. The bootstrapper resolves it by probing the cluster for a
//! prior install, repairing or tearing down what it finds, and if needed
//! running the manager itself under a bounded window until the self package
//! converges to Available.

pub mod client;
pub mod nuke;
pub mod repair;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use tracing::{debug, info};

use parcel_common::bundle::{crds_from_phases, BundleSource};
use parcel_common::crd::{
    is_condition_true, ClusterPackage, ClusterPackageSpec, CONDITION_AVAILABLE,
};
use parcel_common::{Error, Result, SELF_BUNDLE_PATH, SELF_PACKAGE_NAME};

use self::client::BootstrapClient;

/// How often the convergence poller checks the self package
pub const PACKAGE_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Decide whether a self-bootstrap run is required at all
///
/// The probe goes against the backing workload, not the package: a package
/// object can linger while the workload behind it is long gone. Bootstrap is
/// needed until the Deployment exists and has reported Available=True at
/// least once.
pub fn needs_bootstrap(deployment: Option<&Deployment>) -> bool {
    let Some(deployment) = deployment else {
        return true;
    };
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        });
    !available
}

/// Drives the self-bootstrap state machine once at process start
pub struct Bootstrapper {
    client: Arc<dyn BootstrapClient>,
    bundle_source: Arc<dyn BundleSource>,
    image: String,
    config: Option<serde_json::Value>,
}

impl Bootstrapper {
    /// Build a bootstrapper installing `image` with an optional config blob
    pub fn new(
        client: Arc<dyn BootstrapClient>,
        bundle_source: Arc<dyn BundleSource>,
        image: impl Into<String>,
        config: Option<serde_json::Value>,
    ) -> Self {
        Self {
            client,
            bundle_source,
            image: image.into(),
            config,
        }
    }

    /// Run the state machine to completion
    ///
    /// `run_manager` starts the full controller manager; its argument is the
    /// force-adoption flag, set only for the bootstrap window. The future it
    /// returns is dropped once the self package converges.
    pub async fn bootstrap<F, Fut>(&self, run_manager: F) -> Result<()>
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        info!("running self-bootstrap");

        let Some(_existing) = self.client.get_self_package().await? else {
            info!("no prior install found, self-installing");
            return self.self_install(run_manager).await;
        };

        let deployment = self.client.get_operator_deployment().await?;
        if !needs_bootstrap(deployment.as_ref()) {
            info!("already installed and healthy, handing rollout to the in-cluster operator");
            repair::fix_missing_revision_numbers(self.client.as_ref()).await?;
            return self.update_self_package().await;
        }

        if nuke::needs_forced_cleanup(deployment.as_ref()) {
            nuke::forced_cleanup(self.client.as_ref()).await?;
        }
        self.self_install(run_manager).await
    }

    /// Install from scratch: CRDs first, then the self package, then run the
    /// manager with adoption forced until the package reports Available
    async fn self_install<F, Fut>(&self, run_manager: F) -> Result<()>
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let contents = self.bundle_source.load(SELF_BUNDLE_PATH).await?;

        // The manager cannot start without its own schema.
        for crd in crds_from_phases(&contents.phases) {
            let name = crd["metadata"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let created = self.client.create_crd(crd).await?;
            info!(crd = %name, created, "ensured CRD");
        }

        self.create_self_package().await?;
        self.run_until_available(run_manager).await
    }

    async fn create_self_package(&self) -> Result<()> {
        let pkg = ClusterPackage::new(
            SELF_PACKAGE_NAME,
            ClusterPackageSpec {
                image: self.image.clone(),
                config: self.config.clone(),
            },
        );
        match self.client.create_self_package(&pkg).await {
            Ok(()) => Ok(()),
            // a racing second bootstrap run got there first, fine
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Point the existing self package at this binary's image and config;
    /// the running instance rolls itself forward from there
    async fn update_self_package(&self) -> Result<()> {
        let mut spec = serde_json::json!({ "image": self.image });
        if let Some(config) = &self.config {
            spec["config"] = config.clone();
        }
        self.client.patch_self_package_spec(spec).await
    }

    async fn run_until_available<F, Fut>(&self, run_manager: F) -> Result<()>
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        tokio::select! {
            converged = self.wait_for_self_package_available() => {
                converged?;
                info!("self-bootstrap converged, package is available");
                Ok(())
            }
            result = run_manager(true) => {
                result?;
                Err(Error::bootstrap(
                    "self-install",
                    "manager exited before the self package became available",
                ))
            }
        }
    }

    /// Poll the self package until Available=True; first check is immediate
    async fn wait_for_self_package_available(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(PACKAGE_CHECK_INTERVAL);
        loop {
            ticker.tick().await;
            match self.client.get_self_package().await? {
                Some(pkg) if package_available(&pkg) => return Ok(()),
                Some(_) => debug!("self package not yet available"),
                None => debug!("self package not yet visible"),
            }
        }
    }
}

fn package_available(pkg: &ClusterPackage) -> bool {
    pkg.status
        .as_ref()
        .is_some_and(|s| is_condition_true(&s.conditions, CONDITION_AVAILABLE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentStatus};
    use parcel_common::bundle::{BundleManifest, PackageContents};
    use parcel_common::crd::{Condition, ConditionStatus, ObjectSetTemplatePhase, PackageStatus};

    use crate::bootstrap::client::MockBootstrapClient;

    fn available_self_package() -> ClusterPackage {
        let mut pkg = ClusterPackage::new(
            SELF_PACKAGE_NAME,
            ClusterPackageSpec {
                image: "quay.io/parcel/parcel:v1".to_string(),
                config: None,
            },
        );
        pkg.status = Some(PackageStatus {
            conditions: vec![Condition::new(
                CONDITION_AVAILABLE,
                ConditionStatus::True,
                "Available",
                "rollout succeeded",
            )],
            ..Default::default()
        });
        pkg
    }

    fn pending_self_package() -> ClusterPackage {
        ClusterPackage::new(
            SELF_PACKAGE_NAME,
            ClusterPackageSpec {
                image: "quay.io/parcel/parcel:v1".to_string(),
                config: None,
            },
        )
    }

    fn deployment_with_available(status: &str) -> Deployment {
        Deployment {
            status: Some(DeploymentStatus {
                conditions: Some(vec![DeploymentCondition {
                    type_: "Available".to_string(),
                    status: status.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn already_exists_error() -> Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "clusterpackages \"parcel\" already exists".to_string(),
            reason: "AlreadyExists".to_string(),
            code: 409,
        })
        .into()
    }

    struct StubBundleSource;

    #[async_trait::async_trait]
    impl BundleSource for StubBundleSource {
        async fn load(&self, _location: &str) -> Result<PackageContents> {
            Ok(PackageContents {
                manifest: BundleManifest {
                    name: "parcel".to_string(),
                    phases: vec!["crds".to_string()],
                },
                phases: vec![ObjectSetTemplatePhase {
                    name: "crds".to_string(),
                    objects: vec![serde_json::json!({
                        "apiVersion": "apiextensions.k8s.io/v1",
                        "kind": "CustomResourceDefinition",
                        "metadata": { "name": "packages.parcel.dev" },
                    })],
                }],
            })
        }
    }

    fn bootstrapper(client: MockBootstrapClient) -> Bootstrapper {
        Bootstrapper::new(
            Arc::new(client),
            Arc::new(StubBundleSource),
            "quay.io/parcel/parcel:v1",
            None,
        )
    }

    mod needs_bootstrap_probe {
        use super::*;

        #[test]
        fn absent_workload_needs_bootstrap() {
            assert!(needs_bootstrap(None));
        }

        #[test]
        fn workload_without_verdict_needs_bootstrap() {
            let dep = Deployment::default();
            assert!(needs_bootstrap(Some(&dep)));
        }

        #[test]
        fn available_workload_does_not() {
            let dep = deployment_with_available("True");
            assert!(!needs_bootstrap(Some(&dep)));
        }
    }

    mod state_machine {
        use super::*;

        #[tokio::test]
        async fn healthy_install_repairs_and_hands_off() {
            let mut client = MockBootstrapClient::new();
            client
                .expect_get_self_package()
                .times(1)
                .returning(|| Ok(Some(available_self_package())));
            client
                .expect_get_operator_deployment()
                .times(1)
                .returning(|| Ok(Some(deployment_with_available("True"))));
            client
                .expect_list_object_sets()
                .times(1)
                .returning(|| Ok(vec![]));
            client
                .expect_patch_self_package_spec()
                .withf(|spec| spec["image"] == "quay.io/parcel/parcel:v1")
                .times(1)
                .returning(|_| Ok(()));
            // no nuke, no CRD creation, no manager run
            client.expect_delete_owned().times(0);
            client.expect_create_crd().times(0);

            let b = bootstrapper(client);
            b.bootstrap(|_| std::future::ready(Ok(())))
                .await
                .expect("bootstrap");
        }

        #[tokio::test]
        async fn fresh_cluster_self_installs_and_waits_for_convergence() {
            let mut client = MockBootstrapClient::new();
            client
                .expect_get_self_package()
                .times(1)
                .returning(|| Ok(None));
            client
                .expect_create_crd()
                .withf(|crd| crd["metadata"]["name"] == "packages.parcel.dev")
                .times(1)
                .returning(|_| Ok(true));
            client
                .expect_create_self_package()
                .times(1)
                .returning(|_| Ok(()));
            // poller: first tick sees the package available right away
            client
                .expect_get_self_package()
                .returning(|| Ok(Some(available_self_package())));

            let b = bootstrapper(client);
            b.bootstrap(|force_adoption| async move {
                assert!(force_adoption);
                // manager runs until the bootstrap window is cancelled
                std::future::pending::<()>().await;
                Ok(())
            })
            .await
            .expect("bootstrap");
        }

        #[tokio::test]
        async fn racing_create_is_tolerated() {
            let mut client = MockBootstrapClient::new();
            client
                .expect_get_self_package()
                .times(1)
                .returning(|| Ok(None));
            client.expect_create_crd().returning(|_| Ok(false));
            client
                .expect_create_self_package()
                .times(1)
                .returning(|_| Err(already_exists_error()));
            client
                .expect_get_self_package()
                .returning(|| Ok(Some(available_self_package())));

            let b = bootstrapper(client);
            b.bootstrap(|_| async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await
            .expect("bootstrap");
        }

        #[tokio::test]
        async fn broken_install_is_nuked_then_reinstalled() {
            let mut client = MockBootstrapClient::new();
            client
                .expect_get_self_package()
                .times(1)
                .returning(|| Ok(Some(pending_self_package())));
            client
                .expect_get_operator_deployment()
                .times(1)
                .returning(|| Ok(Some(deployment_with_available("False"))));
            // the cascade finds nothing left to delete
            client.expect_list_owned().times(3).returning(|_| Ok(vec![]));
            client.expect_create_crd().returning(|_| Ok(true));
            client
                .expect_create_self_package()
                .times(1)
                .returning(|_| Ok(()));
            client
                .expect_get_self_package()
                .returning(|| Ok(Some(available_self_package())));

            let b = bootstrapper(client);
            b.bootstrap(|_| async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await
            .expect("bootstrap");
        }

        #[tokio::test]
        async fn absent_workload_reinstalls_without_cleanup() {
            let mut client = MockBootstrapClient::new();
            client
                .expect_get_self_package()
                .times(1)
                .returning(|| Ok(Some(pending_self_package())));
            client
                .expect_get_operator_deployment()
                .times(1)
                .returning(|| Ok(None));
            client.expect_list_owned().times(0);
            client.expect_create_crd().returning(|_| Ok(false));
            client
                .expect_create_self_package()
                .times(1)
                .returning(|_| Ok(()));
            client
                .expect_get_self_package()
                .returning(|| Ok(Some(available_self_package())));

            let b = bootstrapper(client);
            b.bootstrap(|_| async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await
            .expect("bootstrap");
        }

        #[tokio::test(start_paused = true)]
        async fn poller_converges_on_a_later_tick() {
            let mut client = MockBootstrapClient::new();
            client
                .expect_get_self_package()
                .times(1)
                .returning(|| Ok(None));
            client.expect_create_crd().returning(|_| Ok(true));
            client
                .expect_create_self_package()
                .times(1)
                .returning(|_| Ok(()));
            // not available on the immediate check, available on the next one
            let mut polls = 0;
            client.expect_get_self_package().returning(move || {
                polls += 1;
                if polls < 2 {
                    Ok(Some(pending_self_package()))
                } else {
                    Ok(Some(available_self_package()))
                }
            });

            let b = bootstrapper(client);
            b.bootstrap(|_| async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await
            .expect("bootstrap");
        }

        #[tokio::test]
        async fn manager_exiting_early_is_an_error() {
            let mut client = MockBootstrapClient::new();
            client
                .expect_get_self_package()
                .times(1)
                .returning(|| Ok(None));
            client.expect_create_crd().returning(|_| Ok(true));
            client
                .expect_create_self_package()
                .times(1)
                .returning(|_| Ok(()));
            client
                .expect_get_self_package()
                .returning(|| Ok(Some(pending_self_package())));

            let b = bootstrapper(client);
            let err = b
                .bootstrap(|_| async { Ok(()) })
                .await
                .expect_err("must fail");
            assert!(err.to_string().contains("before the self package"));
        }
    }
}
