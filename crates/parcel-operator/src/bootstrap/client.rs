//! Cluster access for the bootstrapper
//!
//! All bootstrap logic talks to the cluster through [`BootstrapClient`],
//! which allows mocking in tests while the real client runs in production.
//! The bootstrapper deliberately uses an uncached client: it runs before the
//! manager (and its caches) exist.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use parcel_common::crd::{ClusterObjectDeployment, ClusterObjectSet, ClusterPackage};
use parcel_common::{Result, CACHE_LABEL_KEY, INSTANCE_LABEL_KEY, PACKAGE_LABEL_KEY, SELF_PACKAGE_NAME};

/// The three generated kinds the cleanup cascade walks, in deletion order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnedKind {
    /// The self-managed ClusterPackage itself
    Package,
    /// Generated ClusterObjectDeployments under the instance label
    ObjectDeployment,
    /// Generated ClusterObjectSet revisions under the instance label
    ObjectSet,
}

impl std::fmt::Display for OwnedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Package => write!(f, "ClusterPackage"),
            Self::ObjectDeployment => write!(f, "ClusterObjectDeployment"),
            Self::ObjectSet => write!(f, "ClusterObjectSet"),
        }
    }
}

/// Trait abstracting Kubernetes operations needed during self-bootstrap
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BootstrapClient: Send + Sync {
    /// Fetch the well-known self-managed ClusterPackage
    async fn get_self_package(&self) -> Result<Option<ClusterPackage>>;

    /// Create the self-managed ClusterPackage
    ///
    /// AlreadyExists is not absorbed here; the caller decides.
    async fn create_self_package(&self, pkg: &ClusterPackage) -> Result<()>;

    /// Merge-patch the self-managed ClusterPackage's spec
    async fn patch_self_package_spec(&self, spec: serde_json::Value) -> Result<()>;

    /// Fetch the Deployment backing the operator, if present
    async fn get_operator_deployment(&self) -> Result<Option<Deployment>>;

    /// List generated objects of one kind under the instance labels
    ///
    /// For `OwnedKind::Package` this returns the self package's name when it
    /// still exists, so the cascade treats all three kinds uniformly.
    async fn list_owned(&self, kind: OwnedKind) -> Result<Vec<OwnedObject>>;

    /// Delete one object of the given kind; NotFound is absorbed
    async fn delete_owned(&self, kind: OwnedKind, name: &str) -> Result<()>;

    /// Replace the object's finalizer list with an empty one
    async fn clear_finalizers(&self, kind: OwnedKind, name: &str) -> Result<()>;

    /// Returns true if the object still exists
    async fn exists(&self, kind: OwnedKind, name: &str) -> Result<bool>;

    /// List all ClusterObjectSet revisions under the instance labels
    async fn list_object_sets(&self) -> Result<Vec<ClusterObjectSet>>;

    /// Merge-patch only the status.revision of a ClusterObjectSet
    async fn patch_object_set_revision(&self, name: &str, revision: i64) -> Result<()>;

    /// Create a CRD from its raw bundle object; returns false if it already existed
    async fn create_crd(&self, crd: serde_json::Value) -> Result<bool>;
}

/// Name plus finalizer presence, all the cascade needs to know per object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedObject {
    /// Object name
    pub name: String,
    /// Whether the object currently carries finalizers
    pub has_finalizers: bool,
}

/// Real [`BootstrapClient`] over a kube client
pub struct KubeBootstrapClient {
    client: Client,
    namespace: String,
}

impl KubeBootstrapClient {
    /// Build the real client; `namespace` is where the operator workload lives
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn instance_selector() -> ListParams {
        ListParams::default().labels(&format!(
            "{INSTANCE_LABEL_KEY}={SELF_PACKAGE_NAME},{PACKAGE_LABEL_KEY}={SELF_PACKAGE_NAME}"
        ))
    }

    fn packages(&self) -> Api<ClusterPackage> {
        Api::all(self.client.clone())
    }

    fn deployments(&self) -> Api<ClusterObjectDeployment> {
        Api::all(self.client.clone())
    }

    fn object_sets(&self) -> Api<ClusterObjectSet> {
        Api::all(self.client.clone())
    }
}

fn finalizer_patch() -> serde_json::Value {
    serde_json::json!({ "metadata": { "finalizers": [] } })
}

#[async_trait]
impl BootstrapClient for KubeBootstrapClient {
    async fn get_self_package(&self) -> Result<Option<ClusterPackage>> {
        Ok(self.packages().get_opt(SELF_PACKAGE_NAME).await?)
    }

    async fn create_self_package(&self, pkg: &ClusterPackage) -> Result<()> {
        self.packages().create(&PostParams::default(), pkg).await?;
        Ok(())
    }

    async fn patch_self_package_spec(&self, spec: serde_json::Value) -> Result<()> {
        self.packages()
            .patch(
                SELF_PACKAGE_NAME,
                &PatchParams::default(),
                &Patch::Merge(&serde_json::json!({ "spec": spec })),
            )
            .await?;
        Ok(())
    }

    async fn get_operator_deployment(&self) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        Ok(api.get_opt(parcel_common::OPERATOR_DEPLOYMENT_NAME).await?)
    }

    async fn list_owned(&self, kind: OwnedKind) -> Result<Vec<OwnedObject>> {
        let to_owned = |name: Option<String>, finalizers: Option<&Vec<String>>| OwnedObject {
            name: name.unwrap_or_default(),
            has_finalizers: finalizers.is_some_and(|f| !f.is_empty()),
        };
        match kind {
            OwnedKind::Package => {
                Ok(self
                    .get_self_package()
                    .await?
                    .map(|p| {
                        to_owned(p.metadata.name.clone(), p.metadata.finalizers.as_ref())
                    })
                    .into_iter()
                    .collect())
            }
            OwnedKind::ObjectDeployment => Ok(self
                .deployments()
                .list(&Self::instance_selector())
                .await?
                .items
                .into_iter()
                .map(|d| to_owned(d.metadata.name.clone(), d.metadata.finalizers.as_ref()))
                .collect()),
            OwnedKind::ObjectSet => Ok(self
                .object_sets()
                .list(&Self::instance_selector())
                .await?
                .items
                .into_iter()
                .map(|s| to_owned(s.metadata.name.clone(), s.metadata.finalizers.as_ref()))
                .collect()),
        }
    }

    async fn delete_owned(&self, kind: OwnedKind, name: &str) -> Result<()> {
        let dp = DeleteParams::default();
        let result = match kind {
            OwnedKind::Package => self.packages().delete(name, &dp).await.map(|_| ()),
            OwnedKind::ObjectDeployment => self.deployments().delete(name, &dp).await.map(|_| ()),
            OwnedKind::ObjectSet => self.object_sets().delete(name, &dp).await.map(|_| ()),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if parcel_common::error::kube_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_finalizers(&self, kind: OwnedKind, name: &str) -> Result<()> {
        let pp = PatchParams::default();
        let patch = Patch::Merge(finalizer_patch());
        match kind {
            OwnedKind::Package => {
                self.packages().patch(name, &pp, &patch).await?;
            }
            OwnedKind::ObjectDeployment => {
                self.deployments().patch(name, &pp, &patch).await?;
            }
            OwnedKind::ObjectSet => {
                self.object_sets().patch(name, &pp, &patch).await?;
            }
        }
        Ok(())
    }

    async fn exists(&self, kind: OwnedKind, name: &str) -> Result<bool> {
        let found = match kind {
            OwnedKind::Package => self.packages().get_opt(name).await?.is_some(),
            OwnedKind::ObjectDeployment => self.deployments().get_opt(name).await?.is_some(),
            OwnedKind::ObjectSet => self.object_sets().get_opt(name).await?.is_some(),
        };
        Ok(found)
    }

    async fn list_object_sets(&self) -> Result<Vec<ClusterObjectSet>> {
        Ok(self
            .object_sets()
            .list(&Self::instance_selector())
            .await?
            .items)
    }

    async fn patch_object_set_revision(&self, name: &str, revision: i64) -> Result<()> {
        self.object_sets()
            .patch_status(
                name,
                &PatchParams::default(),
                &Patch::Merge(&serde_json::json!({ "status": { "revision": revision } })),
            )
            .await?;
        Ok(())
    }

    async fn create_crd(&self, mut crd: serde_json::Value) -> Result<bool> {
        // Stamp the cache label so the dynamic cache watches bootstrap-installed CRDs.
        crd["metadata"]["labels"][CACHE_LABEL_KEY] = serde_json::Value::String("True".to_string());

        let typed: CustomResourceDefinition = serde_json::from_value(crd).map_err(|e| {
            parcel_common::Error::serialization(format!("bundle CRD is not a valid CRD: {e}"))
        })?;
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        match api.create(&PostParams::default(), &typed).await {
            Ok(_) => Ok(true),
            Err(e) if is_already_exists(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_kind_display() {
        assert_eq!(OwnedKind::Package.to_string(), "ClusterPackage");
        assert_eq!(
            OwnedKind::ObjectDeployment.to_string(),
            "ClusterObjectDeployment"
        );
        assert_eq!(OwnedKind::ObjectSet.to_string(), "ClusterObjectSet");
    }

    #[test]
    fn finalizer_patch_empties_the_list() {
        assert_eq!(
            finalizer_patch(),
            serde_json::json!({ "metadata": { "finalizers": [] } })
        );
    }
}
