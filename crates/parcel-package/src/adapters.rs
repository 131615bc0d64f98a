//! Scope adapters for the generic package engine
//!
//! `Package`/`ObjectDeployment` are namespaced, `ClusterPackage`/
//! `ClusterObjectDeployment` are cluster-scoped. The engine never branches on
//! scope: each kind implements a small capability surface (API construction,
//! spec/status access) and everything else is written against the traits.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

use parcel_common::crd::{
    ClusterObjectDeployment, ClusterObjectDeploymentSpec, ClusterPackage, Condition,
    ObjectDeployment, ObjectDeploymentSpec, ObjectSetTemplateSpec, Package, PackageStatus,
};

/// Capability surface the engine needs from a package kind
pub trait PackageAccessor:
    Resource<DynamicType = ()>
    + Clone
    + std::fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + Sized
    + 'static
{
    /// The generated rollout kind this package kind owns
    type Deployment: DeploymentAccessor;

    /// Build an API handle scoped like this kind
    ///
    /// `namespace` is the object's own namespace; cluster-scoped kinds
    /// ignore it.
    fn package_api(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// Bundle image reference from the spec
    fn image(&self) -> &str;

    /// Opaque configuration blob from the spec
    fn config(&self) -> Option<&serde_json::Value>;

    /// Current status, if any
    fn status(&self) -> Option<&PackageStatus>;

    /// Mutable status, defaulted on first access
    fn status_mut(&mut self) -> &mut PackageStatus;
}

/// Capability surface the engine needs from a generated deployment kind
pub trait DeploymentAccessor:
    Resource<DynamicType = ()>
    + Clone
    + std::fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + Sized
    + 'static
{
    /// Build an API handle scoped like this kind
    fn deployment_api(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// Construct a fresh object with the given metadata and rollout template
    fn build(meta: ObjectMeta, template: ObjectSetTemplateSpec) -> Self;

    /// Status conditions, empty when no status is set
    fn conditions(&self) -> &[Condition];
}

impl PackageAccessor for Package {
    type Deployment = ObjectDeployment;

    fn package_api(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::default_namespaced(client),
        }
    }

    fn image(&self) -> &str {
        &self.spec.image
    }

    fn config(&self) -> Option<&serde_json::Value> {
        self.spec.config.as_ref()
    }

    fn status(&self) -> Option<&PackageStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut PackageStatus {
        self.status.get_or_insert_with(PackageStatus::default)
    }
}

impl PackageAccessor for ClusterPackage {
    type Deployment = ClusterObjectDeployment;

    fn package_api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }

    fn image(&self) -> &str {
        &self.spec.image
    }

    fn config(&self) -> Option<&serde_json::Value> {
        self.spec.config.as_ref()
    }

    fn status(&self) -> Option<&PackageStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut PackageStatus {
        self.status.get_or_insert_with(PackageStatus::default)
    }
}

impl DeploymentAccessor for ObjectDeployment {
    fn deployment_api(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::default_namespaced(client),
        }
    }

    fn build(meta: ObjectMeta, template: ObjectSetTemplateSpec) -> Self {
        ObjectDeployment {
            metadata: meta,
            spec: ObjectDeploymentSpec {
                template,
                revision_history_limit: None,
            },
            status: None,
        }
    }

    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| &s.conditions[..]).unwrap_or(&[])
    }
}

impl DeploymentAccessor for ClusterObjectDeployment {
    fn deployment_api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }

    fn build(meta: ObjectMeta, template: ObjectSetTemplateSpec) -> Self {
        ClusterObjectDeployment {
            metadata: meta,
            spec: ClusterObjectDeploymentSpec {
                template,
                revision_history_limit: None,
            },
            status: None,
        }
    }

    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| &s.conditions[..]).unwrap_or(&[])
    }
}

/// Owner reference pointing a generated object back at its package
pub fn package_owner_ref<P: PackageAccessor>(pkg: &P) -> Option<OwnerReference> {
    pkg.controller_owner_ref(&())
}
