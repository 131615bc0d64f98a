//! Generic reconciliation engine for Package and ClusterPackage objects
//!
//! The engine is written once against the [`adapters::PackageAccessor`]
//! capability trait; the namespaced and cluster-scoped kinds plug in as
//! adapters. Reconciliation runs an ordered chain of sub-reconcilers with
//! early-stop semantics, finalizer-gated deletion, and idempotent status
//! projection.

#![deny(missing_docs)]

pub mod adapters;
pub mod controller;
pub mod deploy;
pub mod deployment_status;
pub mod metrics;
pub mod unpack;

pub use controller::{
    error_policy, reconcile, Context, KubePackageApi, Next, PackageApi, SubReconciler,
};
pub use deploy::{BundleSourcePuller, EnsureDeployer};
pub use unpack::{ImagePuller, PackageDeployer};

/// Maximum concurrent reconciles per watched kind
pub const MAX_CONCURRENT_RECONCILES: u16 = 5;
