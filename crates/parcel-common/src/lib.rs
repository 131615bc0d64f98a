//! Common types for Parcel: CRDs, errors, and the bundle content model

#![deny(missing_docs)]

pub mod bundle;
pub mod crd;
pub mod error;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name of the self-managed ClusterPackage instance
pub const SELF_PACKAGE_NAME: &str = "parcel";

/// Name of the Deployment backing the operator itself
pub const OPERATOR_DEPLOYMENT_NAME: &str = "parcel-operator-manager";

/// Default namespace for the operator workload
pub const PARCEL_SYSTEM_NAMESPACE: &str = "parcel-system";

/// Label key identifying which Package instance generated an object
pub const INSTANCE_LABEL_KEY: &str = "parcel.dev/instance";

/// Label key naming the Package an object belongs to
pub const PACKAGE_LABEL_KEY: &str = "parcel.dev/package";

/// Label stamped on bootstrap-installed objects so the dynamic cache watches them
pub const CACHE_LABEL_KEY: &str = "parcel.dev/cache";

/// Finalizer used by pre-1.0 loader jobs; stripped on Package deletion
pub const LOADER_JOB_FINALIZER: &str = "parcel.dev/loader-job";

/// Fixed path the self-bootstrap bundle is baked into the operator image at
pub const SELF_BUNDLE_PATH: &str = "/package";
