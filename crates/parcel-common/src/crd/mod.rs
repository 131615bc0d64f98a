//! Custom Resource Definitions for Parcel
//!
//! This module contains all CRD definitions used by the Parcel operator.

mod object_deployment;
mod object_set;
mod package;
mod types;

pub use object_deployment::{
    ClusterObjectDeployment, ClusterObjectDeploymentSpec, ObjectDeployment,
    ObjectDeploymentSpec, ObjectDeploymentStatus,
};
pub use object_set::{
    ClusterObjectSet, ClusterObjectSetSpec, ObjectSet, ObjectSetPhase, ObjectSetSpec,
    ObjectSetStatus,
};
pub use package::{
    ClusterPackage, ClusterPackageSpec, Package, PackagePhase, PackageSpec, PackageStatus,
};
pub use types::{
    find_condition, is_condition_true, set_condition, Condition, ConditionStatus,
    ObjectSetTemplatePhase, ObjectSetTemplateSpec, PreviousRevisionReference,
    CONDITION_AVAILABLE, CONDITION_PROGRESSING, CONDITION_UNPACKED,
};
