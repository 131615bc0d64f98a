//! ObjectSet and ClusterObjectSet Custom Resource Definitions
//!
//! An ObjectSet is one immutable revision of a Package rollout. Once created
//! only its status and finalizer fields change; superseded revisions are
//! archived, never overwritten, preserving rollback history. Revision numbers
//! are assigned monotonically: a new revision is always numbered above the
//! highest of its previous-revision references.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ObjectSetTemplatePhase, PreviousRevisionReference};

/// Lifecycle phase of an ObjectSet revision
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ObjectSetPhase {
    /// Created, revision number not yet assigned or rollout not started
    #[default]
    Pending,
    /// Objects are being applied
    InTransition,
    /// All phases applied and probes passing
    Available,
    /// Superseded by a later revision, retained for rollback
    Archived,
}

impl std::fmt::Display for ObjectSetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InTransition => write!(f, "InTransition"),
            Self::Available => write!(f, "Available"),
            Self::Archived => write!(f, "Archived"),
        }
    }
}

/// Status of an ObjectSet revision
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: ObjectSetPhase,

    /// Monotonically assigned revision number; 0 means "not yet assigned"
    #[serde(default)]
    pub revision: i64,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Specification for a namespaced ObjectSet revision
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "parcel.dev",
    version = "v1alpha1",
    kind = "ObjectSet",
    plural = "objectsets",
    namespaced,
    status = "ObjectSetStatus",
    printcolumn = r#"{"name":"Revision","type":"integer","jsonPath":".status.revision"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetSpec {
    /// Ordered phases of objects this revision applies
    #[serde(default)]
    pub phases: Vec<ObjectSetTemplatePhase>,

    /// Revisions this ObjectSet supersedes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous: Vec<PreviousRevisionReference>,
}

/// Specification for a cluster-scoped ClusterObjectSet revision
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "parcel.dev",
    version = "v1alpha1",
    kind = "ClusterObjectSet",
    plural = "clusterobjectsets",
    status = "ObjectSetStatus",
    printcolumn = r#"{"name":"Revision","type":"integer","jsonPath":".status.revision"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterObjectSetSpec {
    /// Ordered phases of objects this revision applies
    #[serde(default)]
    pub phases: Vec<ObjectSetTemplatePhase>,

    /// Revisions this ClusterObjectSet supersedes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous: Vec<PreviousRevisionReference>,
}
