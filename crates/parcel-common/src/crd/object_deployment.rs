//! ObjectDeployment and ClusterObjectDeployment Custom Resource Definitions
//!
//! An ObjectDeployment is the generated, Package-owned resource holding the
//! current rollout template and the chain of historical ObjectSet revisions,
//! analogous to what a Deployment is to ReplicaSets.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ObjectSetTemplateSpec};

/// Status of an ObjectDeployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDeploymentStatus {
    /// Status conditions; Available and Progressing mirror the active revision
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Name of the ObjectSet currently being rolled out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_revision: Option<String>,
}

/// Specification for a namespaced ObjectDeployment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "parcel.dev",
    version = "v1alpha1",
    kind = "ObjectDeployment",
    plural = "objectdeployments",
    shortname = "objdep",
    namespaced,
    status = "ObjectDeploymentStatus",
    printcolumn = r#"{"name":"Active","type":"string","jsonPath":".status.activeRevision"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDeploymentSpec {
    /// Template stamped into new ObjectSet revisions
    #[serde(default)]
    pub template: ObjectSetTemplateSpec,

    /// How many archived revisions to retain for rollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,
}

/// Specification for a cluster-scoped ClusterObjectDeployment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "parcel.dev",
    version = "v1alpha1",
    kind = "ClusterObjectDeployment",
    plural = "clusterobjectdeployments",
    shortname = "cobjdep",
    status = "ObjectDeploymentStatus",
    printcolumn = r#"{"name":"Active","type":"string","jsonPath":".status.activeRevision"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterObjectDeploymentSpec {
    /// Template stamped into new ClusterObjectSet revisions
    #[serde(default)]
    pub template: ObjectSetTemplateSpec,

    /// How many archived revisions to retain for rollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_roundtrip() {
        let yaml = r#"
template:
  phases:
    - name: rbac
    - name: deploy
revisionHistoryLimit: 5
"#;
        let value: serde_json::Value = serde_yaml::from_str(yaml).expect("parse yaml");
        let spec: ClusterObjectDeploymentSpec =
            serde_json::from_value(value).expect("parse spec");

        assert_eq!(spec.template.phases.len(), 2);
        assert_eq!(spec.revision_history_limit, Some(5));
    }

    #[test]
    fn status_defaults() {
        let status = ObjectDeploymentStatus::default();
        assert!(status.conditions.is_empty());
        assert!(status.active_revision.is_none());
    }
}
