//! Package and ClusterPackage Custom Resource Definitions
//!
//! A Package points at a bundle image and an opaque configuration blob; the
//! operator unpacks the bundle and rolls it out through ObjectDeployment /
//! ObjectSet revisions. The two kinds are structurally identical and differ
//! only in scope; controllers are written once against the
//! `PackageAccessor`-style capability surface rather than the concrete kind.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    is_condition_true, Condition, ConditionStatus, CONDITION_AVAILABLE, CONDITION_PROGRESSING,
    CONDITION_UNPACKED,
};

/// Aggregate phase of a Package, projected from its conditions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PackagePhase {
    /// Phase could not be determined
    Unknown,
    /// Waiting for the first unpack
    #[default]
    Pending,
    /// Bundle image is being pulled and parsed
    Unpacking,
    /// Rollout is moving towards the desired revision
    Progressing,
    /// Latest revision is fully rolled out
    Available,
    /// Unpack or rollout failed
    NotReady,
}

impl std::fmt::Display for PackagePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Pending => write!(f, "Pending"),
            Self::Unpacking => write!(f, "Unpacking"),
            Self::Progressing => write!(f, "Progressing"),
            Self::Available => write!(f, "Available"),
            Self::NotReady => write!(f, "NotReady"),
        }
    }
}

/// Status of a Package or ClusterPackage
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageStatus {
    /// Current aggregate phase
    #[serde(default)]
    pub phase: PackagePhase,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Image reference the current Unpacked condition refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpacked_image: Option<String>,
}

impl PackageStatus {
    /// Recompute the aggregate phase from the current condition list
    ///
    /// Projection order mirrors condition precedence: a failed unpack always
    /// wins, then availability, then rollout progress.
    pub fn projected_phase(&self) -> PackagePhase {
        if self
            .conditions
            .iter()
            .any(|c| c.type_ == CONDITION_UNPACKED && c.status == ConditionStatus::False)
        {
            return PackagePhase::NotReady;
        }
        if is_condition_true(&self.conditions, CONDITION_AVAILABLE) {
            return PackagePhase::Available;
        }
        if is_condition_true(&self.conditions, CONDITION_PROGRESSING) {
            return PackagePhase::Progressing;
        }
        if is_condition_true(&self.conditions, CONDITION_UNPACKED) {
            // Unpacked but no rollout signal yet
            return PackagePhase::Progressing;
        }
        if self.conditions.is_empty() {
            return PackagePhase::Pending;
        }
        PackagePhase::Unpacking
    }
}

/// Specification for a namespaced Package
///
/// Structurally identical to [`ClusterPackageSpec`]; the kind split only
/// carries the scope difference.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "parcel.dev",
    version = "v1alpha1",
    kind = "Package",
    plural = "packages",
    shortname = "pkg",
    namespaced,
    status = "PackageStatus",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    /// Bundle image reference to unpack and roll out
    pub image: String,

    /// Opaque configuration blob handed to the bundle verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Specification for a cluster-scoped ClusterPackage
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "parcel.dev",
    version = "v1alpha1",
    kind = "ClusterPackage",
    plural = "clusterpackages",
    shortname = "cpkg",
    status = "PackageStatus",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPackageSpec {
    /// Bundle image reference to unpack and roll out
    pub image: String,

    /// Opaque configuration blob handed to the bundle verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::super::types::ConditionStatus;
    use super::*;

    fn parse_spec(yaml: &str) -> ClusterPackageSpec {
        let value: serde_json::Value = serde_yaml::from_str(yaml).expect("parse yaml");
        serde_json::from_value(value).expect("parse spec")
    }

    #[test]
    fn spec_roundtrip() {
        let spec = parse_spec(
            r#"
image: quay.io/parcel/parcel-manager:v1.4.2
config:
  logLevel: debug
"#,
        );

        assert_eq!(spec.image, "quay.io/parcel/parcel-manager:v1.4.2");
        assert_eq!(spec.config.unwrap()["logLevel"], "debug");
    }

    #[test]
    fn spec_config_is_optional() {
        let spec = parse_spec("image: quay.io/parcel/parcel-manager:v1.4.2");
        assert!(spec.config.is_none());
    }

    #[test]
    fn phase_display() {
        assert_eq!(PackagePhase::Pending.to_string(), "Pending");
        assert_eq!(PackagePhase::Unpacking.to_string(), "Unpacking");
        assert_eq!(PackagePhase::Progressing.to_string(), "Progressing");
        assert_eq!(PackagePhase::Available.to_string(), "Available");
        assert_eq!(PackagePhase::NotReady.to_string(), "NotReady");
    }

    mod phase_projection {
        use super::*;

        fn status_with(conditions: Vec<Condition>) -> PackageStatus {
            PackageStatus {
                conditions,
                ..Default::default()
            }
        }

        #[test]
        fn empty_conditions_is_pending() {
            assert_eq!(status_with(vec![]).projected_phase(), PackagePhase::Pending);
        }

        #[test]
        fn failed_unpack_wins_over_everything() {
            let status = status_with(vec![
                Condition::new(CONDITION_UNPACKED, ConditionStatus::False, "PullError", ""),
                Condition::new(CONDITION_AVAILABLE, ConditionStatus::True, "Stale", ""),
            ]);
            assert_eq!(status.projected_phase(), PackagePhase::NotReady);
        }

        #[test]
        fn available_condition_projects_available() {
            let status = status_with(vec![
                Condition::new(CONDITION_UNPACKED, ConditionStatus::True, "Done", ""),
                Condition::new(CONDITION_AVAILABLE, ConditionStatus::True, "Complete", ""),
            ]);
            assert_eq!(status.projected_phase(), PackagePhase::Available);
        }

        #[test]
        fn unpacked_without_rollout_signal_is_progressing() {
            let status = status_with(vec![Condition::new(
                CONDITION_UNPACKED,
                ConditionStatus::True,
                "Done",
                "",
            )]);
            assert_eq!(status.projected_phase(), PackagePhase::Progressing);
        }
    }
}
