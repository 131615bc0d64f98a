//! Supporting types shared across the Parcel CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type marking a Package as fully rolled out and healthy
///
/// `Available=True` on the self-managed ClusterPackage is the convergence
/// signal the bootstrap poller waits for.
pub const CONDITION_AVAILABLE: &str = "Available";

/// Condition type set while a rollout is still moving towards the desired revision
pub const CONDITION_PROGRESSING: &str = "Progressing";

/// Condition type set once the package image has been pulled and parsed
pub const CONDITION_UNPACKED: &str = "Unpacked";

/// Status of a condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
///
/// This type follows Kubernetes API conventions and is used for every
/// resource status in the parcel.dev group.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g. Available, Progressing)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Returns true if the condition of the given type exists with status True
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == type_ && c.status == ConditionStatus::True)
}

/// Look up a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Insert or replace a condition by type
///
/// The transition timestamp of an existing condition is preserved when the
/// status did not actually change, so repeated reconciles do not churn it.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// One ordered phase of objects within a revision template
///
/// Objects are applied phase by phase, in the listed order. The object
/// payloads are opaque to the control loop; rendering and validation happen
/// before they reach a template.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetTemplatePhase {
    /// Phase name, unique within the template
    pub name: String,

    /// Objects applied during this phase, in order
    #[serde(default)]
    pub objects: Vec<serde_json::Value>,
}

/// Ordered phases making up one revision's desired state
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetTemplateSpec {
    /// Phases applied in order
    #[serde(default)]
    pub phases: Vec<ObjectSetTemplatePhase>,
}

/// Pointer to an ancestor revision this ObjectSet supersedes
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviousRevisionReference {
    /// Name of the previous ObjectSet
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    mod conditions {
        use super::*;

        #[test]
        fn condition_new_sets_timestamp() {
            let before = Utc::now();
            let condition = Condition::new(
                CONDITION_AVAILABLE,
                ConditionStatus::True,
                "RolloutComplete",
                "Latest revision is available",
            );
            let after = Utc::now();

            assert_eq!(condition.type_, "Available");
            assert_eq!(condition.status, ConditionStatus::True);
            assert!(condition.last_transition_time >= before);
            assert!(condition.last_transition_time <= after);
        }

        #[test]
        fn is_condition_true_matches_type_and_status() {
            let conditions = vec![
                Condition::new(CONDITION_UNPACKED, ConditionStatus::True, "Done", ""),
                Condition::new(CONDITION_AVAILABLE, ConditionStatus::False, "Waiting", ""),
            ];

            assert!(is_condition_true(&conditions, CONDITION_UNPACKED));
            assert!(!is_condition_true(&conditions, CONDITION_AVAILABLE));
            assert!(!is_condition_true(&conditions, CONDITION_PROGRESSING));
        }

        #[test]
        fn set_condition_replaces_by_type() {
            let mut conditions = vec![Condition::new(
                CONDITION_AVAILABLE,
                ConditionStatus::False,
                "Waiting",
                "",
            )];

            set_condition(
                &mut conditions,
                Condition::new(CONDITION_AVAILABLE, ConditionStatus::True, "Ready", ""),
            );

            assert_eq!(conditions.len(), 1);
            assert_eq!(conditions[0].status, ConditionStatus::True);
            assert_eq!(conditions[0].reason, "Ready");
        }

        #[test]
        fn set_condition_preserves_transition_time_when_status_unchanged() {
            let original = Condition::new(CONDITION_AVAILABLE, ConditionStatus::True, "Ready", "");
            let original_time = original.last_transition_time;
            let mut conditions = vec![original];

            // Same status, different message: no transition
            let mut update =
                Condition::new(CONDITION_AVAILABLE, ConditionStatus::True, "Ready", "still fine");
            update.last_transition_time = original_time + chrono::Duration::seconds(60);
            set_condition(&mut conditions, update);

            assert_eq!(conditions[0].last_transition_time, original_time);
            assert_eq!(conditions[0].message, "still fine");
        }

        #[test]
        fn set_condition_appends_new_type() {
            let mut conditions = vec![];
            set_condition(
                &mut conditions,
                Condition::new(CONDITION_PROGRESSING, ConditionStatus::True, "Rolling", ""),
            );
            assert_eq!(conditions.len(), 1);
        }
    }

    mod template {
        use super::*;

        #[test]
        fn phase_parses_with_opaque_objects() {
            let yaml = r#"
name: deploy
objects:
  - apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: parcel-operator-manager
"#;
            let value: serde_json::Value = serde_yaml::from_str(yaml).expect("parse yaml");
            let phase: ObjectSetTemplatePhase =
                serde_json::from_value(value).expect("parse phase");

            assert_eq!(phase.name, "deploy");
            assert_eq!(phase.objects.len(), 1);
            assert_eq!(phase.objects[0]["kind"], "Deployment");
        }

        #[test]
        fn phase_objects_default_empty() {
            let value: serde_json::Value =
                serde_yaml::from_str("name: crds").expect("parse yaml");
            let phase: ObjectSetTemplatePhase =
                serde_json::from_value(value).expect("parse phase");
            assert!(phase.objects.is_empty());
        }
    }
}
