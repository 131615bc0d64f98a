//! Revision graph repair
//!
//! A crash between revision creation and number assignment can leave a
//! ClusterObjectSet stuck: it references previous revisions but its own
//! revision number is still 0 and its phase is Pending. Such a revision
//! blocks the whole rollout chain. Repair computes the number the revision
//! should have had, max over its predecessors plus one, and patches it in.

use std::collections::HashMap;

use tracing::{debug, info};

use parcel_common::crd::{ClusterObjectSet, ObjectSetPhase};
use parcel_common::Result;

use super::client::BootstrapClient;

/// Compute fixes for revisions stuck without an assigned number
///
/// A revision is stuck when it has predecessors, no revision number, and is
/// still Pending. The assigned number is one above the highest predecessor;
/// a predecessor missing from the listing counts as 0.
pub fn stuck_revision_fixes(object_sets: &[ClusterObjectSet]) -> Vec<(String, i64)> {
    let revisions: HashMap<&str, i64> = object_sets
        .iter()
        .filter_map(|os| {
            let name = os.metadata.name.as_deref()?;
            Some((name, os.status.as_ref().map_or(0, |s| s.revision)))
        })
        .collect();

    let mut fixes = Vec::new();
    for os in object_sets {
        let Some(name) = os.metadata.name.as_deref() else {
            continue;
        };
        let Some(status) = os.status.as_ref() else {
            continue;
        };
        if status.revision != 0
            || status.phase != ObjectSetPhase::Pending
            || os.spec.previous.is_empty()
        {
            continue;
        }

        let highest = os
            .spec
            .previous
            .iter()
            .map(|prev| revisions.get(prev.name.as_str()).copied().unwrap_or(0))
            .max()
            .unwrap_or(0);
        fixes.push((name.to_string(), highest + 1));
    }
    fixes
}

/// Find and patch stuck revisions so rollout can resume
pub async fn fix_missing_revision_numbers(client: &dyn BootstrapClient) -> Result<()> {
    let object_sets = client.list_object_sets().await?;
    let fixes = stuck_revision_fixes(&object_sets);
    if fixes.is_empty() {
        debug!("no stuck revisions found");
        return Ok(());
    }

    for (name, revision) in fixes {
        info!(object_set = %name, revision, "assigning missing revision number");
        client.patch_object_set_revision(&name, revision).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_common::crd::{
        ClusterObjectSetSpec, ObjectSetStatus, PreviousRevisionReference,
    };

    fn object_set(
        name: &str,
        revision: i64,
        phase: ObjectSetPhase,
        previous: &[&str],
    ) -> ClusterObjectSet {
        let mut os = ClusterObjectSet::new(
            name,
            ClusterObjectSetSpec {
                phases: Vec::new(),
                previous: previous
                    .iter()
                    .map(|p| PreviousRevisionReference {
                        name: p.to_string(),
                    })
                    .collect(),
            },
        );
        os.status = Some(ObjectSetStatus {
            phase,
            revision,
            conditions: Vec::new(),
        });
        os
    }

    #[test]
    fn assigns_one_above_highest_predecessor() {
        let sets = vec![
            object_set("parcel-a", 1, ObjectSetPhase::Archived, &[]),
            object_set("parcel-b", 0, ObjectSetPhase::Pending, &["parcel-a"]),
        ];

        assert_eq!(
            stuck_revision_fixes(&sets),
            vec![("parcel-b".to_string(), 2)]
        );
    }

    #[test]
    fn missing_predecessor_counts_as_zero() {
        let sets = vec![object_set(
            "parcel-b",
            0,
            ObjectSetPhase::Pending,
            &["parcel-gone"],
        )];

        assert_eq!(
            stuck_revision_fixes(&sets),
            vec![("parcel-b".to_string(), 1)]
        );
    }

    #[test]
    fn first_revision_without_predecessors_is_not_stuck() {
        let sets = vec![object_set("parcel-a", 0, ObjectSetPhase::Pending, &[])];
        assert!(stuck_revision_fixes(&sets).is_empty());
    }

    #[test]
    fn assigned_or_progressed_revisions_are_left_alone() {
        let sets = vec![
            object_set("parcel-a", 3, ObjectSetPhase::Available, &[]),
            object_set("parcel-b", 0, ObjectSetPhase::InTransition, &["parcel-a"]),
        ];
        assert!(stuck_revision_fixes(&sets).is_empty());
    }

    #[test]
    fn picks_the_max_across_multiple_predecessors() {
        let sets = vec![
            object_set("parcel-a", 2, ObjectSetPhase::Archived, &[]),
            object_set("parcel-b", 5, ObjectSetPhase::Archived, &[]),
            object_set(
                "parcel-c",
                0,
                ObjectSetPhase::Pending,
                &["parcel-a", "parcel-b"],
            ),
        ];

        assert_eq!(
            stuck_revision_fixes(&sets),
            vec![("parcel-c".to_string(), 6)]
        );
    }

    mod applying {
        use super::*;
        use crate::bootstrap::client::MockBootstrapClient;
        use mockall::predicate::eq;

        #[tokio::test]
        async fn patches_every_stuck_revision() {
            let mut client = MockBootstrapClient::new();
            client.expect_list_object_sets().times(1).returning(|| {
                Ok(vec![
                    object_set("parcel-a", 1, ObjectSetPhase::Archived, &[]),
                    object_set("parcel-b", 0, ObjectSetPhase::Pending, &["parcel-a"]),
                ])
            });
            client
                .expect_patch_object_set_revision()
                .with(eq("parcel-b"), eq(2))
                .times(1)
                .returning(|_, _| Ok(()));

            fix_missing_revision_numbers(&client).await.expect("repair");
        }

        #[tokio::test]
        async fn no_patches_on_a_healthy_graph() {
            let mut client = MockBootstrapClient::new();
            client.expect_list_object_sets().times(1).returning(|| {
                Ok(vec![object_set(
                    "parcel-a",
                    1,
                    ObjectSetPhase::Available,
                    &[],
                )])
            });
            client.expect_patch_object_set_revision().times(0);

            fix_missing_revision_numbers(&client).await.expect("repair");
        }
    }
}
