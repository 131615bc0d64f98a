//! Forced cleanup cascade
//!
//! When a previous operator generation is gone but its objects linger with
//! finalizers nobody will ever remove, normal deletion deadlocks. The cascade
//! tears the generated state down in dependency order, stripping finalizers
//! after issuing each delete, and verifies every object is gone before moving
//! to the next kind. It runs before any controller starts, so clearing
//! another controller's finalizers is safe: there is no other controller.

use k8s_openapi::api::apps::v1::Deployment;
use tracing::{info, warn};

use parcel_common::{Error, Result};

use super::client::{BootstrapClient, OwnedKind};

/// Deletion order: owner kinds before the revisions they generate
const CASCADE_ORDER: [OwnedKind; 3] = [
    OwnedKind::Package,
    OwnedKind::ObjectDeployment,
    OwnedKind::ObjectSet,
];

/// Decide whether a lingering install needs the forced cleanup cascade
///
/// Cleanup triggers only when the operator Deployment is present and
/// explicitly reports Available=False. An absent Deployment or one without a
/// verdict yet gets the benefit of the doubt.
pub fn needs_forced_cleanup(deployment: Option<&Deployment>) -> bool {
    let Some(deployment) = deployment else {
        return false;
    };
    deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map_or(false, |conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "False")
        })
}

/// Tear down all generated state from a broken previous install
///
/// Idempotent: running against an already-clean cluster is a no-op.
pub async fn forced_cleanup(client: &dyn BootstrapClient) -> Result<()> {
    warn!("previous install is unhealthy, forcing cleanup of generated objects");
    for kind in CASCADE_ORDER {
        cleanup_kind(client, kind).await?;
    }
    info!("forced cleanup complete");
    Ok(())
}

/// Delete all objects of one kind, strip finalizers, and verify they are gone
async fn cleanup_kind(client: &dyn BootstrapClient, kind: OwnedKind) -> Result<()> {
    let objects = client.list_owned(kind).await?;
    if objects.is_empty() {
        return Ok(());
    }

    for object in &objects {
        info!(kind = %kind, name = %object.name, "deleting");
        client.delete_owned(kind, &object.name).await?;
        if object.has_finalizers {
            client.clear_finalizers(kind, &object.name).await?;
        }
    }

    for object in &objects {
        if client.exists(kind, &object.name).await? {
            return Err(Error::bootstrap(
                "forced cleanup",
                format!("{kind} {} still present after deletion", object.name),
            ));
        }
    }
    Ok(())
}
