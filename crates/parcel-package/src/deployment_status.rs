//! Deployment status step: mirror rollout conditions onto the package
//!
//! Second step of the chain. Reads the package's generated ObjectDeployment
//! and copies its Available/Progressing conditions onto the package, so the
//! final projection can compute the aggregate phase. A missing deployment is
//! not an error; the unpack step simply has not created it yet.

use async_trait::async_trait;
use tracing::debug;

use parcel_common::crd::{
    find_condition, set_condition, Condition, CONDITION_AVAILABLE, CONDITION_PROGRESSING,
};
use parcel_common::Error;

use crate::adapters::{DeploymentAccessor, PackageAccessor};
use crate::controller::{Context, Next, SubReconciler};

/// Sub-reconciler projecting ObjectDeployment conditions onto the package
#[derive(Default)]
pub struct DeploymentStatusReconciler;

#[async_trait]
impl<P: PackageAccessor> SubReconciler<P> for DeploymentStatusReconciler {
    async fn reconcile(&self, ctx: &Context<P>, pkg: &mut P) -> Result<Next, Error> {
        let Some(deployment) = ctx.api.get_deployment(pkg).await? else {
            debug!("object deployment not created yet");
            return Ok(Next::Continue);
        };

        mirror_conditions(deployment.conditions(), &mut pkg.status_mut().conditions);
        Ok(Next::Continue)
    }
}

/// Copy the rollout-relevant conditions from the deployment onto the package
fn mirror_conditions(deployment: &[Condition], package: &mut Vec<Condition>) {
    for type_ in [CONDITION_AVAILABLE, CONDITION_PROGRESSING] {
        if let Some(condition) = find_condition(deployment, type_) {
            set_condition(package, condition.clone());
        }
    }
}
