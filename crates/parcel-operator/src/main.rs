//! Parcel operator - package delivery for Kubernetes clusters

use std::sync::Arc;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parcel_common::bundle::FolderBundleSource;
use parcel_common::crd::{
    ClusterObjectDeployment, ClusterObjectSet, ClusterPackage, ObjectDeployment, ObjectSet, Package,
};
use parcel_common::PARCEL_SYSTEM_NAMESPACE;
use parcel_operator::bootstrap::client::KubeBootstrapClient;
use parcel_operator::bootstrap::Bootstrapper;
use parcel_operator::controller_runner::{build_package_controllers, run_controllers};
use parcel_operator::startup::ensure_crds_installed;

/// Environment variable carrying the opaque config blob for the self package
const CONFIG_ENV_VAR: &str = "PARCEL_CONFIG";

/// Parcel - CRD-driven operator rolling out versioned object bundles
#[derive(Parser, Debug)]
#[command(name = "parcel", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Run self-bootstrap installing the given operator image, then exit
    #[arg(long, env = "PARCEL_BOOTSTRAP_IMAGE")]
    self_bootstrap: Option<String>,

    /// Namespace the operator workload runs in
    #[arg(long, env = "PARCEL_NAMESPACE", default_value = PARCEL_SYSTEM_NAMESPACE)]
    namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        print_crds()?;
        return Ok(());
    }

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if let Some(image) = cli.self_bootstrap {
        return run_bootstrap(client, image, cli.namespace).await;
    }

    run_operator(client).await
}

/// Dump all CRD manifests as a multi-document YAML stream
fn print_crds() -> anyhow::Result<()> {
    let crds = [
        serde_yaml::to_string(&Package::crd())?,
        serde_yaml::to_string(&ClusterPackage::crd())?,
        serde_yaml::to_string(&ObjectDeployment::crd())?,
        serde_yaml::to_string(&ClusterObjectDeployment::crd())?,
        serde_yaml::to_string(&ObjectSet::crd())?,
        serde_yaml::to_string(&ClusterObjectSet::crd())?,
    ];
    println!("{}", crds.join("---\n"));
    Ok(())
}

/// Read the opaque config blob for the self package from the environment
fn config_from_env() -> anyhow::Result<Option<serde_json::Value>> {
    match std::env::var(CONFIG_ENV_VAR) {
        Ok(raw) if !raw.is_empty() => {
            let value = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("invalid {} value: {}", CONFIG_ENV_VAR, e))?;
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}

/// Self-bootstrap mode: install or repair the self-managed install, running
/// the manager inside the bootstrap window if needed, then exit
async fn run_bootstrap(client: Client, image: String, namespace: String) -> anyhow::Result<()> {
    tracing::info!(%image, %namespace, "Parcel self-bootstrap starting...");

    let config = config_from_env()?;
    let bootstrapper = Bootstrapper::new(
        Arc::new(KubeBootstrapClient::new(client.clone(), namespace)),
        Arc::new(FolderBundleSource),
        image,
        config,
    );

    bootstrapper
        .bootstrap(|force_adoption| async move {
            run_controllers(build_package_controllers(client, force_adoption)).await;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("self-bootstrap failed: {}", e))?;

    tracing::info!("self-bootstrap done");
    Ok(())
}

/// Normal run path: install CRDs, then run the controllers in the foreground
async fn run_operator(client: Client) -> anyhow::Result<()> {
    tracing::info!("Parcel operator starting...");

    ensure_crds_installed(&client).await?;

    tracing::info!("Starting Parcel controllers...");
    run_controllers(build_package_controllers(client, false)).await;

    tracing::info!("Parcel operator shutting down");
    Ok(())
}
