//! Ridge Operator - public domain binding and certificate issuance

use clap::Parser;
use futures::future::join_all;
use kube::Client;

use ridge_common::telemetry::init_telemetry;
use ridge_operator::config::Config;
use ridge_operator::controller_runner::{
    build_caches, build_certificate_controllers, build_domain_controllers,
};
use ridge_operator::crds;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    if config.crd {
        print!("{}", crds::to_yaml()?);
        return Ok(());
    }

    init_telemetry(config.telemetry())?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    if config.install_crds {
        crds::ensure_installed(&client).await?;
    }

    match config.namespace.as_deref() {
        Some(ns) => tracing::info!(namespace = %ns, "watching single namespace"),
        None => tracing::info!("watching all namespaces"),
    }
    tracing::info!(
        feature = %config.feature_name,
        issuer_type_key = %config.issuer_type_key,
        "starting controllers:"
    );

    let (caches, reflectors) = build_caches(&client, &config);
    let mut controllers = build_domain_controllers(client.clone(), &config, &caches);
    controllers.extend(build_certificate_controllers(client, &config, &caches));

    // Controllers stop on SIGTERM/SIGINT; reflectors run until then
    tokio::select! {
        _ = join_all(controllers) => {
            tracing::info!("controllers shut down");
        }
        _ = join_all(reflectors) => {
            tracing::warn!("reflectors exited unexpectedly");
        }
    }

    Ok(())
}
