use std::sync::Arc;

use agent_core::cluster::new_cluster_info_cache;
use agent_core::config::{ClusterConfig, Credentials, ServiceDiscoveryDocument};
use agent_core::constants::{CREDENTIALS_PATH, IGNORE_VERIFY_ENV_VAR, SERVICE_DISCOVERY_PATH};
use agent_core::lifecycle::{wake_channel, LifecycleHandle};
use agent_core::logging;
use agent_core::prelude::EmptyResult;
use agent_store::watchers::{cronjob, namespace, node, pod, secret, service};
use agent_store::ReportBuffer;
use agent_transport::{coordinator, WebSocketTransport};
use clap::Parser;
use kube::Client;
use tokio::task::JoinSet;
use tracing::{info, instrument};
use url::Url;

#[derive(Parser, Debug)]
struct Options {
    /// Overrides the CA_CONFIG path lookup.
    #[arg(short, long)]
    config_file: Option<String>,

    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

#[instrument(err)]
async fn run(args: Options) -> EmptyResult {
    let cluster_config = match &args.config_file {
        Some(path) => ClusterConfig::load(path)?,
        None => ClusterConfig::load_from_env()?,
    };
    let services = ServiceDiscoveryDocument::load(SERVICE_DISCOVERY_PATH).unwrap_or_else(|err| {
        tracing::warn!(%err, "failed to load service discovery document, no services known");
        Default::default()
    });
    let credentials = Credentials::load_best_effort(CREDENTIALS_PATH);

    let receiver_url = services
        .report_receiver_websocket_url()
        .ok_or_else(|| anyhow::anyhow!("no report-receiver-ws entry in the service discovery document"))?;
    let url = Url::parse(receiver_url)?;
    let tls_insecure = std::env::var(IGNORE_VERIFY_ENV_VAR).map(|v| !v.is_empty()).unwrap_or(false);

    let client = Client::try_default().await?;

    let buffer = Arc::new(ReportBuffer::new());
    let (wake_tx, wake_rx) = wake_channel();
    let lifecycle = LifecycleHandle::new(wake_tx.clone());
    let cluster_info = new_cluster_info_cache();

    let mut watchers = JoinSet::new();
    watchers.spawn(node::watch(client.clone(), buffer.clone(), wake_tx.clone(), lifecycle.clone(), cluster_info.clone()));
    watchers.spawn(pod::watch(client.clone(), buffer.clone(), wake_tx.clone(), lifecycle.clone(), cluster_info.clone()));
    watchers.spawn(service::watch(client.clone(), buffer.clone(), wake_tx.clone(), lifecycle.clone(), cluster_info.clone()));
    watchers.spawn(secret::watch(client.clone(), buffer.clone(), wake_tx.clone(), lifecycle.clone(), cluster_info.clone()));
    watchers.spawn(namespace::watch(client.clone(), buffer.clone(), wake_tx.clone(), lifecycle.clone(), cluster_info.clone()));
    watchers.spawn(cronjob::watch(client.clone(), buffer.clone(), wake_tx.clone(), lifecycle.clone(), cluster_info.clone()));

    let transport = WebSocketTransport::connect(url, &credentials.account, &cluster_config.cluster_name, tls_insecure).await?;

    let installation_data = serde_json::to_value(&cluster_config).ok();
    let coordinator_lifecycle = lifecycle.clone();
    let coordinator_buffer = buffer.clone();
    let coordinator_handle =
        tokio::spawn(coordinator::run(coordinator_buffer, wake_rx, coordinator_lifecycle, cluster_info, installation_data, transport));

    let shutdown_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, cancelling");
            shutdown_lifecycle.cancel();
        }
    });

    tokio::select! {
        _ = watchers.join_all() => {},
        _ = coordinator_handle => {},
    }

    Ok(())
}

#[tokio::main]
async fn main() -> EmptyResult {
    let args = Options::parse();
    logging::setup(&args.verbosity);
    logging::log_release_banner();
    run(args).await
}
