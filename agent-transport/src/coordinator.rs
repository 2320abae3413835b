use std::sync::Arc;
use std::time::Duration;

use agent_core::cluster::ClusterInfoCache;
use agent_core::constants::{FIRST_REPORT_SETTLE_SECS, PRINT_REPORT_ENV_VAR};
use agent_core::lifecycle::{LifecycleHandle, WakeReceiver};
use agent_store::buffer::is_empty_payload;
use agent_store::{ReportBuffer, ReportHeader};
use serde_json::Value;
use tracing::info;

use crate::socket::WebSocketTransport;

/// Drains the buffer, hands non-empty snapshots to the transport, and waits to be woken again
/// (spec.md §4.4). Runs until `lifecycle.is_cancelled()`.
pub async fn run(
    buffer: Arc<ReportBuffer>,
    mut wake_rx: WakeReceiver,
    lifecycle: LifecycleHandle,
    cluster_info: ClusterInfoCache,
    installation_data: Option<Value>,
    transport: WebSocketTransport,
) {
    info!(seconds = FIRST_REPORT_SETTLE_SECS, "waiting for the first batch of cluster data to aggregate");
    tokio::time::sleep(Duration::from_secs(FIRST_REPORT_SETTLE_SECS)).await;

    let mut first_report = true;

    while !lifecycle.is_cancelled() {
        let header = build_header(first_report, &cluster_info, &installation_data).await;

        if let Some(bytes) = buffer.drain_into_document(header) {
            if !is_empty_payload(&bytes) {
                print_report_if_enabled(&bytes);
                transport.send(bytes).await;
                first_report = false;
            }
        }

        if lifecycle.is_cancelled() {
            break;
        }
        wake_rx.recv().await;
    }
}

/// `PRINT_REPORT=true` dumps every outbound report to the log (spec.md §6), mirroring
/// `original_source/watch/websocket.go`'s `ListenerAndSender` debug hook.
fn print_report_if_enabled(bytes: &[u8]) {
    if std::env::var(PRINT_REPORT_ENV_VAR).as_deref() == Ok("true") {
        info!(report = %String::from_utf8_lossy(bytes), "outbound report");
    }
}

async fn build_header(first_report: bool, cluster_info: &ClusterInfoCache, installation_data: &Option<Value>) -> ReportHeader {
    if !first_report {
        return ReportHeader { first_report: false, ..Default::default() };
    }

    let snapshot = cluster_info.read().await.clone();
    ReportHeader {
        first_report: true,
        cluster_api_server_version: snapshot.as_ref().map(|(version, _)| version.clone()),
        cloud_vendor: snapshot.as_ref().map(|(_, vendor)| vendor.clone()),
        installation_data: installation_data.clone(),
    }
}
