use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants::{AWS_METADATA_URL, AZURE_METADATA_URL, CLOUD_METADATA_TIMEOUT_MS, GCP_METADATA_URL};

/// Attached to the first report only (spec.md §3). `git_version` already has the cloud vendor
/// tag appended (`retrieve_cluster_info`), matching `original_source/watch/clusterinforetriever.go`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterApiServerVersion {
    pub git_version: String,
}

pub async fn cluster_version(client: &kube::Client) -> anyhow::Result<ClusterApiServerVersion> {
    let info = client.apiserver_version().await?;
    Ok(ClusterApiServerVersion { git_version: info.git_version })
}

/// Best-effort probe of well-known instance metadata endpoints. Returns an empty string on
/// failure or when none of the providers respond within the timeout — never an error, since a
/// missing vendor tag is not fatal to producing a report.
pub async fn detect_cloud_vendor() -> String {
    let client = match reqwest::Client::builder().timeout(Duration::from_millis(CLOUD_METADATA_TIMEOUT_MS)).build() {
        Ok(c) => c,
        Err(_) => return String::new(),
    };

    if probe(&client, AWS_METADATA_URL, &[]).await {
        return "aws".into();
    }
    if probe(&client, GCP_METADATA_URL, &[("Metadata-Flavor", "Google")]).await {
        return "gcp".into();
    }
    if probe(&client, AZURE_METADATA_URL, &[("Metadata", "true")]).await {
        return "azure".into();
    }
    String::new()
}

async fn probe(client: &reqwest::Client, url: &str, headers: &[(&str, &str)]) -> bool {
    let mut req = client.get(url);
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    matches!(req.send().await, Ok(resp) if resp.status().is_success())
}

/// Composes `cluster_version` and `detect_cloud_vendor`, appending the vendor tag to
/// `gitVersion` with a `;` separator when present (spec.md §4.3). Called once at process start
/// and again at the top of every kind watcher's restart loop.
pub async fn retrieve_cluster_info(client: &kube::Client) -> anyhow::Result<(ClusterApiServerVersion, String)> {
    let mut version = cluster_version(client).await?;
    let vendor = detect_cloud_vendor().await;
    if !vendor.is_empty() {
        version.git_version = format!("{};{}", version.git_version, vendor);
    }
    Ok((version, vendor))
}

/// Shared cache refreshed by every kind watcher on restart and read by the Delivery Coordinator
/// when assembling the first report (spec.md §4.2 step 1, §4.3). A `RwLock` rather than the
/// buffer's `DashMap` is enough here: there is exactly one writer role (whichever watcher is
/// restarting) at a time and many readers.
pub type ClusterInfoCache = Arc<RwLock<Option<(ClusterApiServerVersion, String)>>>;

pub fn new_cluster_info_cache() -> ClusterInfoCache {
    Arc::new(RwLock::new(None))
}

/// Re-probes the API server version and cloud vendor and stores the result for the coordinator to
/// pick up on its next drain. Failures are logged and leave the previous value in place.
pub async fn refresh_cluster_info(cache: &ClusterInfoCache, client: &kube::Client) {
    match retrieve_cluster_info(client).await {
        Ok(info) => *cache.write().await = Some(info),
        Err(err) => tracing::warn!(%err, "failed to refresh cluster info, keeping previous value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_version_gets_vendor_suffix() {
        let mut version = ClusterApiServerVersion { git_version: "v1.30.0".into() };
        let vendor = "aws";
        version.git_version = format!("{};{}", version.git_version, vendor);
        assert_eq!(version.git_version, "v1.30.0;aws");
    }
}
