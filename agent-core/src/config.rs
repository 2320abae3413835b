use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{CA_CONFIG_ENV_VAR, DEFAULT_CLUSTER_CONFIG_PATH};
use crate::errors::ConfigError;

/// The subset of the cluster config document that the report cares about. Copied verbatim into
/// `installationData` on the first report (spec.md §3). Grounded on
/// `original_source/watch/jsonformat.go`'s `setInstallationData`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub cluster_provider: String,
    #[serde(default)]
    pub relevant_image_vulnerabilities_enabled: bool,
    #[serde(default)]
    pub relevant_image_vulnerabilities_configuration: String,
    #[serde(default)]
    pub storage_enabled: bool,
    #[serde(default)]
    pub image_vulnerabilities_scanning_enabled: bool,
    #[serde(default)]
    pub posture_scan_enabled: bool,
    #[serde(default)]
    pub otel_collector_enabled: bool,
}

impl ClusterConfig {
    pub fn load_from_env() -> Result<ClusterConfig, ConfigError> {
        let path = std::env::var(CA_CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CLUSTER_CONFIG_PATH.into());
        Self::load(&path)
    }

    pub fn load(path: &str) -> Result<ClusterConfig, ConfigError> {
        load_json(path)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceDiscoveryDocument {
    services: Vec<ServiceDiscoveryEntry>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
struct ServiceDiscoveryEntry {
    name: String,
    url: String,
}

impl ServiceDiscoveryDocument {
    pub fn load(path: &str) -> Result<ServiceDiscoveryDocument, ConfigError> {
        load_json(path)
    }

    /// Best-effort lookup of the report-receiver websocket URL; callers decide what to do if
    /// it's absent (fatal at startup, per SPEC_FULL.md §6).
    pub fn report_receiver_websocket_url(&self) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.name == "report-receiver-ws")
            .map(|s| s.url.as_str())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub account: String,
}

impl Credentials {
    /// A missing or unreadable credentials file is not fatal; callers fall back to empty
    /// credentials and keep going (matches `original_source/main.go`'s handling).
    pub fn load_best_effort(path: &str) -> Credentials {
        match load_json(path) {
            Ok(creds) => creds,
            Err(err) => {
                tracing::warn!(%err, path, "failed to load credentials, continuing with empty credentials");
                Credentials::default()
            },
        }
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &str) -> Result<T, ConfigError> {
    let data = fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read { path: path.into(), source })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse { path: path.into(), source })
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    use super::*;

    #[test]
    fn test_cluster_config_round_trip() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("clusterData.json");
        file.write_str(
            r#"{
            "namespace": "kubescape",
            "clusterName": "my-cluster",
            "clusterProvider": "eks",
            "storageEnabled": true,
            "relevantImageVulnerabilitiesConfiguration": "disable"
        }"#,
        )
        .unwrap();

        let config = ClusterConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.namespace, "kubescape");
        assert_eq!(config.cluster_name, "my-cluster");
        assert!(config.storage_enabled);
        assert!(!config.posture_scan_enabled);
        assert_eq!(config.relevant_image_vulnerabilities_configuration, "disable");
    }

    #[test]
    fn test_service_discovery_lookup() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("services.json");
        file.write_str(r#"{"services": [{"name": "report-receiver-ws", "url": "wss://example.com/report"}]}"#).unwrap();

        let doc = ServiceDiscoveryDocument::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(doc.report_receiver_websocket_url(), Some("wss://example.com/report"));
    }

    #[test]
    fn test_credentials_missing_file_is_non_fatal() {
        let creds = Credentials::load_best_effort("/nonexistent/path/credentials.json");
        assert_eq!(creds, Credentials::default());
    }
}
