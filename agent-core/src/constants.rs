// Env vars (see SPEC_FULL.md §6)
pub const CA_CONFIG_ENV_VAR: &str = "CA_CONFIG";
pub const OTEL_COLLECTOR_SVC_ENV_VAR: &str = "OTEL_COLLECTOR_SVC";
pub const RELEASE_ENV_VAR: &str = "RELEASE";
pub const IGNORE_VERIFY_ENV_VAR: &str = "CA_IGNORE_VERIFY_CACLI";
pub const PRINT_REPORT_ENV_VAR: &str = "PRINT_REPORT";

// On-disk locations
pub const DEFAULT_CLUSTER_CONFIG_PATH: &str = "/etc/config/clusterData.json";
pub const SERVICE_DISCOVERY_PATH: &str = "/etc/config/services.json";
pub const CREDENTIALS_PATH: &str = "/etc/credentials";

// Transport timing (spec.md §4.5, §5)
pub const DIAL_MAX_ATTEMPTS: u32 = 5;
pub const DIAL_BASE_STARTUP_SECS: u64 = 30;
pub const DIAL_BASE_RECONNECT_SECS: u64 = 60;
pub const PING_INTERVAL_SECS: u64 = 10;
pub const MAX_MISSED_PINGS: u32 = 2;

// Delivery coordinator (spec.md §4.4)
pub const FIRST_REPORT_SETTLE_SECS: u64 = 5;

// Cloud vendor metadata endpoints (best-effort probes, short timeout each)
pub const CLOUD_METADATA_TIMEOUT_MS: u64 = 500;
pub const AWS_METADATA_URL: &str = "http://169.254.169.254/latest/meta-data/";
pub const GCP_METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1/";
pub const AZURE_METADATA_URL: &str = "http://169.254.169.254/metadata/instance?api-version=2021-02-01";
