use serde_json::Value;

/// Strips `metadata.managedFields` from an already-serialized object. Every kind watcher runs
/// its objects through this before they ever reach the report buffer (spec.md §3: "Managed-field
/// metadata MUST be stripped before buffering").
pub fn strip_managed_fields(value: &mut Value) {
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("managedFields");
    }
}

/// `namespace/name` for namespaced kinds, bare `name` for cluster-scoped ones (Nodes,
/// Namespaces). Falls back to `metadata.generateName` when `metadata.name` is absent, which can
/// happen for objects still being admitted.
pub fn namespaced_name(value: &Value) -> Option<String> {
    let metadata = value.get("metadata")?;
    let name = metadata
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| metadata.get("generateName").and_then(Value::as_str))?;

    match metadata.get("namespace").and_then(Value::as_str) {
        Some(ns) => Some(format!("{ns}/{name}")),
        None => Some(name.to_string()),
    }
}

pub fn generate_name(value: &Value) -> Option<String> {
    value.get("metadata")?.get("generateName")?.as_str().map(str::to_string)
}

pub fn uid(value: &Value) -> Option<String> {
    value.get("metadata")?.get("uid")?.as_str().map(str::to_string)
}

pub fn resource_version(value: &Value) -> Option<String> {
    value.get("metadata")?.get("resourceVersion")?.as_str().map(str::to_string)
}

pub fn creation_timestamp(value: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    value
        .get("metadata")?
        .get("creationTimestamp")?
        .as_str()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_strip_managed_fields() {
        let mut obj = json!({"metadata": {"name": "n", "managedFields": [{"manager": "kubectl"}]}});
        strip_managed_fields(&mut obj);
        assert!(obj["metadata"].get("managedFields").is_none());
        assert_eq!(obj["metadata"]["name"], "n");
    }

    #[test]
    fn test_namespaced_name_with_namespace() {
        let obj = json!({"metadata": {"name": "p1", "namespace": "default"}});
        assert_eq!(namespaced_name(&obj), Some("default/p1".to_string()));
    }

    #[test]
    fn test_namespaced_name_cluster_scoped() {
        let obj = json!({"metadata": {"name": "node-1"}});
        assert_eq!(namespaced_name(&obj), Some("node-1".to_string()));
    }

    #[test]
    fn test_namespaced_name_falls_back_to_generate_name() {
        let obj = json!({"metadata": {"generateName": "job-", "namespace": "ns"}});
        assert_eq!(namespaced_name(&obj), Some("ns/job-".to_string()));
    }
}
