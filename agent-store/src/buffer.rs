use std::collections::HashMap;

use agent_core::cluster::ClusterApiServerVersion;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::entry::Entry;
use crate::kind::{EntryState, Kind};

/// The canonical suppressed-payload strings (spec.md §3 invariant I5, §4.1).
const EMPTY_OBJECT: &[u8] = b"{}";
const EMPTY_FIRST_REPORT: &[u8] = br#"{"firstReport":true}"#;

/// Header fields attached by the Delivery Coordinator; only populated while `firstReport` is
/// still true (spec.md §4.4).
#[derive(Default)]
pub struct ReportHeader {
    pub first_report: bool,
    pub cluster_api_server_version: Option<ClusterApiServerVersion>,
    pub cloud_vendor: Option<String>,
    pub installation_data: Option<Value>,
}

#[derive(Default, Serialize)]
struct ObjectData {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    create: Vec<Entry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    update: Vec<Entry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    delete: Vec<Entry>,
}

impl ObjectData {
    fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    fn push(&mut self, state: EntryState, entry: Entry) {
        match state {
            EntryState::Created => self.create.push(entry),
            EntryState::Updated => self.update.push(entry),
            EntryState::Deleted => self.delete.push(entry),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    first_report: bool,
    #[serde(rename = "clusterAPIServerVersion", skip_serializing_if = "Option::is_none")]
    cluster_api_server_version: Option<ClusterApiServerVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cloud_vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    installation_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    node: Option<ObjectData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pod: Option<ObjectData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<ObjectData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<ObjectData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<ObjectData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cronjob: Option<ObjectData>,
}

/// Mutable in-memory snapshot partitioned by kind x {create,update,delete} (spec.md §4.1). Each
/// entry is keyed by a freshly generated v4 UUID so concurrent `add` calls for different (or the
/// same) kind never contend on a shared index — this is the REDESIGN FLAG in spec.md §9 asking
/// for "an explicit concurrent mapping held as a field" rather than a struct embedding a
/// concurrent map, grounded on `vectordotdev-vector`'s `dashmap` + `uuid` usage for the same
/// "order incidental, writer contention removed" shape.
#[derive(Default)]
pub struct ReportBuffer {
    entries: DashMap<Uuid, (Kind, EntryState, Entry)>,
}

impl ReportBuffer {
    pub fn new() -> ReportBuffer {
        ReportBuffer::default()
    }

    /// Safe for concurrent callers; never blocks on a concurrent `add` for a different kind
    /// (spec.md §4.1 Guarantees).
    pub fn add(&self, kind: Kind, state: EntryState, entry: Entry) {
        self.entries.insert(Uuid::new_v4(), (kind, state, entry));
    }

    /// Two-phase mark-then-remove drain (spec.md §4.1 "Why this shape"). Entries visible at
    /// snapshot time are serialized and then removed by the ids collected at snapshot time;
    /// entries added during serialization are invisible to this snapshot and therefore survive
    /// untouched for the next cycle (invariant I4, property P3).
    ///
    /// Returns `None` on a marshal failure (spec.md §7 error #3): the cycle is dropped but the
    /// buffer is left untouched so the next wake retries the same entries.
    pub fn drain_into_document(&self, header: ReportHeader) -> Option<Vec<u8>> {
        let mut grouped: HashMap<Kind, ObjectData> = HashMap::new();
        let mut seen_ids = Vec::new();

        for item in self.entries.iter() {
            let (kind, state, entry) = item.value().clone();
            grouped.entry(kind).or_default().push(state, entry);
            seen_ids.push(*item.key());
        }

        let doc = Document {
            first_report: header.first_report,
            cluster_api_server_version: header.cluster_api_server_version,
            cloud_vendor: header.cloud_vendor,
            installation_data: header.installation_data,
            node: take_non_empty(&mut grouped, Kind::Node),
            pod: take_non_empty(&mut grouped, Kind::Pod),
            service: take_non_empty(&mut grouped, Kind::Service),
            secret: take_non_empty(&mut grouped, Kind::Secret),
            namespace: take_non_empty(&mut grouped, Kind::Namespace),
            cronjob: take_non_empty(&mut grouped, Kind::CronJob),
        };

        let bytes = match serde_json::to_vec(&doc) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(%err, "failed to marshal report snapshot, dropping this cycle");
                return None;
            },
        };

        for id in seen_ids {
            self.entries.remove(&id);
        }

        Some(bytes)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn take_non_empty(grouped: &mut HashMap<Kind, ObjectData>, kind: Kind) -> Option<ObjectData> {
    match grouped.remove(&kind) {
        Some(data) if !data.is_empty() => Some(data),
        _ => None,
    }
}

/// `true` for inputs of length 0, `{}`, or `{"firstReport":true}` (spec.md §4.1, P7).
pub fn is_empty_payload(bytes: &[u8]) -> bool {
    bytes.is_empty() || bytes == EMPTY_OBJECT || bytes == EMPTY_FIRST_REPORT
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty(b"".as_slice(), true)]
    #[case::empty_object(b"{}".as_slice(), true)]
    #[case::empty_first_report(br#"{"firstReport":true}"#.as_slice(), true)]
    #[case::non_empty(br#"{"firstReport":true,"cloudVendor":"aws"}"#.as_slice(), false)]
    fn test_is_empty_payload(#[case] input: &[u8], #[case] expected: bool) {
        assert_eq!(is_empty_payload(input), expected);
    }

    // P1: draining an empty buffer twice both classify as empty-first-report.
    #[test]
    fn test_drain_idempotence_on_empty() {
        let buffer = ReportBuffer::new();

        let first = buffer.drain_into_document(ReportHeader { first_report: true, ..Default::default() }).unwrap();
        assert!(is_empty_payload(&first));

        let second = buffer.drain_into_document(ReportHeader { first_report: true, ..Default::default() }).unwrap();
        assert!(is_empty_payload(&second));
    }

    // P2: first-report gating.
    #[test]
    fn test_first_report_gating() {
        let buffer = ReportBuffer::new();
        buffer.add(Kind::Node, EntryState::Created, Entry::full("n1", "u1", "1", Value::Null));

        let first = buffer
            .drain_into_document(ReportHeader {
                first_report: true,
                cluster_api_server_version: Some(ClusterApiServerVersion { git_version: "v1.30.0".into() }),
                cloud_vendor: Some("aws".into()),
                installation_data: Some(serde_json::json!({"namespace": "kubescape"})),
            })
            .unwrap();
        let value: Value = serde_json::from_slice(&first).unwrap();
        assert_eq!(value["clusterAPIServerVersion"]["gitVersion"], "v1.30.0");
        assert_eq!(value["cloudVendor"], "aws");
        assert_eq!(value["installationData"]["namespace"], "kubescape");
        assert_eq!(value["node"]["create"][0]["name"], "n1");

        buffer.add(Kind::Node, EntryState::Created, Entry::full("n2", "u2", "1", Value::Null));
        let second = buffer.drain_into_document(ReportHeader { first_report: false, ..Default::default() }).unwrap();
        let value: Value = serde_json::from_slice(&second).unwrap();
        assert!(value.get("clusterAPIServerVersion").is_none());
        assert!(value.get("cloudVendor").is_none());
        assert_eq!(value["node"]["create"][0]["name"], "n2");
    }

    #[test]
    fn test_drain_removes_only_entries_visible_at_snapshot_time() {
        let buffer = ReportBuffer::new();
        buffer.add(Kind::Pod, EntryState::Created, Entry::full("p1", "u1", "1", Value::Null));

        let doc = buffer.drain_into_document(ReportHeader::default()).unwrap();
        let value: Value = serde_json::from_slice(&doc).unwrap();
        assert_eq!(value["pod"]["create"][0]["name"], "p1");
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_microservice_key_never_appears() {
        let buffer = ReportBuffer::new();
        buffer.add(Kind::CronJob, EntryState::Created, Entry::full("cj1", "u1", "1", Value::Null));
        let doc = buffer.drain_into_document(ReportHeader::default()).unwrap();
        let value: Value = serde_json::from_slice(&doc).unwrap();
        assert!(value.get("microservice").is_none());
        assert_eq!(value["cronjob"]["create"][0]["name"], "cj1");
    }
}
