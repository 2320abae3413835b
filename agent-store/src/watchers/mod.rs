use std::collections::HashSet;
use std::sync::Arc;

use agent_core::cluster::{refresh_cluster_info, ClusterInfoCache};
use agent_core::k8s::{creation_timestamp, generate_name, namespaced_name, resource_version, strip_managed_fields, uid};
use agent_core::lifecycle::{try_wake, LifecycleHandle, WakeSender};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::runtime::watcher::{watcher, Event};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::buffer::ReportBuffer;
use crate::entry::Entry;
use crate::identity::IdentityMap;
use crate::kind::{EntryState, Kind};

pub mod cronjob;
pub mod namespace;
pub mod node;
pub mod pod;
pub mod secret;
pub mod service;

/// Shared restartable-loop skeleton every kind watcher instantiates with its own typed API and
/// status-field extractor (spec.md §4.2: "Each watcher has the same skeleton, parameterized by
/// (kind, apiStream)"). Grounded on `lib/rust/watch/watcher.rs`'s `Watcher::start` select loop and
/// its `Event::{Applied,Deleted,Restarted}` match, generalized from simkube's per-object-type
/// handler split into one generic over the status-extraction closure.
///
/// Runs until `lifecycle.is_cancelled()`. A stream error, a decode failure surfaced as a stream
/// error, or a `newStateChan` signal all fall through to the outer loop, which refreshes cluster
/// info and reopens the watch (spec.md §4.2).
pub async fn run<K>(
    kind: Kind,
    client: kube::Client,
    buffer: Arc<ReportBuffer>,
    wake_tx: WakeSender,
    lifecycle: LifecycleHandle,
    cluster_info: ClusterInfoCache,
    extract_status: impl Fn(&Value) -> Value,
) where
    K: kube::Resource<DynamicType = ()> + Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let api: kube::Api<K> = kube::Api::all(client.clone());
    let mut reset_rx = lifecycle.register_watcher();
    let mut identity = IdentityMap::new();
    let mut last_watch_event_creation_time: Option<DateTime<Utc>> = None;

    while !lifecycle.is_cancelled() {
        refresh_cluster_info(&cluster_info, &client).await;

        let mut stream = Box::pin(watcher(api.clone(), Default::default()));

        'stream: loop {
            if lifecycle.is_cancelled() {
                break 'stream;
            }

            tokio::select! {
                _ = reset_rx.recv() => break 'stream,
                item = stream.next() => match item {
                    None => break 'stream,
                    Some(Err(err)) => {
                        warn!(kind = kind.wire_key(), %err, "watch stream error, restarting");
                        last_watch_event_creation_time = Some(Utc::now());
                        break 'stream;
                    },
                    Some(Ok(event)) => handle_event(
                        kind,
                        event,
                        &mut identity,
                        &buffer,
                        &wake_tx,
                        &extract_status,
                        &last_watch_event_creation_time,
                    ),
                },
            }
        }
    }
}

fn handle_event<K>(
    kind: Kind,
    event: Event<K>,
    identity: &mut IdentityMap,
    buffer: &ReportBuffer,
    wake_tx: &WakeSender,
    extract_status: &impl Fn(&Value) -> Value,
    last_watch_event_creation_time: &Option<DateTime<Utc>>,
) where
    K: Serialize + std::fmt::Debug,
{
    match event {
        Event::Applied(obj) => {
            handle_applied(kind, &obj, identity, buffer, wake_tx, extract_status, last_watch_event_creation_time)
        },
        Event::Deleted(obj) => handle_deleted(kind, &obj, identity, buffer, wake_tx),
        Event::Restarted(objs) => {
            handle_restarted(kind, objs, identity, buffer, wake_tx, extract_status, last_watch_event_creation_time)
        },
    }
}

fn handle_applied<K>(
    kind: Kind,
    obj: &K,
    identity: &mut IdentityMap,
    buffer: &ReportBuffer,
    wake_tx: &WakeSender,
    extract_status: &impl Fn(&Value) -> Value,
    last_watch_event_creation_time: &Option<DateTime<Utc>>,
) where
    K: Serialize + std::fmt::Debug,
{
    let Ok(mut value) = serde_json::to_value(obj) else {
        error!(kind = kind.wire_key(), ?obj, "failed to serialize watched object, dropping event");
        return;
    };
    strip_managed_fields(&mut value);

    let Some(name) = namespaced_name(&value) else {
        warn!(kind = kind.wire_key(), "watched object has no name, dropping event");
        return;
    };
    let gen_name = generate_name(&value);
    let object_uid = uid(&value).unwrap_or_default();
    let rv = resource_version(&value).unwrap_or_default();
    let status = extract_status(&value);

    // Already known: this is a Modified event regardless of how long ago we first saw it.
    if identity.update(&name, gen_name.as_deref(), value.clone()).is_some() {
        buffer.add(kind, EntryState::Updated, Entry::full(&name, &object_uid, &rv, status));
        try_wake(wake_tx);
        return;
    }

    // Not known yet. A reconnect delivers every live object again; one older than our last
    // reconnect was already reported in a previous cycle, so track it silently instead of
    // re-announcing it as newly created.
    let created_before_reconnect = match (creation_timestamp(&value), last_watch_event_creation_time) {
        (Some(created), Some(cutoff)) => created < *cutoff,
        _ => false,
    };

    identity.insert(name.clone(), value);

    if !created_before_reconnect {
        buffer.add(kind, EntryState::Created, Entry::full(&name, &object_uid, &rv, status));
        try_wake(wake_tx);
    }
}

fn handle_deleted<K>(kind: Kind, obj: &K, identity: &mut IdentityMap, buffer: &ReportBuffer, wake_tx: &WakeSender)
where
    K: Serialize,
{
    let Ok(mut value) = serde_json::to_value(obj) else {
        error!(kind = kind.wire_key(), "failed to serialize deleted object, dropping event");
        return;
    };
    strip_managed_fields(&mut value);

    let Some(name) = namespaced_name(&value) else { return };
    let gen_name = generate_name(&value);

    // Best-effort even when the identity map never saw this object (spec.md invariant I2).
    identity.remove(&name, gen_name.as_deref());
    buffer.add(kind, EntryState::Deleted, Entry::Name(name));
    try_wake(wake_tx);
}

/// Lifts a handful of top-level keys out of a stripped object into the status blob a per-kind
/// watcher buffers alongside `name`/`uid`/`resourceVersion`.
pub(crate) fn pick(value: &Value, keys: &[&str]) -> Value {
    let mut map = serde_json::Map::new();
    for key in keys {
        if let Some(v) = value.get(*key) {
            map.insert((*key).to_string(), v.clone());
        }
    }
    Value::Object(map)
}

fn handle_restarted<K>(
    kind: Kind,
    objs: Vec<K>,
    identity: &mut IdentityMap,
    buffer: &ReportBuffer,
    wake_tx: &WakeSender,
    extract_status: &impl Fn(&Value) -> Value,
    last_watch_event_creation_time: &Option<DateTime<Utc>>,
) where
    K: Serialize + std::fmt::Debug,
{
    let mut seen: HashSet<String> = HashSet::new();
    for obj in &objs {
        if let Some(name) = serde_json::to_value(obj).ok().as_ref().and_then(namespaced_name) {
            seen.insert(name);
        }
        handle_applied(kind, obj, identity, buffer, wake_tx, extract_status, last_watch_event_creation_time);
    }

    let stale: Vec<String> = identity.names().filter(|n| !seen.contains(*n)).map(str::to_string).collect();
    for name in stale {
        identity.remove(&name, None);
        buffer.add(kind, EntryState::Deleted, Entry::Name(name));
        try_wake(wake_tx);
    }
}

#[cfg(test)]
mod tests {
    use agent_core::lifecycle::wake_channel;
    use serde::Serialize;
    use serde_json::json;

    use super::*;
    use crate::buffer::ReportHeader;

    #[derive(Clone, Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct TestMeta {
        name: String,
        uid: String,
        resource_version: String,
        creation_timestamp: Option<String>,
    }

    #[derive(Clone, Debug, Serialize)]
    struct TestObj {
        metadata: TestMeta,
        status: serde_json::Value,
    }

    fn obj(name: &str, rv: &str, created: &str) -> TestObj {
        TestObj {
            metadata: TestMeta {
                name: name.into(),
                uid: format!("uid-{name}"),
                resource_version: rv.into(),
                creation_timestamp: Some(created.into()),
            },
            status: json!({"phase": "Ready"}),
        }
    }

    fn no_op_extract(value: &Value) -> Value {
        pick(value, &["status"])
    }

    #[test]
    fn test_pick_lifts_only_requested_keys() {
        let value = json!({"spec": {"a": 1}, "status": {"b": 2}, "metadata": {}});
        let picked = pick(&value, &["status"]);
        assert_eq!(picked, json!({"status": {"b": 2}}));
    }

    #[test]
    fn test_applied_then_applied_again_is_update_not_create() {
        let mut identity = IdentityMap::new();
        let buffer = ReportBuffer::new();
        let (wake_tx, _wake_rx) = wake_channel();

        handle_applied(Kind::Node, &obj("n1", "1", "2024-01-01T00:00:00Z"), &mut identity, &buffer, &wake_tx, &no_op_extract, &None);
        handle_applied(Kind::Node, &obj("n1", "2", "2024-01-01T00:00:00Z"), &mut identity, &buffer, &wake_tx, &no_op_extract, &None);

        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_applied_before_reconnect_cutoff_is_tracked_but_not_announced() {
        let mut identity = IdentityMap::new();
        let buffer = ReportBuffer::new();
        let (wake_tx, _wake_rx) = wake_channel();
        let cutoff = Some(chrono::DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc));

        handle_applied(Kind::Pod, &obj("old-pod", "1", "2024-01-01T00:00:00Z"), &mut identity, &buffer, &wake_tx, &no_op_extract, &cutoff);

        assert_eq!(buffer.len(), 0);
        assert!(identity.get("old-pod", None).is_some());
    }

    #[test]
    fn test_applied_after_reconnect_cutoff_is_announced() {
        let mut identity = IdentityMap::new();
        let buffer = ReportBuffer::new();
        let (wake_tx, _wake_rx) = wake_channel();
        let cutoff = Some(chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc));

        handle_applied(Kind::Pod, &obj("new-pod", "1", "2024-06-01T00:00:00Z"), &mut identity, &buffer, &wake_tx, &no_op_extract, &cutoff);

        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_deleted_is_best_effort_for_unknown_objects() {
        let mut identity = IdentityMap::new();
        let buffer = ReportBuffer::new();
        let (wake_tx, _wake_rx) = wake_channel();

        handle_deleted(Kind::Secret, &obj("ghost", "1", "2024-01-01T00:00:00Z"), &mut identity, &buffer, &wake_tx);

        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_restarted_diffs_against_identity_and_deletes_missing() {
        let mut identity = IdentityMap::new();
        let buffer = ReportBuffer::new();
        let (wake_tx, _wake_rx) = wake_channel();

        handle_applied(Kind::Service, &obj("svc-a", "1", "2024-01-01T00:00:00Z"), &mut identity, &buffer, &wake_tx, &no_op_extract, &None);
        handle_applied(Kind::Service, &obj("svc-b", "1", "2024-01-01T00:00:00Z"), &mut identity, &buffer, &wake_tx, &no_op_extract, &None);
        let drained = buffer.drain_into_document(ReportHeader::default());
        assert!(drained.is_some());

        // Only svc-a survives the relist; svc-b must be synthesized as deleted.
        handle_restarted(
            Kind::Service,
            vec![obj("svc-a", "2", "2024-01-01T00:00:00Z")],
            &mut identity,
            &buffer,
            &wake_tx,
            &no_op_extract,
            &None,
        );

        let doc = buffer.drain_into_document(ReportHeader::default()).unwrap();
        let value: Value = serde_json::from_slice(&doc).unwrap();
        assert_eq!(value["service"]["update"][0]["name"], "svc-a");
        assert_eq!(value["service"]["delete"][0], "svc-b");
    }
}
