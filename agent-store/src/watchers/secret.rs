use std::sync::Arc;

use agent_core::cluster::ClusterInfoCache;
use agent_core::lifecycle::{LifecycleHandle, WakeSender};
use k8s_openapi::api::core::v1::Secret;

use crate::buffer::ReportBuffer;
use crate::kind::Kind;
use crate::watchers::{pick, run};

/// Secret data and stringData are never lifted into the buffered entry, only `type` — the
/// collector reports Secret existence and rotation, not contents.
pub async fn watch(
    client: kube::Client,
    buffer: Arc<ReportBuffer>,
    wake_tx: WakeSender,
    lifecycle: LifecycleHandle,
    cluster_info: ClusterInfoCache,
) {
    run::<Secret>(Kind::Secret, client, buffer, wake_tx, lifecycle, cluster_info, |value| pick(value, &["type"])).await
}
