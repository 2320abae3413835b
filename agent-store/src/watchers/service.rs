use std::sync::Arc;

use agent_core::cluster::ClusterInfoCache;
use agent_core::lifecycle::{LifecycleHandle, WakeSender};
use k8s_openapi::api::core::v1::Service;

use crate::buffer::ReportBuffer;
use crate::kind::Kind;
use crate::watchers::{pick, run};

pub async fn watch(
    client: kube::Client,
    buffer: Arc<ReportBuffer>,
    wake_tx: WakeSender,
    lifecycle: LifecycleHandle,
    cluster_info: ClusterInfoCache,
) {
    run::<Service>(Kind::Service, client, buffer, wake_tx, lifecycle, cluster_info, |value| {
        pick(value, &["spec", "status"])
    })
    .await
}
