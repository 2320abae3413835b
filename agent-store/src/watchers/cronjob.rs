use std::sync::Arc;

use agent_core::cluster::ClusterInfoCache;
use agent_core::lifecycle::{LifecycleHandle, WakeSender};
use k8s_openapi::api::batch::v1::CronJob;

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
    run::<CronJob>(Kind::CronJob, client, buffer, wake_tx, lifecycle, cluster_info, |value| {
        pick(value, &["spec", "status"])
    })
    .await
}
