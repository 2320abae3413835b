pub mod cluster;
pub mod config;
pub mod constants;
pub mod errors;
pub mod k8s;
pub mod lifecycle;
pub mod logging;

pub mod prelude {
    pub use k8s_openapi::api::batch::v1 as batchv1;
    pub use k8s_openapi::api::core::v1 as corev1;
    pub use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
    pub use kube::ResourceExt;

    pub use crate::errors::EmptyResult;
}
