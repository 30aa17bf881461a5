//! # AWS Provider
//!
//! Region, role ARN and web identity token come from the ambient SDK
//! environment. On EKS these are injected for the pod automatically when the
//! service account carries the `eks.amazonaws.com/role-arn` annotation.

mod acm;

pub use acm::AcmCertificateManager;

use aws_config::SdkConfig;

/// Load AWS configuration from the default credential chain (env vars,
/// web identity token, instance profile).
pub async fn load_sdk_config() -> SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await
}
