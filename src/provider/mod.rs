//! # Certificate Manager Provider
//!
//! Abstraction over the cloud certificate manager the synchronizer writes to.
//! The trait carries exactly the operations the sync state machine needs, so
//! the state machine can be exercised against a recording fake in tests.
//!
//! There is deliberately no delete operation: downstream infrastructure may
//! still reference a synced certificate, so removal stays a human decision.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

pub mod aws;

pub use aws::AcmCertificateManager;

/// Cloud-side failure, classified for the requeue policy.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Timeouts, throttling, 5xx. Retried with the fixed requeue latency.
    #[error("transient cloud error: {0}")]
    Transient(#[source] anyhow::Error),
    /// Requests the service rejects deterministically (malformed ARN, denied
    /// permission). Retrying without operator intervention cannot succeed.
    #[error("cloud request rejected: {0}")]
    Rejected(#[source] anyhow::Error),
}

/// A certificate known to the cloud certificate manager.
#[derive(Debug, Clone)]
pub struct ManagedCertificate {
    pub arn: String,
    /// Colon-separated hex, as the service reports it.
    pub serial: Option<String>,
    /// Primary domain name the service extracted from the subject CN.
    pub domain_name: Option<String>,
}

/// One import call: create when `certificate_arn` is unset, replace in place
/// otherwise.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub certificate_pem: Vec<u8>,
    /// Concatenated intermediates, leaf-to-root. Omitted when the bundle had
    /// no intermediates.
    pub certificate_chain_pem: Option<Vec<u8>>,
    pub private_key: Vec<u8>,
    pub certificate_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateTag {
    pub key: String,
    pub value: String,
}

/// Operations the sync state machine performs against the cloud side.
#[async_trait]
pub trait CertificateManager: Send + Sync {
    /// Describe a certificate by ARN. `Ok(None)` when the ARN no longer
    /// resolves to a certificate.
    async fn describe_certificate(
        &self,
        arn: &str,
    ) -> Result<Option<ManagedCertificate>, ProviderError>;

    /// All certificates whose primary domain name equals `domain_name`.
    /// The service offers no server-side search, so this enumerates.
    async fn find_certificates_by_domain(
        &self,
        domain_name: &str,
    ) -> Result<Vec<ManagedCertificate>, ProviderError>;

    /// Import a certificate; returns the (possibly newly assigned) ARN.
    async fn import_certificate(&self, request: ImportRequest) -> Result<String, ProviderError>;

    /// Tag a certificate. The import API rejects tags on replacement, so
    /// tagging is always a separate call.
    async fn add_tags(&self, arn: &str, tags: Vec<CertificateTag>) -> Result<(), ProviderError>;

    /// Read a single tag value from a certificate.
    async fn get_tag(&self, arn: &str, key: &str) -> Result<Option<String>, ProviderError>;
}
