//! # AWS Certificate Manager Operations
//!
//! Implements the `CertificateManager` trait against ACM.

use std::time::Instant;

use anyhow::anyhow;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_acm::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_acm::primitives::Blob;
use aws_sdk_acm::types::Tag;
use tracing::{debug, info};

use crate::constants::ACM_LIST_PAGE_SIZE;
use crate::observability::metrics;
use crate::provider::{
    CertificateManager, CertificateTag, ImportRequest, ManagedCertificate, ProviderError,
};

/// Shared, thread-safe ACM client. One instance serves all reconcilers.
#[derive(Clone)]
pub struct AcmCertificateManager {
    client: aws_sdk_acm::Client,
}

impl AcmCertificateManager {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_acm::Client::new(config),
        }
    }
}

impl std::fmt::Debug for AcmCertificateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmCertificateManager").finish_non_exhaustive()
    }
}

/// Error codes ACM returns for requests that are wrong rather than unlucky.
/// Everything else is treated as transient and retried.
const REJECTED_CODES: [&str; 6] = [
    "InvalidArnException",
    "InvalidParameterException",
    "InvalidTagException",
    "TagPolicyException",
    "TooManyTagsException",
    "AccessDeniedException",
];

fn classify_error<E, R>(operation: &'static str, error: SdkError<E, R>) -> ProviderError
where
    SdkError<E, R>: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = ProvideErrorMetadata::code(&error)
        .unwrap_or("Unknown")
        .to_string();
    metrics::increment_acm_operation_errors(operation);
    let wrapped = anyhow!(error).context(format!("ACM {operation} failed ({code})"));
    if REJECTED_CODES.contains(&code.as_str()) {
        ProviderError::Rejected(wrapped)
    } else {
        ProviderError::Transient(wrapped)
    }
}

#[async_trait]
impl CertificateManager for AcmCertificateManager {
    async fn describe_certificate(
        &self,
        arn: &str,
    ) -> Result<Option<ManagedCertificate>, ProviderError> {
        let start = Instant::now();
        match self
            .client
            .describe_certificate()
            .certificate_arn(arn)
            .send()
            .await
        {
            Ok(output) => {
                metrics::record_acm_operation("describe", start.elapsed().as_secs_f64());
                Ok(output.certificate.map(|detail| ManagedCertificate {
                    arn: detail
                        .certificate_arn
                        .unwrap_or_else(|| arn.to_string()),
                    serial: detail.serial,
                    domain_name: detail.domain_name,
                }))
            }
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(|service| service.is_resource_not_found_exception()) =>
            {
                debug!(arn, "certificate not found in ACM");
                metrics::record_acm_operation("describe", start.elapsed().as_secs_f64());
                Ok(None)
            }
            Err(error) => Err(classify_error("DescribeCertificate", error)),
        }
    }

    async fn find_certificates_by_domain(
        &self,
        domain_name: &str,
    ) -> Result<Vec<ManagedCertificate>, ProviderError> {
        // ACM offers no server-side search by domain, so walk the pages and
        // filter locally.
        let start = Instant::now();
        let mut matches = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_certificates()
                .max_items(ACM_LIST_PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|error| classify_error("ListCertificates", error))?;

            for summary in output.certificate_summary_list() {
                if summary.domain_name() != Some(domain_name) {
                    continue;
                }
                if let Some(arn) = summary.certificate_arn() {
                    if let Some(described) = self.describe_certificate(arn).await? {
                        matches.push(described);
                    }
                }
            }

            next_token = output.next_token().map(ToString::to_string);
            if next_token.is_none() {
                break;
            }
        }
        metrics::record_acm_operation("list", start.elapsed().as_secs_f64());
        debug!(
            domain = domain_name,
            matches = matches.len(),
            "enumerated ACM certificates by domain"
        );
        Ok(matches)
    }

    async fn import_certificate(&self, request: ImportRequest) -> Result<String, ProviderError> {
        let start = Instant::now();
        let replacing = request.certificate_arn.is_some();
        let output = self
            .client
            .import_certificate()
            .certificate(Blob::new(request.certificate_pem))
            .private_key(Blob::new(request.private_key))
            .set_certificate_chain(request.certificate_chain_pem.map(Blob::new))
            .set_certificate_arn(request.certificate_arn)
            .send()
            .await
            .map_err(|error| classify_error("ImportCertificate", error))?;

        metrics::record_acm_operation("import", start.elapsed().as_secs_f64());
        metrics::increment_acm_imports();

        let arn = output
            .certificate_arn()
            .map(ToString::to_string)
            .ok_or_else(|| {
                ProviderError::Rejected(anyhow!("import response carried no certificate ARN"))
            })?;
        info!(arn = %arn, replacing, "imported certificate into ACM");
        Ok(arn)
    }

    async fn add_tags(&self, arn: &str, tags: Vec<CertificateTag>) -> Result<(), ProviderError> {
        let start = Instant::now();
        let mut builder = self.client.add_tags_to_certificate().certificate_arn(arn);
        for tag in tags {
            let tag = Tag::builder()
                .key(tag.key)
                .value(tag.value)
                .build()
                .map_err(|error| ProviderError::Rejected(anyhow!(error)))?;
            builder = builder.tags(tag);
        }
        builder
            .send()
            .await
            .map_err(|error| classify_error("AddTagsToCertificate", error))?;
        metrics::record_acm_operation("tag", start.elapsed().as_secs_f64());
        Ok(())
    }

    async fn get_tag(&self, arn: &str, key: &str) -> Result<Option<String>, ProviderError> {
        let output = self
            .client
            .list_tags_for_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(|error| classify_error("ListTagsForCertificate", error))?;

        Ok(output
            .tags()
            .iter()
            .find(|tag| tag.key() == key)
            .and_then(|tag| tag.value().map(ToString::to_string)))
    }
}
