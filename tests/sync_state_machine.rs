//! Tests for the ACM sync state machine against a recording fake provider.
//!
//! These cover the decision surface: fresh import, replacement under a held
//! ARN, adoption by domain search, idempotence on a converged secret, and
//! recovery from a vanished ARN.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use acm_sync_controller::controller::parser::{CertificateDetails, ParsedCertificate};
use acm_sync_controller::controller::sync::sync_certificate;
use acm_sync_controller::provider::{
    CertificateManager, CertificateTag, ImportRequest, ManagedCertificate, ProviderError,
};

const LEAF_SERIAL: &str = "0a:1b";
const NEW_ARN: &str = "arn:aws:acm:eu-west-1:111111111111:certificate/new";
const PRIOR_ARN: &str = "arn:aws:acm:eu-west-1:111111111111:certificate/prior";

#[derive(Debug, Clone, PartialEq, Eq)]
enum CloudCall {
    Describe(String),
    FindByDomain(String),
    Import { held_arn: Option<String> },
    AddTags(String),
    GetTag(String),
}

/// In-memory stand-in for ACM that records every call.
#[derive(Default)]
struct FakeCertificateManager {
    calls: Mutex<Vec<CloudCall>>,
    certificates: Vec<ManagedCertificate>,
    tags: HashMap<String, String>,
}

impl FakeCertificateManager {
    fn with_certificate(mut self, certificate: ManagedCertificate) -> Self {
        self.certificates.push(certificate);
        self
    }

    fn with_created_at_tag(mut self, arn: &str, value: &str) -> Self {
        self.tags.insert(arn.to_string(), value.to_string());
        self
    }

    fn calls(&self) -> Vec<CloudCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: CloudCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CertificateManager for FakeCertificateManager {
    async fn describe_certificate(
        &self,
        arn: &str,
    ) -> Result<Option<ManagedCertificate>, ProviderError> {
        self.record(CloudCall::Describe(arn.to_string()));
        Ok(self
            .certificates
            .iter()
            .find(|certificate| certificate.arn == arn)
            .cloned())
    }

    async fn find_certificates_by_domain(
        &self,
        domain_name: &str,
    ) -> Result<Vec<ManagedCertificate>, ProviderError> {
        self.record(CloudCall::FindByDomain(domain_name.to_string()));
        Ok(self
            .certificates
            .iter()
            .filter(|certificate| certificate.domain_name.as_deref() == Some(domain_name))
            .cloned()
            .collect())
    }

    async fn import_certificate(&self, request: ImportRequest) -> Result<String, ProviderError> {
        self.record(CloudCall::Import {
            held_arn: request.certificate_arn.clone(),
        });
        Ok(request
            .certificate_arn
            .unwrap_or_else(|| NEW_ARN.to_string()))
    }

    async fn add_tags(&self, arn: &str, _tags: Vec<CertificateTag>) -> Result<(), ProviderError> {
        self.record(CloudCall::AddTags(arn.to_string()));
        Ok(())
    }

    async fn get_tag(&self, arn: &str, _key: &str) -> Result<Option<String>, ProviderError> {
        self.record(CloudCall::GetTag(arn.to_string()));
        Ok(self.tags.get(arn).cloned())
    }
}

fn details(certificate_arn: Option<&str>) -> CertificateDetails {
    CertificateDetails {
        leaf: ParsedCertificate {
            pem: "-----BEGIN CERTIFICATE-----\nMFE=\n-----END CERTIFICATE-----".to_string(),
            subject: "CN=app.example.com".to_string(),
            issuer: "CN=Test Intermediate".to_string(),
            serial: LEAF_SERIAL.to_string(),
            common_name: Some("app.example.com".to_string()),
            dns_names: vec!["app.example.com".to_string()],
            not_before: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            not_after: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        },
        intermediates: Vec::new(),
        private_key: b"private key bytes".to_vec(),
        certificate_arn: certificate_arn.map(ToString::to_string),
        created_at: None,
    }
}

#[tokio::test]
async fn fresh_secret_imports_and_tags() {
    let manager = FakeCertificateManager::default();
    let mut details = details(None);

    let outcome = sync_certificate(&manager, &mut details).await.unwrap();

    assert!(outcome.imported);
    assert_eq!(outcome.certificate_arn, NEW_ARN);
    assert_eq!(details.certificate_arn.as_deref(), Some(NEW_ARN));
    assert_eq!(
        manager.calls(),
        vec![
            CloudCall::FindByDomain("app.example.com".to_string()),
            CloudCall::Import { held_arn: None },
            CloudCall::AddTags(NEW_ARN.to_string()),
        ]
    );
}

#[tokio::test]
async fn rotation_replaces_in_place_under_the_held_arn() {
    let manager = FakeCertificateManager::default()
        .with_certificate(ManagedCertificate {
            arn: PRIOR_ARN.to_string(),
            serial: Some("FF:EE".to_string()),
            domain_name: Some("app.example.com".to_string()),
        })
        .with_created_at_tag(PRIOR_ARN, "2023-04-01T00:00:00Z");
    let mut details = details(Some(PRIOR_ARN));

    let outcome = sync_certificate(&manager, &mut details).await.unwrap();

    assert!(outcome.imported);
    assert_eq!(outcome.certificate_arn, PRIOR_ARN);
    assert_eq!(details.created_at.as_deref(), Some("2023-04-01T00:00:00Z"));
    // A replacement keeps the ARN stable and gets no tag call: the import API
    // rejects tags on reimport.
    assert_eq!(
        manager.calls(),
        vec![
            CloudCall::Describe(PRIOR_ARN.to_string()),
            CloudCall::GetTag(PRIOR_ARN.to_string()),
            CloudCall::Import {
                held_arn: Some(PRIOR_ARN.to_string())
            },
        ]
    );
}

#[tokio::test]
async fn existing_certificate_is_adopted_by_domain_and_serial() {
    let manager = FakeCertificateManager::default().with_certificate(ManagedCertificate {
        arn: PRIOR_ARN.to_string(),
        // Uppercase with a leading zero pair: matching must normalize.
        serial: Some("00:0A:1B".to_string()),
        domain_name: Some("app.example.com".to_string()),
    });
    let mut details = details(None);

    let outcome = sync_certificate(&manager, &mut details).await.unwrap();

    assert!(!outcome.imported);
    assert_eq!(outcome.certificate_arn, PRIOR_ARN);
    assert_eq!(details.certificate_arn.as_deref(), Some(PRIOR_ARN));
    assert_eq!(
        manager.calls(),
        vec![CloudCall::FindByDomain("app.example.com".to_string())]
    );
}

#[tokio::test]
async fn converged_secret_costs_one_describe_and_nothing_else() {
    let manager = FakeCertificateManager::default().with_certificate(ManagedCertificate {
        arn: PRIOR_ARN.to_string(),
        serial: Some("0A:1B".to_string()),
        domain_name: Some("app.example.com".to_string()),
    });
    let mut details = details(Some(PRIOR_ARN));

    let outcome = sync_certificate(&manager, &mut details).await.unwrap();

    assert!(!outcome.imported);
    assert_eq!(outcome.certificate_arn, PRIOR_ARN);
    // Idempotence: a converged secret costs exactly one describe call.
    assert_eq!(
        manager.calls(),
        vec![CloudCall::Describe(PRIOR_ARN.to_string())]
    );
}

#[tokio::test]
async fn vanished_arn_falls_back_to_search_then_fresh_import() {
    let manager = FakeCertificateManager::default();
    let mut details = details(Some(PRIOR_ARN));

    let outcome = sync_certificate(&manager, &mut details).await.unwrap();

    assert!(outcome.imported);
    assert_eq!(outcome.certificate_arn, NEW_ARN);
    assert_eq!(
        manager.calls(),
        vec![
            CloudCall::Describe(PRIOR_ARN.to_string()),
            CloudCall::FindByDomain("app.example.com".to_string()),
            CloudCall::Import { held_arn: None },
            CloudCall::AddTags(NEW_ARN.to_string()),
        ]
    );
}

#[tokio::test]
async fn leaf_without_common_name_skips_the_domain_search() {
    let manager = FakeCertificateManager::default();
    let mut details = details(None);
    details.leaf.common_name = None;

    let outcome = sync_certificate(&manager, &mut details).await.unwrap();

    assert!(outcome.imported);
    assert_eq!(
        manager.calls(),
        vec![
            CloudCall::Import { held_arn: None },
            CloudCall::AddTags(NEW_ARN.to_string()),
        ]
    );
}
