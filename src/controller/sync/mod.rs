//! # ACM Sync State Machine
//!
//! Decides, for one parsed TLS secret, whether the cloud side needs an
//! import, which ARN identifies the certificate afterwards, and which
//! provenance tags a fresh import receives.
//!
//! Two booleans drive the flow: an import is required when no cloud
//! certificate with the current serial is reachable, and a domain search is
//! required when there is no ARN hint to verify. They combine as follows:
//!
//! * ARN annotated, serial matches: nothing to do, keep the ARN.
//! * ARN annotated, serial differs: reimport under the same ARN so
//!   dependents keep a stable identifier.
//! * ARN annotated but gone, or no ARN: enumerate by the leaf's subject CN
//!   and adopt an existing certificate with a matching serial, otherwise
//!   import fresh.
//!
//! The domain search deliberately matches the exact CN only, not subject
//! alternative names, and never spans multiple secrets sharing a domain.
//! SAN-only matches therefore trigger a fresh import instead of adoption.

use base64::Engine;
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::{
    PACKAGE_NAME, TAG_CORRELATION_ID, TAG_CREATED_AT, TAG_CREATED_BY, TAG_MODIFIED_AT,
};
use crate::controller::parser::{serials_match, CertificateDetails};
use crate::provider::{CertificateManager, CertificateTag, ImportRequest, ProviderError};

/// Result of one pass of the state machine.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The ARN that identifies the certificate after synchronization.
    pub certificate_arn: String,
    /// Whether an import call was made.
    pub imported: bool,
}

/// Drive the cloud side toward the certificate held in `details`.
///
/// `details.certificate_arn` and `details.created_at` are updated in place as
/// probes resolve them.
pub async fn sync_certificate(
    manager: &dyn CertificateManager,
    details: &mut CertificateDetails,
) -> Result<SyncOutcome, ProviderError> {
    let serial = details.leaf.serial.clone();
    let mut search_required = details.certificate_arn.is_none();

    // Verify the ARN hint first: imports are quota limited, so an annotated
    // certificate that still matches on serial number ends the work early.
    if let Some(arn) = details.certificate_arn.clone() {
        match manager.describe_certificate(&arn).await? {
            Some(existing) => {
                if serials_match(existing.serial.as_deref().unwrap_or_default(), &serial) {
                    debug!(arn = %arn, "certificate already present in ACM with matching serial");
                    return Ok(SyncOutcome {
                        certificate_arn: arn,
                        imported: false,
                    });
                }
                // The cluster certificate always overrides the cloud copy.
                // Reimporting under the held ARN keeps dependents stable.
                debug!(arn = %arn, "serial changed; certificate will be replaced in place");
                details.created_at = read_created_at(manager, &arn).await;
            }
            None => {
                debug!(arn = %arn, "annotated ARN no longer resolves; searching by domain");
                details.certificate_arn = None;
                search_required = true;
            }
        }
    }

    // ACM does not guard against duplicate imports, so before creating a new
    // certificate check whether one with this CN and serial already exists.
    if search_required {
        let domain = details
            .leaf
            .common_name
            .as_deref()
            .filter(|common_name| !common_name.is_empty());
        if let Some(domain) = domain {
            for candidate in manager.find_certificates_by_domain(domain).await? {
                if serials_match(candidate.serial.as_deref().unwrap_or_default(), &serial) {
                    info!(arn = %candidate.arn, "adopted existing ACM certificate with matching serial");
                    details.certificate_arn = Some(candidate.arn.clone());
                    return Ok(SyncOutcome {
                        certificate_arn: candidate.arn,
                        imported: false,
                    });
                }
            }
        }
    }

    let held_arn = details.certificate_arn.clone();
    let request = ImportRequest {
        certificate_pem: details.leaf.pem.clone().into_bytes(),
        certificate_chain_pem: (!details.intermediates.is_empty())
            .then(|| details.chain_pem().into_bytes()),
        private_key: details.private_key.clone(),
        certificate_arn: held_arn.clone(),
    };
    let arn = manager.import_certificate(request).await?;

    // The import API rejects tags on replacement, so provenance tags only go
    // onto newly created certificates.
    if held_arn.is_none() {
        manager
            .add_tags(&arn, standard_tags(details.created_at.as_deref()))
            .await?;
    }

    details.certificate_arn = Some(arn.clone());
    Ok(SyncOutcome {
        certificate_arn: arn,
        imported: true,
    })
}

/// Provenance tags for a freshly created certificate. When a prior creation
/// timestamp was recovered from the certificate being replaced, it is carried
/// forward and a `modifiedAt` tag records the rewrite.
pub fn standard_tags(created_at: Option<&str>) -> Vec<CertificateTag> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut tags = vec![
        CertificateTag {
            key: TAG_CORRELATION_ID.to_string(),
            value: correlation_id(),
        },
        CertificateTag {
            key: TAG_CREATED_BY.to_string(),
            value: PACKAGE_NAME.to_string(),
        },
        CertificateTag {
            key: TAG_CREATED_AT.to_string(),
            value: created_at.unwrap_or(&now).to_string(),
        },
    ];

    if created_at.is_some() {
        tags.push(CertificateTag {
            key: TAG_MODIFIED_AT.to_string(),
            value: now,
        });
    }

    tags
}

fn correlation_id() -> String {
    base64::engine::general_purpose::STANDARD_NO_PAD.encode(Uuid::new_v4().to_string())
}

/// Best-effort read of the prior creation timestamp; a missing or unreadable
/// tag simply yields no hint.
async fn read_created_at(manager: &dyn CertificateManager, arn: &str) -> Option<String> {
    match manager.get_tag(arn, TAG_CREATED_AT).await {
        Ok(value) => value,
        Err(error) => {
            debug!(arn, error = %error, "could not read creation timestamp tag");
            None
        }
    }
}
