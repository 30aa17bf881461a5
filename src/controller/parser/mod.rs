//! # PEM Bundle Parser
//!
//! Splits the `tls.crt` payload of a TLS secret into its PEM certificate
//! blocks, identifies the leaf and rebuilds the intermediate chain in
//! leaf-to-root order regardless of the order the blocks appear in.
//!
//! A self-signed root shipped in the bundle is accounted for but never placed
//! on the chain: ACM rejects imports that carry the trust anchor, and roots
//! are only useful when distributed out of band anyway.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use regex::Regex;
use thiserror::Error;
use x509_parser::prelude::*;

use crate::constants::{
    AGENT_CERTIFICATE_ARN_ANNOTATION, PEM_CERTIFICATE_BEGIN_TAG, PEM_CERTIFICATE_END_TAG,
    TLS_CERTIFICATE_KEY, TLS_PRIVATE_KEY_KEY,
};

static PEM_BLOCK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "(?s){}.+?{}",
        regex::escape(PEM_CERTIFICATE_BEGIN_TAG),
        regex::escape(PEM_CERTIFICATE_END_TAG)
    ))
    .expect("PEM block regex is valid")
});

/// Malformed certificate material. Never retried: the secret has to be
/// republished by its author before reconciliation can make progress.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("'{TLS_CERTIFICATE_KEY}' is missing or empty")]
    MissingCertificate,
    #[error("'{TLS_PRIVATE_KEY_KEY}' is missing or empty")]
    MissingPrivateKey,
    #[error("no PEM certificate blocks found in '{TLS_CERTIFICATE_KEY}'")]
    NoPemBlocks,
    #[error("could not decode certificate at index {0} within '{TLS_CERTIFICATE_KEY}'")]
    UndecodableBlock(usize),
    #[error("could not parse certificate at index {0} within '{TLS_CERTIFICATE_KEY}'")]
    UnparsableBlock(usize),
    #[error("no leaf certificate found in '{TLS_CERTIFICATE_KEY}'")]
    NoLeaf,
    #[error("'{TLS_CERTIFICATE_KEY}' holds a single self-signed certificate")]
    SelfSignedOnly,
    #[error("one or more certificates not incorporated into the intermediate chain")]
    ChainIncomplete,
}

/// An X.509 certificate with the identifying fields the controllers need,
/// extracted into owned values so the DER buffer does not have to outlive it.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    /// The original PEM block, byte for byte.
    pub pem: String,
    pub subject: String,
    pub issuer: String,
    /// Serial as lowercase colon-separated hex pairs.
    pub serial: String,
    pub common_name: Option<String>,
    /// DNS entries of the subject alternative name extension.
    pub dns_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl ParsedCertificate {
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }
}

/// Everything one reconciliation of a TLS secret works with.
#[derive(Debug, Clone)]
pub struct CertificateDetails {
    pub leaf: ParsedCertificate,
    /// Leaf-to-root order, excluding any self-signed root found in the bundle.
    pub intermediates: Vec<ParsedCertificate>,
    /// Forwarded verbatim to the certificate manager.
    pub private_key: Vec<u8>,
    /// ARN recorded on the secret from a previous synchronization, if any.
    pub certificate_arn: Option<String>,
    /// Prior cloud-side creation timestamp, recovered when replacing.
    pub created_at: Option<String>,
}

impl CertificateDetails {
    /// Concatenated intermediate PEM blocks in leaf-to-root order.
    pub fn chain_pem(&self) -> String {
        self.intermediates
            .iter()
            .map(|certificate| certificate.pem.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse the certificate material held by a TLS secret.
pub fn parse_certificate_details(secret: &Secret) -> Result<CertificateDetails, ParseError> {
    let data = secret.data.as_ref();

    let certificate_bytes = data
        .and_then(|data| data.get(TLS_CERTIFICATE_KEY))
        .map(|bytes| bytes.0.as_slice())
        .filter(|bytes| !bytes.is_empty())
        .ok_or(ParseError::MissingCertificate)?;

    let private_key = data
        .and_then(|data| data.get(TLS_PRIVATE_KEY_KEY))
        .map(|bytes| bytes.0.clone())
        .filter(|bytes| !bytes.is_empty())
        .ok_or(ParseError::MissingPrivateKey)?;

    let (leaf, intermediates) = parse_certificate_bundle(certificate_bytes)?;

    let certificate_arn = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(AGENT_CERTIFICATE_ARN_ANNOTATION))
        .filter(|arn| !arn.is_empty())
        .cloned();

    Ok(CertificateDetails {
        leaf,
        intermediates,
        private_key,
        certificate_arn,
        created_at: None,
    })
}

/// Split a PEM bundle into its blocks and rebuild the chain.
///
/// Returns the leaf and the ordered intermediates. Every non-root block must
/// join the chain; bundles with orphan certificates are rejected.
pub fn parse_certificate_bundle(
    raw: &[u8],
) -> Result<(ParsedCertificate, Vec<ParsedCertificate>), ParseError> {
    let text = String::from_utf8_lossy(raw);

    let mut certificates = Vec::new();
    for (index, block) in PEM_BLOCK_REGEX.find_iter(&text).enumerate() {
        certificates.push(parse_pem_block(block.as_str(), index)?);
    }
    if certificates.is_empty() {
        return Err(ParseError::NoPemBlocks);
    }

    // The leaf is the certificate whose subject is not also the issuer of
    // another certificate in the bundle.
    let leaf_index = certificates
        .iter()
        .enumerate()
        .find(|(index, candidate)| {
            !certificates
                .iter()
                .enumerate()
                .any(|(other_index, other)| other_index != *index && other.issuer == candidate.subject)
        })
        .map(|(index, _)| index)
        .ok_or(ParseError::NoLeaf)?;

    let leaf = certificates[leaf_index].clone();
    if certificates.len() == 1 && leaf.is_self_signed() {
        return Err(ParseError::SelfSignedOnly);
    }

    // Walk issuer links from the leaf upward. A self-signed certificate ends
    // the walk and stays off the chain.
    let mut intermediates: Vec<ParsedCertificate> = Vec::new();
    let mut consumed = vec![false; certificates.len()];
    consumed[leaf_index] = true;
    let mut excluded_roots = 0usize;
    let mut current = leaf_index;
    loop {
        let issuer = certificates.iter().enumerate().find(|(index, candidate)| {
            !consumed[*index] && candidate.subject == certificates[current].issuer
        });
        let Some((index, candidate)) = issuer else {
            break;
        };
        consumed[index] = true;
        if candidate.is_self_signed() {
            excluded_roots += 1;
            break;
        }
        intermediates.push(candidate.clone());
        current = index;
    }

    if intermediates.len() + excluded_roots != certificates.len() - 1 {
        return Err(ParseError::ChainIncomplete);
    }

    Ok((leaf, intermediates))
}

fn parse_pem_block(block: &str, index: usize) -> Result<ParsedCertificate, ParseError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(block.as_bytes())
        .map_err(|_| ParseError::UndecodableBlock(index))?;
    let (_, certificate) = X509Certificate::from_der(&pem.contents)
        .map_err(|_| ParseError::UnparsableBlock(index))?;

    let common_name = certificate
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attribute| attribute.as_str().ok())
        .map(ToString::to_string);

    let dns_names = certificate
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|extension| {
            extension
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some((*dns).to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let validity = certificate.validity();
    let not_before = DateTime::<Utc>::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or(ParseError::UnparsableBlock(index))?;
    let not_after = DateTime::<Utc>::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or(ParseError::UnparsableBlock(index))?;

    Ok(ParsedCertificate {
        pem: block.to_string(),
        subject: certificate.subject().to_string(),
        issuer: certificate.issuer().to_string(),
        serial: format_serial(certificate.raw_serial()),
        common_name,
        dns_names,
        not_before,
        not_after,
    })
}

/// Format a DER serial as lowercase colon-separated hex pairs, dropping
/// leading zero digits the way big-integer renderings do.
pub fn format_serial(raw: &[u8]) -> String {
    let hex: String = raw.iter().map(|byte| format!("{byte:02x}")).collect();
    let trimmed = hex.trim_start_matches('0');
    let mut digits = if trimmed.is_empty() { "0" } else { trimmed }.to_string();
    if digits.len() % 2 == 1 {
        digits.insert(0, '0');
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(":")
}

/// Compare serials ignoring colons, case and leading zeros. ACM reports
/// uppercase colon-separated hex with leading zeros preserved.
pub fn serials_match(left: &str, right: &str) -> bool {
    normalize_serial(left) == normalize_serial(right)
}

fn normalize_serial(serial: &str) -> String {
    let hex: String = serial
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_lowercase();
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_serial_pads_odd_length_to_even() {
        assert_eq!(format_serial(&[0x01, 0xab]), "01:ab");
        assert_eq!(format_serial(&[0x1a, 0xbc]), "1a:bc");
    }

    #[test]
    fn format_serial_drops_leading_zero_bytes() {
        assert_eq!(format_serial(&[0x00, 0x1a, 0xbc]), "1a:bc");
        assert_eq!(format_serial(&[0x00, 0x0a, 0xbc]), "0a:bc");
    }

    #[test]
    fn format_serial_handles_zero() {
        assert_eq!(format_serial(&[0x00]), "00");
    }

    #[test]
    fn serials_match_ignores_case_and_leading_zeros() {
        assert!(serials_match("0A:BC", "a:bc"));
        assert!(serials_match("00:1a:bc", "1A:BC"));
        assert!(!serials_match("1a:bc", "1a:bd"));
    }

    #[test]
    fn bundle_without_pem_blocks_is_rejected() {
        let result = parse_certificate_bundle(b"not a certificate");
        assert!(matches!(result, Err(ParseError::NoPemBlocks)));
    }

    #[test]
    fn garbage_inside_markers_is_rejected_with_index() {
        let bundle = format!(
            "{PEM_CERTIFICATE_BEGIN_TAG}\n!!!not base64!!!\n{PEM_CERTIFICATE_END_TAG}"
        );
        let result = parse_certificate_bundle(bundle.as_bytes());
        assert!(matches!(result, Err(ParseError::UndecodableBlock(0))));
    }
}
