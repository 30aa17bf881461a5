//! # Annotation Helpers
//!
//! The three controllers coordinate exclusively through annotations on shared
//! resources, so reading and computing them lives in one place.

use std::collections::BTreeMap;

use chrono::SecondsFormat;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::constants::{
    AGENT_CERTIFICATE_ARN_ANNOTATION, AGENT_CERTIFICATE_DOMAIN_NAMES_ANNOTATION,
    AGENT_CERTIFICATE_EXPIRY_DATE_ANNOTATION, AGENT_CERTIFICATE_SERIAL_NUMBER_ANNOTATION,
    AGENT_ENABLED_ANNOTATION,
};
use crate::controller::parser::ParsedCertificate;

/// Read an annotation value from object metadata.
pub fn get<'a>(metadata: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// Lenient boolean parse shared by annotation values and environment flags:
/// `1`, `t`, `T`, `true`, `TRUE` and `True` are truthy, anything else is not.
pub fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

/// Whether the object opted into management via the enabled annotation.
pub fn is_enabled(metadata: &ObjectMeta) -> bool {
    get(metadata, AGENT_ENABLED_ANNOTATION).is_some_and(is_truthy)
}

/// The annotation set a synchronized secret should carry. Observers key off
/// these four values, so they are written together through a single update.
pub fn desired_secret_annotations(
    certificate_arn: &str,
    leaf: &ParsedCertificate,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            AGENT_CERTIFICATE_ARN_ANNOTATION.to_string(),
            certificate_arn.to_string(),
        ),
        (
            AGENT_CERTIFICATE_SERIAL_NUMBER_ANNOTATION.to_string(),
            leaf.serial.clone(),
        ),
        (
            AGENT_CERTIFICATE_EXPIRY_DATE_ANNOTATION.to_string(),
            leaf.not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        (
            AGENT_CERTIFICATE_DOMAIN_NAMES_ANNOTATION.to_string(),
            leaf.dns_names.join(", "),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn leaf() -> ParsedCertificate {
        ParsedCertificate {
            pem: String::new(),
            subject: "CN=app.example.com".to_string(),
            issuer: "CN=Intermediate".to_string(),
            serial: "0a:1b".to_string(),
            common_name: Some("app.example.com".to_string()),
            dns_names: vec!["app.example.com".to_string(), "www.example.com".to_string()],
            not_before: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            not_after: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn truthy_accepts_the_lenient_set() {
        for value in ["1", "t", "T", "true", "TRUE", "True"] {
            assert!(is_truthy(value), "{value} should be truthy");
        }
        for value in ["", "0", "false", "yes", "on", "enabled"] {
            assert!(!is_truthy(value), "{value} should not be truthy");
        }
    }

    #[test]
    fn enabled_requires_a_truthy_annotation() {
        let mut metadata = ObjectMeta::default();
        assert!(!is_enabled(&metadata));

        metadata.annotations = Some(
            [(AGENT_ENABLED_ANNOTATION.to_string(), "false".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(!is_enabled(&metadata));

        metadata.annotations = Some(
            [(AGENT_ENABLED_ANNOTATION.to_string(), "true".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(is_enabled(&metadata));
    }

    #[test]
    fn desired_annotations_cover_the_published_contract() {
        let annotations = desired_secret_annotations("arn:aws:acm:xx:1:certificate/abc", &leaf());
        assert_eq!(
            annotations.get(AGENT_CERTIFICATE_ARN_ANNOTATION).unwrap(),
            "arn:aws:acm:xx:1:certificate/abc"
        );
        assert_eq!(
            annotations
                .get(AGENT_CERTIFICATE_SERIAL_NUMBER_ANNOTATION)
                .unwrap(),
            "0a:1b"
        );
        assert_eq!(
            annotations
                .get(AGENT_CERTIFICATE_EXPIRY_DATE_ANNOTATION)
                .unwrap(),
            "2025-01-01T00:00:00Z"
        );
        assert_eq!(
            annotations
                .get(AGENT_CERTIFICATE_DOMAIN_NAMES_ANNOTATION)
                .unwrap(),
            "app.example.com, www.example.com"
        );
    }
}
