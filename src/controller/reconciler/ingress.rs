//! # Ingress Decorator Reconciler
//!
//! Resolves the host names declared on an ALB ingress against the pool of
//! synchronized TLS secrets and writes the resulting certificate ARN list
//! onto the annotation the load-balancer controller consumes.
//!
//! Host matching uses the SAN names the secret reconciler publishes in the
//! domains annotation; certificates carrying only a CN never match. Only
//! single-label wildcards are considered, mirroring ACM.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::constants::{
    AGENT_CERTIFICATE_ARN_ANNOTATION, AGENT_CERTIFICATE_DOMAIN_NAMES_ANNOTATION,
    AGENT_CERTIFICATE_EXPIRY_DATE_ANNOTATION, ALB_INGRESS_CERTIFICATE_ARN_ANNOTATION,
    ALB_INGRESS_CLASS, ALB_INGRESS_CLASS_ANNOTATION, ALB_INGRESS_LISTEN_PORTS_ANNOTATION,
    TLS_SECRET_FIELD_SELECTOR,
};
use crate::controller::annotations;
use crate::controller::reconciler::{Context, ReconcilerError};
use crate::observability::metrics;

/// Result of joining the declared hosts against the secret pool.
#[derive(Debug, Default)]
pub struct HostResolution {
    /// Deduplicated ARNs in first-seen host order.
    pub arns: Vec<String>,
    /// Hosts no synchronized secret covers yet.
    pub unmatched: Vec<String>,
}

pub async fn reconcile(ingress: Arc<Ingress>, ctx: Arc<Context>) -> Result<Action, ReconcilerError> {
    let name = ingress.name_any();
    let namespace = ingress.namespace().unwrap_or_default();
    metrics::increment_reconciliations("ingress");

    let api: Api<Ingress> = Api::namespaced(ctx.client.clone(), &namespace);

    if !decoration_expected(&ingress) {
        // Disabled (or no HTTPS listener): drop a stale ARN annotation so the
        // load balancer stops serving the certificate.
        if annotations::get(&ingress.metadata, ALB_INGRESS_CERTIFICATE_ARN_ANNOTATION).is_some() {
            let patch = json!({
                "metadata": { "annotations": { ALB_INGRESS_CERTIFICATE_ARN_ANNOTATION: Value::Null } }
            });
            api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            info!(
                resource.name = %name,
                resource.namespace = %namespace,
                "removed stale load-balancer certificate annotation"
            );
        }
        return Ok(Action::await_change());
    }

    let hosts = declared_hosts(&ingress);
    if hosts.is_empty() {
        return Ok(Action::await_change());
    }

    // TLS secrets cluster-wide; the field selector keeps the list small.
    let secrets: Api<Secret> = Api::all(ctx.client.clone());
    let candidates = secrets
        .list(&ListParams::default().fields(TLS_SECRET_FIELD_SELECTOR))
        .await?;

    let resolution = resolve_hosts(&hosts, &candidates.items, Utc::now());

    if !resolution.arns.is_empty() {
        let desired = resolution.arns.join(",");
        let current = annotations::get(&ingress.metadata, ALB_INGRESS_CERTIFICATE_ARN_ANNOTATION);
        if current != Some(desired.as_str()) {
            let patch = json!({
                "metadata": { "annotations": { ALB_INGRESS_CERTIFICATE_ARN_ANNOTATION: desired } }
            });
            api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            info!(
                resource.name = %name,
                resource.namespace = %namespace,
                arns = %resolution.arns.join(","),
                "updated load-balancer certificate annotation"
            );
        }
    }

    if !resolution.unmatched.is_empty() {
        // The matching secret may simply not have synchronized yet.
        debug!(
            resource.name = %name,
            unmatched = ?resolution.unmatched,
            "some hosts have no synchronized certificate yet; requeueing"
        );
        metrics::increment_requeues();
        return Ok(Action::requeue(ctx.config.requeue_latency()));
    }

    Ok(Action::await_change())
}

/// An ingress expects decoration when it opted in, uses the ALB ingress class
/// and declares an HTTPS listener.
pub fn decoration_expected(ingress: &Ingress) -> bool {
    annotations::is_enabled(&ingress.metadata)
        && annotations::get(&ingress.metadata, ALB_INGRESS_CLASS_ANNOTATION)
            == Some(ALB_INGRESS_CLASS)
        && expects_https_listener(ingress)
}

/// The listen-ports annotation is a JSON array of single-key maps, e.g.
/// `[{"HTTP": 80}, {"HTTPS": 443}]`.
fn expects_https_listener(ingress: &Ingress) -> bool {
    let Some(raw) = annotations::get(&ingress.metadata, ALB_INGRESS_LISTEN_PORTS_ANNOTATION) else {
        return false;
    };
    let Ok(listeners) = serde_json::from_str::<Vec<serde_json::Map<String, Value>>>(raw) else {
        return false;
    };
    listeners
        .iter()
        .any(|listener| listener.keys().any(|protocol| protocol == "HTTPS"))
}

/// Non-empty hosts from the ingress rules, deduplicated in first-seen order.
pub fn declared_hosts(ingress: &Ingress) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::new();
    if let Some(rules) = ingress.spec.as_ref().and_then(|spec| spec.rules.as_ref()) {
        for rule in rules {
            if let Some(host) = rule.host.as_deref().filter(|host| !host.is_empty()) {
                if !hosts.iter().any(|existing| existing == host) {
                    hosts.push(host.to_string());
                }
            }
        }
    }
    hosts
}

/// Join hosts against candidate secrets. A candidate qualifies when it holds
/// a non-empty ARN annotation, its expiry annotation (when present) parses
/// and lies in the future, and its domains annotation covers the host either
/// literally or via the single-label wildcard form.
pub fn resolve_hosts(hosts: &[String], candidates: &[Secret], now: DateTime<Utc>) -> HostResolution {
    let mut resolution = HostResolution::default();

    for host in hosts {
        let wildcard = wildcard_form(host);
        let matched = candidates.iter().find_map(|secret| {
            let arn = annotations::get(&secret.metadata, AGENT_CERTIFICATE_ARN_ANNOTATION)
                .filter(|arn| !arn.is_empty())?;

            if let Some(expiry) =
                annotations::get(&secret.metadata, AGENT_CERTIFICATE_EXPIRY_DATE_ANNOTATION)
            {
                match DateTime::parse_from_rfc3339(expiry) {
                    Ok(expires) if expires.with_timezone(&Utc) > now => {}
                    _ => return None,
                }
            }

            let domains =
                annotations::get(&secret.metadata, AGENT_CERTIFICATE_DOMAIN_NAMES_ANNOTATION)?;
            let covered = domains.split(',').map(str::trim).any(|domain| {
                domain.eq_ignore_ascii_case(host)
                    || wildcard
                        .as_deref()
                        .is_some_and(|wildcard| domain.eq_ignore_ascii_case(wildcard))
            });
            covered.then(|| arn.to_string())
        });

        match matched {
            Some(arn) => {
                if !resolution.arns.contains(&arn) {
                    resolution.arns.push(arn);
                }
            }
            None => resolution.unmatched.push(host.clone()),
        }
    }

    resolution
}

/// Single-label wildcard form of a host: everything after the first label,
/// prefixed with `*.`. Hosts without a dot have no wildcard form.
fn wildcard_form(host: &str) -> Option<String> {
    host.split_once('.')
        .map(|(_, suffix)| format!("*.{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn synced_secret(arn: &str, domains: &str, expires: Option<&str>) -> Secret {
        let mut annotations: BTreeMap<String, String> = BTreeMap::from([
            (
                AGENT_CERTIFICATE_ARN_ANNOTATION.to_string(),
                arn.to_string(),
            ),
            (
                AGENT_CERTIFICATE_DOMAIN_NAMES_ANNOTATION.to_string(),
                domains.to_string(),
            ),
        ]);
        if let Some(expires) = expires {
            annotations.insert(
                AGENT_CERTIFICATE_EXPIRY_DATE_ANNOTATION.to_string(),
                expires.to_string(),
            );
        }
        let mut secret = Secret::default();
        secret.metadata.annotations = Some(annotations);
        secret
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn wildcard_form_strips_the_first_label() {
        assert_eq!(
            wildcard_form("a.example.com"),
            Some("*.example.com".to_string())
        );
        assert_eq!(wildcard_form("localhost"), None);
    }

    #[test]
    fn wildcard_certificate_covers_sibling_hosts_once() {
        let secrets = vec![synced_secret("arn:acm:wild", "*.example.com", None)];
        let resolution = resolve_hosts(
            &hosts(&["a.example.com", "b.example.com"]),
            &secrets,
            Utc::now(),
        );
        assert_eq!(resolution.arns, vec!["arn:acm:wild".to_string()]);
        assert!(resolution.unmatched.is_empty());
    }

    #[test]
    fn unmatched_host_is_reported_alongside_matches() {
        let secrets = vec![synced_secret("arn:acm:wild", "*.example.com", None)];
        let resolution = resolve_hosts(
            &hosts(&["a.example.com", "c.other.com"]),
            &secrets,
            Utc::now(),
        );
        assert_eq!(resolution.arns, vec!["arn:acm:wild".to_string()]);
        assert_eq!(resolution.unmatched, vec!["c.other.com".to_string()]);
    }

    #[test]
    fn expired_certificate_is_skipped() {
        let secrets = vec![synced_secret(
            "arn:acm:expired",
            "a.example.com",
            Some("2020-01-01T00:00:00Z"),
        )];
        let resolution = resolve_hosts(&hosts(&["a.example.com"]), &secrets, Utc::now());
        assert!(resolution.arns.is_empty());
        assert_eq!(resolution.unmatched, vec!["a.example.com".to_string()]);
    }

    #[test]
    fn unreadable_expiry_disqualifies_the_candidate() {
        let secrets = vec![synced_secret(
            "arn:acm:bad",
            "a.example.com",
            Some("not-a-date"),
        )];
        let resolution = resolve_hosts(&hosts(&["a.example.com"]), &secrets, Utc::now());
        assert!(resolution.arns.is_empty());
    }

    #[test]
    fn domain_match_is_case_insensitive() {
        let secrets = vec![synced_secret("arn:acm:case", "A.Example.COM", None)];
        let resolution = resolve_hosts(&hosts(&["a.example.com"]), &secrets, Utc::now());
        assert_eq!(resolution.arns, vec!["arn:acm:case".to_string()]);
    }

    #[test]
    fn first_seen_order_is_preserved_without_duplicates() {
        let secrets = vec![
            synced_secret("arn:acm:one", "a.example.com", None),
            synced_secret("arn:acm:two", "b.other.com", None),
        ];
        let resolution = resolve_hosts(
            &hosts(&["a.example.com", "b.other.com", "a.example.com"]),
            &secrets,
            Utc::now(),
        );
        assert_eq!(
            resolution.arns,
            vec!["arn:acm:one".to_string(), "arn:acm:two".to_string()]
        );
    }

    #[test]
    fn secret_without_arn_never_matches() {
        let mut secret = Secret::default();
        secret.metadata.annotations = Some(BTreeMap::from([(
            AGENT_CERTIFICATE_DOMAIN_NAMES_ANNOTATION.to_string(),
            "a.example.com".to_string(),
        )]));
        let resolution = resolve_hosts(&hosts(&["a.example.com"]), &[secret], Utc::now());
        assert!(resolution.arns.is_empty());
    }

    #[test]
    fn https_listener_detection_parses_the_annotation() {
        let mut ingress = Ingress::default();
        ingress.metadata.annotations = Some(BTreeMap::from([(
            ALB_INGRESS_LISTEN_PORTS_ANNOTATION.to_string(),
            r#"[{"HTTP": 80}, {"HTTPS": 443}]"#.to_string(),
        )]));
        assert!(expects_https_listener(&ingress));

        ingress.metadata.annotations = Some(BTreeMap::from([(
            ALB_INGRESS_LISTEN_PORTS_ANNOTATION.to_string(),
            r#"[{"HTTP": 80}]"#.to_string(),
        )]));
        assert!(!expects_https_listener(&ingress));

        ingress.metadata.annotations = Some(BTreeMap::from([(
            ALB_INGRESS_LISTEN_PORTS_ANNOTATION.to_string(),
            "not json".to_string(),
        )]));
        assert!(!expects_https_listener(&ingress));
    }

    #[test]
    fn declared_hosts_deduplicate_in_first_seen_order() {
        use k8s_openapi::api::networking::v1::{IngressRule, IngressSpec};
        let mut ingress = Ingress::default();
        ingress.spec = Some(IngressSpec {
            rules: Some(vec![
                IngressRule {
                    host: Some("a.example.com".to_string()),
                    ..Default::default()
                },
                IngressRule {
                    host: Some("b.example.com".to_string()),
                    ..Default::default()
                },
                IngressRule {
                    host: Some("a.example.com".to_string()),
                    ..Default::default()
                },
                IngressRule {
                    host: None,
                    ..Default::default()
                },
            ]),
            ..Default::default()
        });
        assert_eq!(
            declared_hosts(&ingress),
            vec!["a.example.com".to_string(), "b.example.com".to_string()]
        );
    }
}
