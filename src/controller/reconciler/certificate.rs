//! # Certificate Bridge Reconciler
//!
//! Mirrors management intent between a cert-manager Certificate record and
//! its bound TLS secret. Operators annotate the high-level record; the bridge
//! claims the secret, caches the ARN back onto the record so it survives
//! secret re-issuance, and guarantees cleanup through a finalizer.
//!
//! The bridge writes only annotations and the finalizer. It never calls the
//! cloud.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::constants::{
    AGENT_CERTIFICATE_ARN_ANNOTATION, AGENT_ENABLED_ANNOTATION, AGENT_FINALIZER,
    AGENT_INHERITS_FROM_ANNOTATION, AGENT_OWNED_ANNOTATIONS,
};
use crate::controller::annotations;
use crate::controller::reconciler::{Context, ReconcilerError};
use crate::crd::Certificate;
use crate::observability::metrics;

/// Relationship between a certificate record and the secret it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The secret opted in on its own; the bridge must not cross-manage it.
    SelfManaged,
    /// The secret carries no management annotations yet.
    Unmanaged,
    /// The secret inherits from this certificate record.
    Ours,
    /// The secret inherits from a different certificate record.
    Foreign,
}

/// Classify a secret against the reconciling certificate's UID.
pub fn evaluate_ownership(
    secret_enabled: bool,
    inherits_from: Option<&str>,
    certificate_uid: &str,
) -> Ownership {
    match inherits_from {
        Some(uid) if uid == certificate_uid => Ownership::Ours,
        Some(_) => Ownership::Foreign,
        None if secret_enabled => Ownership::SelfManaged,
        None => Ownership::Unmanaged,
    }
}

pub async fn reconcile(
    certificate: Arc<Certificate>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let name = certificate.name_any();
    let namespace = certificate.namespace().unwrap_or_default();
    metrics::increment_reconciliations("certificate");

    let certificates: Api<Certificate> = Api::namespaced(ctx.client.clone(), &namespace);
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);
    let secret_name = certificate.spec.secret_name.clone();

    // Deletion path: strip the bound secret before shedding the finalizer,
    // otherwise orphan annotations keep driving the secret reconciler.
    if certificate.metadata.deletion_timestamp.is_some() {
        if has_finalizer(&certificate) {
            match secrets.get(&secret_name).await {
                Ok(secret) => strip_agent_annotations(&secrets, &secret).await?,
                Err(kube::Error::Api(response)) if response.code == 404 => {
                    debug!(secret = %secret_name, "bound secret already gone");
                }
                Err(error) => return Err(error.into()),
            }
            remove_finalizer(&certificates, &name).await?;
            info!(
                resource.name = %name,
                resource.namespace = %namespace,
                "released certificate record"
            );
        }
        return Ok(Action::await_change());
    }

    if !has_finalizer(&certificate) {
        add_finalizer(&certificates, &certificate).await?;
    }

    // The bound secret appears only once the issuer has produced material.
    let secret = match secrets.get(&secret_name).await {
        Ok(secret) => secret,
        Err(kube::Error::Api(response)) if response.code == 404 => {
            debug!(secret = %secret_name, "bound secret not found yet; requeueing");
            metrics::increment_requeues();
            return Ok(Action::requeue(ctx.config.requeue_latency()));
        }
        Err(error) => return Err(error.into()),
    };

    let certificate_uid = certificate.metadata.uid.clone().unwrap_or_default();
    let ownership = evaluate_ownership(
        annotations::is_enabled(&secret.metadata),
        annotations::get(&secret.metadata, AGENT_INHERITS_FROM_ANNOTATION),
        &certificate_uid,
    );

    match ownership {
        Ownership::SelfManaged => {
            debug!(secret = %secret_name, "secret manages its own synchronization; leaving it alone");
            return Ok(Action::await_change());
        }
        Ownership::Foreign => {
            debug!(secret = %secret_name, "secret is bound to a different certificate record");
            return Ok(Action::await_change());
        }
        Ownership::Ours | Ownership::Unmanaged => {}
    }

    if annotations::is_enabled(&certificate.metadata) {
        if ownership == Ownership::Ours {
            // Cache the ARN on the record so it survives the issuer deleting
            // and re-creating the secret.
            let secret_arn = annotations::get(&secret.metadata, AGENT_CERTIFICATE_ARN_ANNOTATION);
            let cached_arn =
                annotations::get(&certificate.metadata, AGENT_CERTIFICATE_ARN_ANNOTATION);
            if let Some(arn) = secret_arn {
                if Some(arn) != cached_arn {
                    let patch = json!({
                        "metadata": { "annotations": { AGENT_CERTIFICATE_ARN_ANNOTATION: arn } }
                    });
                    certificates
                        .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await?;
                    info!(
                        resource.name = %name,
                        arn = %arn,
                        "cached certificate ARN onto certificate record"
                    );
                }
            }
        } else {
            // Claim the secret: enable it, bind it to this record and seed
            // the cached ARN so the synchronizer verifies instead of
            // importing from scratch.
            let mut desired: BTreeMap<String, String> = BTreeMap::from([
                (AGENT_ENABLED_ANNOTATION.to_string(), "true".to_string()),
                (
                    AGENT_INHERITS_FROM_ANNOTATION.to_string(),
                    certificate_uid.clone(),
                ),
            ]);
            if let Some(arn) =
                annotations::get(&certificate.metadata, AGENT_CERTIFICATE_ARN_ANNOTATION)
            {
                desired.insert(AGENT_CERTIFICATE_ARN_ANNOTATION.to_string(), arn.to_string());
            }
            let patch = json!({ "metadata": { "annotations": desired } });
            secrets
                .patch(&secret_name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            info!(
                resource.name = %name,
                secret = %secret_name,
                "enabled certificate management on bound secret"
            );
        }
    } else if ownership == Ownership::Ours {
        // Intent withdrawn: release the secret. The secret reconciler will
        // ignore it from its next event on.
        strip_agent_annotations(&secrets, &secret).await?;
        info!(
            resource.name = %name,
            secret = %secret_name,
            "withdrew certificate management from bound secret"
        );
    }

    Ok(Action::await_change())
}

fn has_finalizer(certificate: &Certificate) -> bool {
    certificate
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|entry| entry == AGENT_FINALIZER))
}

async fn add_finalizer(
    api: &Api<Certificate>,
    certificate: &Certificate,
) -> Result<(), ReconcilerError> {
    let mut finalizers = certificate.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(AGENT_FINALIZER.to_string());
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(
        &certificate.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    debug!(resource.name = %certificate.name_any(), "added finalizer");
    Ok(())
}

async fn remove_finalizer(api: &Api<Certificate>, name: &str) -> Result<(), ReconcilerError> {
    // Re-fetch for a current resource version before shedding the finalizer.
    let certificate = match api.get(name).await {
        Ok(certificate) => certificate,
        Err(kube::Error::Api(response)) if response.code == 404 => return Ok(()),
        Err(error) => return Err(error.into()),
    };
    let finalizers: Vec<String> = certificate
        .metadata
        .finalizers
        .unwrap_or_default()
        .into_iter()
        .filter(|entry| entry != AGENT_FINALIZER)
        .collect();
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Remove every agent-owned annotation from a secret in one patch.
async fn strip_agent_annotations(
    secrets: &Api<Secret>,
    secret: &Secret,
) -> Result<(), ReconcilerError> {
    let present = AGENT_OWNED_ANNOTATIONS
        .iter()
        .any(|key| annotations::get(&secret.metadata, key).is_some());
    if !present {
        return Ok(());
    }

    let mut removals = serde_json::Map::new();
    for key in AGENT_OWNED_ANNOTATIONS {
        removals.insert(key.to_string(), Value::Null);
    }
    let patch = json!({ "metadata": { "annotations": removals } });
    secrets
        .patch(
            &secret.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
    debug!(secret = %secret.name_any(), "stripped agent annotations");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_secret_without_binding_is_self_managed() {
        assert_eq!(
            evaluate_ownership(true, None, "uid-1"),
            Ownership::SelfManaged
        );
    }

    #[test]
    fn untouched_secret_is_unmanaged() {
        assert_eq!(evaluate_ownership(false, None, "uid-1"), Ownership::Unmanaged);
    }

    #[test]
    fn matching_uid_is_ours_regardless_of_enabled_state() {
        assert_eq!(
            evaluate_ownership(true, Some("uid-1"), "uid-1"),
            Ownership::Ours
        );
        assert_eq!(
            evaluate_ownership(false, Some("uid-1"), "uid-1"),
            Ownership::Ours
        );
    }

    #[test]
    fn different_uid_belongs_to_another_bridge() {
        assert_eq!(
            evaluate_ownership(true, Some("uid-2"), "uid-1"),
            Ownership::Foreign
        );
    }
}
