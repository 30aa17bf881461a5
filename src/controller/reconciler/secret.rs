//! # Secret Reconciler
//!
//! Synchronizes managed TLS secrets into ACM and stamps the resulting
//! identifiers back onto the secret. Reconciliation is idempotent: on a
//! converged secret the only cloud call is a describe-by-ARN and no
//! annotation write happens.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::constants::TLS_SECRET_TYPE;
use crate::controller::annotations;
use crate::controller::parser;
use crate::controller::reconciler::{Context, ReconcilerError};
use crate::controller::sync;
use crate::observability::metrics;
use crate::provider::ProviderError;

pub async fn reconcile(secret: Arc<Secret>, ctx: Arc<Context>) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let name = secret.name_any();
    let namespace = secret.namespace().unwrap_or_default();
    metrics::increment_reconciliations("secret");

    // The watcher already filters on the TLS field selector; keep the check
    // anyway so a direct invocation cannot touch other secret types.
    if secret.type_.as_deref() != Some(TLS_SECRET_TYPE) {
        return Ok(Action::await_change());
    }

    // Synced ACM certificates are never removed, so deletion needs no work.
    if secret.metadata.deletion_timestamp.is_some() {
        debug!(resource.name = %name, "secret marked for deletion; nothing to clean up");
        return Ok(Action::await_change());
    }

    if !annotations::is_enabled(&secret.metadata) {
        return Ok(Action::await_change());
    }

    let mut details = match parser::parse_certificate_details(&secret) {
        Ok(details) => details,
        Err(error) => {
            // Malformed material cannot be retried into shape; the secret has
            // to be republished by whoever produced it.
            warn!(
                resource.name = %name,
                resource.namespace = %namespace,
                error = %error,
                "could not parse certificate material"
            );
            return Ok(Action::await_change());
        }
    };

    let now = Utc::now();
    if details.leaf.not_before > now {
        warn!(resource.name = %name, not_before = %details.leaf.not_before, "certificate is not yet valid");
        return Ok(Action::await_change());
    }
    if details.leaf.not_after < now {
        warn!(resource.name = %name, not_after = %details.leaf.not_after, "certificate has expired");
        return Ok(Action::await_change());
    }

    let outcome = match sync::sync_certificate(ctx.certificate_manager.as_ref(), &mut details).await
    {
        Ok(outcome) => outcome,
        Err(ProviderError::Transient(error)) => return Err(ReconcilerError::Cloud(error)),
        Err(ProviderError::Rejected(error)) => {
            warn!(
                resource.name = %name,
                resource.namespace = %namespace,
                error = %error,
                "cloud rejected the request; waiting for the next change"
            );
            return Ok(Action::await_change());
        }
    };

    // Observers key off all four annotations together, so a mismatch in any
    // of them rewrites the whole set through a single update.
    let desired = annotations::desired_secret_annotations(&outcome.certificate_arn, &details.leaf);
    let differs = desired.iter().any(|(key, value)| {
        annotations::get(&secret.metadata, key) != Some(value.as_str())
    });
    if differs {
        let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);
        let patch = json!({ "metadata": { "annotations": desired } });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!(
            resource.name = %name,
            resource.namespace = %namespace,
            arn = %outcome.certificate_arn,
            imported = outcome.imported,
            "updated certificate annotations"
        );
    } else {
        debug!(resource.name = %name, "secret already converged");
    }

    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    Ok(Action::await_change())
}
