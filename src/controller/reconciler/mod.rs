//! # Reconcilers
//!
//! The three reconcilers and the error policy they share. Each runs under its
//! own `kube_runtime::Controller`; they coordinate only through annotations
//! written onto the shared resources, never through in-process state.

pub mod certificate;
pub mod ingress;
pub mod secret;

use std::sync::Arc;

use kube::{Client, Resource, ResourceExt};
use kube_runtime::controller::Action;
use thiserror::Error;
use tracing::error;

use crate::config::ControllerConfig;
use crate::observability::metrics;
use crate::provider::CertificateManager;

/// Shared state handed to every reconciliation. The Kubernetes client and the
/// certificate manager are both thread-safe and shared across reconcilers.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub certificate_manager: Arc<dyn CertificateManager>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Failures that are worth retrying. Everything else (malformed material,
/// absent resources, foreign ownership) is logged and left for the next
/// watch event.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("transient cloud error: {0}")]
    Cloud(#[source] anyhow::Error),
}

/// Requeue failed reconciliations after the fixed latency. One knob covers
/// every transient failure class.
pub fn error_policy<K>(object: Arc<K>, error: &ReconcilerError, ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    error!(
        resource.name = %object.name_any(),
        resource.namespace = %object.namespace().unwrap_or_default(),
        error = %error,
        "reconciliation failed; requeueing"
    );
    metrics::increment_reconciliation_errors();
    metrics::increment_requeues();
    Action::requeue(ctx.config.requeue_latency())
}
