//! # Runtime
//!
//! Initialization and the controller watch loops: builds the shared clients,
//! optionally waits for leadership, then registers one controller per enabled
//! reconciler family and runs them until shutdown.

mod leader;

pub use leader::LeaderElection;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use kube::Client;
use kube_runtime::{watcher, Controller};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ControllerConfig;
use crate::constants::{PACKAGE_NAME, TLS_SECRET_FIELD_SELECTOR};
use crate::controller::reconciler::{self, Context};
use crate::crd::Certificate;
use crate::observability::metrics;
use crate::provider::{aws, AcmCertificateManager, CertificateManager};
use crate::server::{serve_probes, Phase, Probes};

/// Runtime settings taken from the command line. None of these affect the
/// reconciliation semantics.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Port for the metrics and health probe server.
    pub metrics_port: u16,
    /// Block for a Lease before registering the controllers.
    pub leader_elect: bool,
}

/// Initialize shared state and run the enabled controllers until shutdown.
pub async fn run(options: RuntimeOptions) -> Result<()> {
    let config = ControllerConfig::from_env();
    info!(
        certificate_sync = config.enable_certificate_sync,
        ingress_decoration = config.enable_ingress_decoration,
        "Loaded controller configuration"
    );

    metrics::register_metrics().context("Failed to register metrics")?;

    let probes = Arc::new(Probes::new(
        config.enable_certificate_sync,
        config.enable_ingress_decoration,
    ));
    let probes_for_server = probes.clone();
    let metrics_port = options.metrics_port;
    tokio::spawn(async move {
        if let Err(error) = serve_probes(metrics_port, probes_for_server).await {
            tracing::error!("probe server error: {error}");
        }
    });

    // Client construction failures are fatal: without either client the
    // process cannot do anything useful.
    let client = Client::try_default()
        .await
        .context("Failed to construct Kubernetes client")?;
    let sdk_config = aws::load_sdk_config().await;
    let certificate_manager: Arc<dyn CertificateManager> =
        Arc::new(AcmCertificateManager::new(&sdk_config));

    // Followers block here until the lease is theirs.
    let election = if options.leader_elect {
        probes.advance(Phase::AwaitingLease);
        let identity = std::env::var("POD_NAME")
            .unwrap_or_else(|_| format!("{PACKAGE_NAME}-{}", Uuid::new_v4()));
        let election =
            LeaderElection::new(client.clone(), &config.controller_namespace, &identity);
        election.wait_until_leading().await;
        Some(election)
    } else {
        None
    };

    let context = Arc::new(Context {
        client: client.clone(),
        certificate_manager,
        config: config.clone(),
    });

    let mut controllers: Vec<BoxFuture<'static, ()>> = Vec::new();

    if config.enable_certificate_sync {
        // Secrets: the field selector narrows the watch to TLS material.
        let secrets: Api<Secret> = Api::all(client.clone());
        let secret_controller = Controller::new(
            secrets,
            watcher::Config::default().fields(TLS_SECRET_FIELD_SELECTOR),
        )
        .shutdown_on_signal()
        .run(
            reconciler::secret::reconcile,
            reconciler::error_policy,
            context.clone(),
        )
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(object = %object, "secret reconciled"),
                Err(error) => warn!(error = %error, "secret controller error"),
            }
        });
        controllers.push(secret_controller.boxed());

        let certificates: Api<Certificate> = Api::all(client.clone());
        let certificate_controller = Controller::new(certificates, watcher::Config::default())
            .shutdown_on_signal()
            .run(
                reconciler::certificate::reconcile,
                reconciler::error_policy,
                context.clone(),
            )
            .for_each(|result| async move {
                match result {
                    Ok((object, _)) => debug!(object = %object, "certificate reconciled"),
                    Err(error) => warn!(error = %error, "certificate controller error"),
                }
            });
        controllers.push(certificate_controller.boxed());
    }

    if config.enable_ingress_decoration {
        let ingresses: Api<Ingress> = Api::all(client.clone());
        let ingress_controller = Controller::new(ingresses, watcher::Config::default())
            .shutdown_on_signal()
            .run(
                reconciler::ingress::reconcile,
                reconciler::error_policy,
                context.clone(),
            )
            .for_each(|result| async move {
                match result {
                    Ok((object, _)) => debug!(object = %object, "ingress reconciled"),
                    Err(error) => warn!(error = %error, "ingress controller error"),
                }
            });
        controllers.push(ingress_controller.boxed());
    }

    probes.advance(Phase::Serving);

    if controllers.is_empty() {
        warn!("Both reconciler families are disabled; serving probes only");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
    } else {
        info!("Controllers registered, starting watch loops...");
        let controllers = futures::future::join_all(controllers);
        match election {
            Some(election) => {
                // A deposed leader must stop reconciling immediately; exiting
                // lets the deployment restart us as a follower.
                tokio::select! {
                    _ = controllers => {}
                    _ = election.keep_leading() => {
                        probes.advance(Phase::Draining);
                        anyhow::bail!("leadership lost; exiting so a fresh replica can take over");
                    }
                }
            }
            None => {
                controllers.await;
            }
        }
    }

    probes.advance(Phase::Draining);
    info!("Controllers stopped gracefully");
    Ok(())
}
