//! # ACM Sync Controller
//!
//! A Kubernetes controller that keeps AWS Certificate Manager in sync with
//! TLS material produced inside the cluster and wires the resulting ARNs into
//! ALB ingress configuration.
//!
//! Three reconcilers share the process:
//!
//! 1. **Certificate bridge** - propagates management intent from cert-manager
//!    `Certificate` records down to the TLS secret that holds the material,
//!    and cleans up through a finalizer.
//! 2. **Secret synchronizer** - parses the PEM bundle, orders the chain,
//!    deduplicates against ACM, imports when necessary and stamps the ARN,
//!    serial, expiry and SAN list back onto the secret.
//! 3. **Ingress decorator** - resolves ALB ingress hosts against synchronized
//!    secrets and writes the certificate ARN annotation the load-balancer
//!    controller consumes.
//!
//! All coordination happens through annotations on shared resources; the
//! process holds no durable state of its own.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use acm_sync_controller::constants::DEFAULT_METRICS_PORT;
use acm_sync_controller::runtime::{run, RuntimeOptions};

#[derive(Parser, Debug)]
#[command(name = "acm-sync-controller", version, about)]
struct Cli {
    /// Port the metrics and health probe server binds to.
    #[arg(long, default_value_t = DEFAULT_METRICS_PORT)]
    metrics_port: u16,

    /// Enable Lease-based leader election. Ensures at most one replica
    /// reconciles when running more than one.
    #[arg(long, default_value_t = false)]
    leader_elect: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acm_sync_controller=info".into()),
        )
        .init();

    info!("Starting ACM sync controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    run(RuntimeOptions {
        metrics_port: cli.metrics_port,
        leader_elect: cli.leader_elect,
    })
    .await
}
