//! # Probe Server
//!
//! HTTP endpoints for Kubernetes probes and Prometheus scraping.
//!
//! Readiness is modelled as a lifecycle phase rather than a bare flag: a
//! replica that is waiting for the leader-election lease reports itself
//! distinctly from one that is still constructing clients, and the probe
//! body names which reconciler families this replica actually runs, so a
//! gated-off family is visible from `kubectl get --raw /readyz` instead of
//! silently absent.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::info;

/// Lifecycle phase reported through the readiness probe. Only `Serving`
/// answers ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Clients are still being constructed.
    Starting = 0,
    /// Blocked on the leader-election lease.
    AwaitingLease = 1,
    /// Controllers are registered and watching.
    Serving = 2,
    /// Shutdown under way; in-flight reconciliations are draining.
    Draining = 3,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Starting => "starting",
            Phase::AwaitingLease => "awaiting-lease",
            Phase::Serving => "serving",
            Phase::Draining => "draining",
        }
    }
}

/// Probe state shared between the runtime and the HTTP server.
pub struct Probes {
    phase: AtomicU8,
    certificate_sync: bool,
    ingress_decoration: bool,
}

impl Probes {
    pub fn new(certificate_sync: bool, ingress_decoration: bool) -> Self {
        Self {
            phase: AtomicU8::new(Phase::Starting as u8),
            certificate_sync,
            ingress_decoration,
        }
    }

    /// Move to the next lifecycle phase.
    pub fn advance(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    fn phase(&self) -> Phase {
        match self.phase.load(Ordering::Relaxed) {
            0 => Phase::Starting,
            1 => Phase::AwaitingLease,
            2 => Phase::Serving,
            _ => Phase::Draining,
        }
    }

    fn describe(&self) -> String {
        let gate = |enabled: bool| if enabled { "enabled" } else { "disabled" };
        format!(
            "phase: {}\ncertificate-sync: {}\ningress-decoration: {}\n",
            self.phase().name(),
            gate(self.certificate_sync),
            gate(self.ingress_decoration),
        )
    }
}

/// Bind the probe server and serve until the process exits.
pub async fn serve_probes(port: u16, probes: Arc<Probes>) -> Result<(), anyhow::Error> {
    let router = Router::new()
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/readyz", get(readiness))
        .route("/metrics", get(render_metrics))
        .with_state(probes);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "probe server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn readiness(State(probes): State<Arc<Probes>>) -> impl IntoResponse {
    let status = match probes.phase() {
        Phase::Serving => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, probes.describe())
}

async fn render_metrics() -> impl IntoResponse {
    let families = crate::observability::metrics::REGISTRY.gather();
    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            buffer,
        )
            .into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {error}"),
        )
            .into_response(),
    }
}
