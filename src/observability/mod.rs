//! # Observability
//!
//! Prometheus metrics for the controllers and the ACM client.

pub mod metrics;
