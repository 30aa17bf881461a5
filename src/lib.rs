//! ACM Sync Controller Library
//!
//! Core functionality for the ACM sync controller: the PEM/chain parser, the
//! ACM sync state machine, the three reconcilers and the provider layer.
//! Tests live next to the modules and under `tests/`.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod server;
