//! # Controller
//!
//! Parsing, the ACM sync state machine and the three reconcilers.

pub mod annotations;
pub mod parser;
pub mod reconciler;
pub mod sync;
