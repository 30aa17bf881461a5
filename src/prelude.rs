//! # Prelude
//!
//! Re-exports the types most callers need.

pub use crate::config::ControllerConfig;
pub use crate::controller::parser::{CertificateDetails, ParseError, ParsedCertificate};
pub use crate::controller::reconciler::{Context, ReconcilerError};
pub use crate::controller::sync::{sync_certificate, SyncOutcome};
pub use crate::crd::{Certificate, CertificateSpec};
pub use crate::provider::{
    AcmCertificateManager, CertificateManager, CertificateTag, ImportRequest, ManagedCertificate,
    ProviderError,
};
pub use crate::runtime::{run, RuntimeOptions};
