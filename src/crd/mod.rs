//! # cert-manager Certificate
//!
//! Partial view of the cert-manager `Certificate` custom resource
//! (`cert-manager.io/v1`). Only the fields the bridge reads are modelled;
//! the full schema is owned and served by cert-manager itself.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Name of the secret the issuer writes the signed key pair into. The
    /// bridge resolves it in the certificate's own namespace.
    pub secret_name: String,

    /// Requested DNS names. Informational here; the synchronizer reads the
    /// names from the issued leaf, not from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_names: Option<Vec<String>>,
}
