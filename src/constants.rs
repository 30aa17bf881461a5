//! # Constants
//!
//! Annotation keys, finalizer and tag names shared across the controllers.
//!
//! The agent-owned annotation keys form a stable wire contract: downstream
//! consumers (and the ingress decorator) read them, so renaming any of them
//! is a breaking change.

pub const PACKAGE_NAME: &str = "acm-sync-controller";
pub const DOMAIN_NAME: &str = "kubecert.io";

/// `{package}.{domain}` prefix under which all agent annotations live.
pub const AGENT_PREFIX: &str = "acm-sync-controller.kubecert.io";

/// Truthy value opts a Secret, Certificate or Ingress into management.
pub const AGENT_ENABLED_ANNOTATION: &str = "acm-sync-controller.kubecert.io/enabled";
/// UID of the Certificate record that owns a bridged Secret.
pub const AGENT_INHERITS_FROM_ANNOTATION: &str = "acm-sync-controller.kubecert.io/inherits-from";
/// ARN of the ACM certificate a Secret was synchronized to.
pub const AGENT_CERTIFICATE_ARN_ANNOTATION: &str =
    "acm-sync-controller.kubecert.io/certificate-arn";
/// Leaf SAN DNS names, comma-separated.
pub const AGENT_CERTIFICATE_DOMAIN_NAMES_ANNOTATION: &str =
    "acm-sync-controller.kubecert.io/domains";
/// Leaf serial number as lowercase colon-separated hex pairs.
pub const AGENT_CERTIFICATE_SERIAL_NUMBER_ANNOTATION: &str =
    "acm-sync-controller.kubecert.io/serial-number";
/// Leaf NotAfter as ISO-8601.
pub const AGENT_CERTIFICATE_EXPIRY_DATE_ANNOTATION: &str =
    "acm-sync-controller.kubecert.io/expires";

/// Every annotation the agent writes onto a Secret. Stripped in one pass when
/// management is withdrawn.
pub const AGENT_OWNED_ANNOTATIONS: [&str; 6] = [
    AGENT_ENABLED_ANNOTATION,
    AGENT_INHERITS_FROM_ANNOTATION,
    AGENT_CERTIFICATE_ARN_ANNOTATION,
    AGENT_CERTIFICATE_DOMAIN_NAMES_ANNOTATION,
    AGENT_CERTIFICATE_SERIAL_NUMBER_ANNOTATION,
    AGENT_CERTIFICATE_EXPIRY_DATE_ANNOTATION,
];

/// Finalizer (`{domain}/{name}`) the bridge holds on Certificate records so
/// annotation cleanup runs before the record disappears.
pub const AGENT_FINALIZER: &str = "kubecert.io/acm-sync-controller";

pub const ALB_INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
pub const ALB_INGRESS_CLASS: &str = "alb";
pub const ALB_INGRESS_LISTEN_PORTS_ANNOTATION: &str = "alb.ingress.kubernetes.io/listen-ports";
pub const ALB_INGRESS_CERTIFICATE_ARN_ANNOTATION: &str =
    "alb.ingress.kubernetes.io/certificate-arn";

/// Secret type and data keys the synchronizer reads.
pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";
pub const TLS_SECRET_FIELD_SELECTOR: &str = "type=kubernetes.io/tls";
pub const TLS_CERTIFICATE_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

pub const PEM_CERTIFICATE_BEGIN_TAG: &str = "-----BEGIN CERTIFICATE-----";
pub const PEM_CERTIFICATE_END_TAG: &str = "-----END CERTIFICATE-----";

/// Provenance tags stamped onto freshly imported ACM certificates.
pub const TAG_CORRELATION_ID: &str = "acm-sync/correlationId";
pub const TAG_CREATED_BY: &str = "acm-sync/createdBy";
pub const TAG_CREATED_AT: &str = "acm-sync/createdAt";
pub const TAG_MODIFIED_AT: &str = "acm-sync/modifiedAt";

/// Fixed latency for requeueing failed or waiting reconciliations (seconds).
pub const DEFAULT_REQUEUE_LATENCY_SECS: u64 = 15;

/// Page size used when enumerating ACM certificates.
pub const ACM_LIST_PAGE_SIZE: i32 = 10;

/// Default HTTP server port for metrics and health probes.
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default namespace for the leader-election lease.
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "acm-sync-system";

/// Name of the leader-election lease.
pub const LEADER_LEASE_NAME: &str = "acm-sync-controller-leader";
