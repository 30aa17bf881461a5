//! # Leader Election
//!
//! At most one replica reconciles. Replicas race for a single
//! `coordination.k8s.io/v1` Lease; losers poll until the claim expires, the
//! winner renews until renewal fails, and a deposed leader exits so the
//! deployment restarts it as a follower.
//!
//! Claims are written as full replacements carrying the observed
//! `resourceVersion`, so two replicas acting on the same stale read cannot
//! both succeed: the second write fails with a conflict. The lease TTL (45s)
//! is three renewal periods (15s), which keeps a healthy holder comfortably
//! inside its claim while letting a crashed one be displaced within a minute.

use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::{debug, info, warn};

use crate::constants::LEADER_LEASE_NAME;

/// Seconds a claim stays valid without renewal.
const LEASE_TTL_SECS: i32 = 45;
/// Renewal cadence while holding the lease.
const RENEW_EVERY: Duration = Duration::from_secs(15);
/// Poll cadence while another replica holds it.
const RETRY_EVERY: Duration = Duration::from_secs(3);

/// What the current lease object says about who leads.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LeaseState {
    /// No lease, no holder, or a claim that has expired.
    Open,
    /// This replica's claim, still valid.
    Ours,
    /// Another replica's claim, still valid.
    Taken { holder: String },
}

/// Read the claim out of a lease against the clock. Pure so the expiry
/// arithmetic is testable without an API server.
fn classify(lease: Option<&Lease>, identity: &str, now: DateTime<Utc>) -> LeaseState {
    let Some(spec) = lease.and_then(|lease| lease.spec.as_ref()) else {
        return LeaseState::Open;
    };
    let Some(holder) = spec.holder_identity.as_deref().filter(|holder| !holder.is_empty()) else {
        return LeaseState::Open;
    };
    if holder == identity {
        return LeaseState::Ours;
    }
    let ttl = chrono::Duration::seconds(i64::from(spec.lease_duration_seconds.unwrap_or(0)));
    let live = spec
        .renew_time
        .as_ref()
        .is_some_and(|renewed| now < renewed.0 + ttl);
    if live {
        LeaseState::Taken {
            holder: holder.to_string(),
        }
    } else {
        LeaseState::Open
    }
}

pub struct LeaderElection {
    api: Api<Lease>,
    identity: String,
}

impl LeaderElection {
    pub fn new(client: Client, namespace: &str, identity: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            identity: identity.to_string(),
        }
    }

    /// Block until this replica holds the lease. Errors are retried
    /// indefinitely; a follower has nothing better to do.
    pub async fn wait_until_leading(&self) {
        info!(
            identity = %self.identity,
            lease = LEADER_LEASE_NAME,
            "waiting for leadership"
        );
        loop {
            match self.tick().await {
                Ok(true) => {
                    info!(identity = %self.identity, "leadership acquired");
                    return;
                }
                Ok(false) => {}
                Err(error) if is_conflict(&error) => {
                    debug!(identity = %self.identity, "lost the race for the lease; retrying");
                }
                Err(error) => {
                    warn!(
                        identity = %self.identity,
                        error = %error,
                        "could not read or claim the lease; retrying"
                    );
                }
            }
            tokio::time::sleep(RETRY_EVERY).await;
        }
    }

    /// Renew the claim until it is lost. Resolves only on loss, so the
    /// runtime can race it against the controller futures.
    pub async fn keep_leading(&self) {
        loop {
            tokio::time::sleep(RENEW_EVERY).await;
            match self.tick().await {
                Ok(true) => debug!(identity = %self.identity, "lease renewed"),
                Ok(false) => {
                    warn!(identity = %self.identity, "lease now held by another replica");
                    return;
                }
                Err(error) => {
                    // A renewal that cannot be confirmed is treated as a
                    // loss: reconciling without a live claim risks two
                    // active replicas.
                    warn!(identity = %self.identity, error = %error, "could not renew the lease");
                    return;
                }
            }
        }
    }

    /// One election step: read the lease and, when the claim is open or
    /// already ours, write it back under the observed resource version.
    /// Returns whether this replica leads afterwards.
    async fn tick(&self) -> Result<bool, kube::Error> {
        let existing = self.api.get_opt(LEADER_LEASE_NAME).await?;
        let now = Utc::now();

        match classify(existing.as_ref(), &self.identity, now) {
            LeaseState::Taken { holder } => {
                debug!(holder = %holder, "lease held by another replica");
                Ok(false)
            }
            state => {
                let claim = self.build_claim(existing.as_ref(), state == LeaseState::Ours, now);
                match &existing {
                    Some(_) => {
                        self.api
                            .replace(LEADER_LEASE_NAME, &PostParams::default(), &claim)
                            .await?;
                    }
                    None => {
                        self.api.create(&PostParams::default(), &claim).await?;
                    }
                }
                Ok(true)
            }
        }
    }

    /// The lease as it should look with our claim on it. Renewals keep the
    /// original acquire time and transition count; displacing a previous
    /// holder bumps the transition count.
    fn build_claim(&self, existing: Option<&Lease>, renewing: bool, now: DateTime<Utc>) -> Lease {
        let prior = existing.and_then(|lease| lease.spec.as_ref());

        let acquire_time = if renewing {
            prior
                .and_then(|spec| spec.acquire_time.clone())
                .unwrap_or(MicroTime(now))
        } else {
            MicroTime(now)
        };
        let displacing =
            !renewing && prior.and_then(|spec| spec.holder_identity.as_ref()).is_some();
        let transitions =
            prior.and_then(|spec| spec.lease_transitions).unwrap_or(0) + i32::from(displacing);

        Lease {
            metadata: ObjectMeta {
                name: Some(LEADER_LEASE_NAME.to_string()),
                // Carrying the observed version turns the write into a
                // compare-and-swap; a racing replica gets a 409.
                resource_version: existing.and_then(|lease| lease.metadata.resource_version.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(LEASE_TTL_SECS),
                acquire_time: Some(acquire_time),
                renew_time: Some(MicroTime(now)),
                lease_transitions: Some(transitions),
                ..LeaseSpec::default()
            }),
        }
    }
}

fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 409)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lease_renewed_secs_ago(holder: Option<&str>, seconds: i64, ttl: i32) -> Lease {
        Lease {
            metadata: ObjectMeta::default(),
            spec: Some(LeaseSpec {
                holder_identity: holder.map(ToString::to_string),
                lease_duration_seconds: Some(ttl),
                renew_time: Some(MicroTime(Utc::now() - chrono::Duration::seconds(seconds))),
                ..LeaseSpec::default()
            }),
        }
    }

    #[test]
    fn missing_lease_is_open() {
        assert_eq!(classify(None, "replica-a", Utc::now()), LeaseState::Open);
    }

    #[test]
    fn blank_holder_is_open() {
        let lease = lease_renewed_secs_ago(Some(""), 0, 45);
        assert_eq!(
            classify(Some(&lease), "replica-a", Utc::now()),
            LeaseState::Open
        );
    }

    #[test]
    fn own_claim_is_recognized() {
        let lease = lease_renewed_secs_ago(Some("replica-a"), 0, 45);
        assert_eq!(
            classify(Some(&lease), "replica-a", Utc::now()),
            LeaseState::Ours
        );
    }

    #[test]
    fn live_foreign_claim_blocks() {
        let lease = lease_renewed_secs_ago(Some("replica-b"), 10, 45);
        assert_eq!(
            classify(Some(&lease), "replica-a", Utc::now()),
            LeaseState::Taken {
                holder: "replica-b".to_string()
            }
        );
    }

    #[test]
    fn expired_foreign_claim_is_open() {
        let lease = lease_renewed_secs_ago(Some("replica-b"), 120, 45);
        assert_eq!(
            classify(Some(&lease), "replica-a", Utc::now()),
            LeaseState::Open
        );
    }

    #[test]
    fn claim_without_renew_time_is_open() {
        let lease = Lease {
            metadata: ObjectMeta::default(),
            spec: Some(LeaseSpec {
                holder_identity: Some("replica-b".to_string()),
                lease_duration_seconds: Some(45),
                ..LeaseSpec::default()
            }),
        };
        assert_eq!(
            classify(Some(&lease), "replica-a", Utc::now()),
            LeaseState::Open
        );
    }
}
