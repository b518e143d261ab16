//! Daily quota enforcement for the metered rewrite action
//!
//! The enforcer only reads. It counts ledger entries charged to the caller in
//! a trailing window (24 hours, anchored to now) and compares them with the
//! daily cap. Pro entitlement is always read from the user record, never from
//! the session cookie, because the cookie holds a snapshot taken at login.

use chrono::Duration;
use common::{
    clock::Clock,
    error::{DatabaseError, DatabaseResult},
};
use serde::Serialize;
use std::{collections::HashSet, future::Future, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    models::LedgerSubject,
    repositories::{SubmissionLedger, UserStore},
};

/// Quota configuration
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    /// Metered actions allowed per window for free and anonymous callers
    pub daily_cap: u64,
    /// Trailing window the cap applies to
    pub window: Duration,
    /// Upper bound on each datastore lookup
    pub lookup_timeout: std::time::Duration,
    /// Emails exempt from the cap, every use is logged
    pub unlimited_emails: HashSet<String>,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            daily_cap: 1,
            window: Duration::hours(24),
            lookup_timeout: std::time::Duration::from_secs(5),
            unlimited_emails: HashSet::new(),
        }
    }
}

/// Which allowance applied to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaTier {
    AllowListed,
    Pro,
    Free,
    Anonymous,
}

/// How the caller's email was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Carried by a verified session cookie
    Session,
    /// Supplied in the request body; charged but never trusted for bypasses
    Claimed,
}

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaVerdict {
    pub allowed: bool,
    pub tier: QuotaTier,
    /// Entries already charged inside the window (0 for unlimited tiers)
    pub used: u64,
}

impl QuotaVerdict {
    fn unlimited(tier: QuotaTier) -> Self {
        Self {
            allowed: true,
            tier,
            used: 0,
        }
    }
}

/// The datastore could not answer in time
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("quota lookup failed: {0}")]
    Store(#[from] DatabaseError),

    #[error("quota lookup timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Quota enforcer
#[derive(Clone)]
pub struct QuotaEnforcer {
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn SubmissionLedger>,
    clock: Arc<dyn Clock>,
    policy: QuotaPolicy,
}

impl QuotaEnforcer {
    pub fn new(
        users: Arc<dyn UserStore>,
        ledger: Arc<dyn SubmissionLedger>,
        clock: Arc<dyn Clock>,
        policy: QuotaPolicy,
    ) -> Self {
        Self {
            users,
            ledger,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Decide whether `subject` may perform one more metered action
    ///
    /// The allow-list and Pro entitlement apply only to session identities.
    pub async fn allow(
        &self,
        subject: &LedgerSubject,
        source: IdentitySource,
    ) -> Result<QuotaVerdict, QuotaError> {
        let tier = match subject {
            LedgerSubject::Identity(email) if source == IdentitySource::Claimed => {
                debug!("Unverified email {} charged at the free tier", email);
                QuotaTier::Free
            }
            LedgerSubject::Identity(email) => {
                if self.policy.unlimited_emails.contains(email) {
                    info!("Quota bypass for allow-listed identity: {}", email);
                    return Ok(QuotaVerdict::unlimited(QuotaTier::AllowListed));
                }

                let user = self.bounded(self.users.find_by_email(email)).await?;
                if user.is_some_and(|user| user.is_pro) {
                    return Ok(QuotaVerdict::unlimited(QuotaTier::Pro));
                }
                QuotaTier::Free
            }
            LedgerSubject::Anonymous(_) => QuotaTier::Anonymous,
        };

        let since = self.clock.now() - self.policy.window;
        let used = self
            .bounded(self.ledger.count_since(subject, since))
            .await?;
        let allowed = used < self.policy.daily_cap;

        if !allowed {
            info!(
                "Quota exhausted for {:?} ({} of {} used)",
                subject, used, self.policy.daily_cap
            );
        }

        Ok(QuotaVerdict {
            allowed,
            tier,
            used,
        })
    }

    async fn bounded<T>(
        &self,
        lookup: impl Future<Output = DatabaseResult<T>>,
    ) -> Result<T, QuotaError> {
        match tokio::time::timeout(self.policy.lookup_timeout, lookup).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(QuotaError::Timeout(self.policy.lookup_timeout)),
        }
    }
}
