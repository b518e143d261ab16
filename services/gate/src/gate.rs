//! Access gate for the metered rewrite action
//!
//! A request moves through three checks, each a separate type so a later
//! check cannot run before an earlier one:
//!
//! ```text
//! AccessGate::rate_check ──► RateChecked::resolve_identity ──► IdentityResolved::check_quota ──► Admission
//!        │                                                              │
//!        └── Denial::RateLimited                                        └── Denial::QuotaExceeded / Unavailable
//! ```
//!
//! Resolving the identity never denies; a caller without a session or a
//! supplied email is metered by client address. A supplied email is charged
//! like a free account and never unlocks an allow-list or Pro bypass.

use common::clock::Clock;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    models::{LedgerSubject, NewSubmission, User},
    quota::{IdentitySource, QuotaEnforcer, QuotaError, QuotaVerdict},
    rate_limiter::{RateLimiter, RatePolicy},
    repositories::SubmissionLedger,
    session::SessionManager,
    validation::normalize_email,
};

/// Everything the gate needs to know about one request
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    pub client_addr: &'a str,
    pub cookie_header: Option<&'a str>,
    pub supplied_email: Option<&'a str>,
}

/// Why a request was turned away
#[derive(Debug)]
pub enum Denial {
    RateLimited,
    QuotaExceeded(QuotaVerdict),
    /// The quota could not be determined; the request is refused
    Unavailable(QuotaError),
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::RateLimited => "rate_limited",
            Denial::QuotaExceeded(_) => "quota_exceeded",
            Denial::Unavailable(_) => "quota_unavailable",
        }
    }
}

/// Access gate
#[derive(Clone)]
pub struct AccessGate {
    limiter: RateLimiter,
    rate_policy: RatePolicy,
    sessions: SessionManager,
    quota: QuotaEnforcer,
    ledger: Arc<dyn SubmissionLedger>,
    clock: Arc<dyn Clock>,
}

impl AccessGate {
    pub fn new(
        limiter: RateLimiter,
        rate_policy: RatePolicy,
        sessions: SessionManager,
        quota: QuotaEnforcer,
        ledger: Arc<dyn SubmissionLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            rate_policy,
            sessions,
            quota,
            ledger,
            clock,
        }
    }

    /// First step: per-address rate limit for the metered action
    pub async fn rate_check(&self, client_addr: &str) -> Result<RateChecked<'_>, Denial> {
        let decision = self
            .limiter
            .check_policy(&self.rate_policy, client_addr)
            .await;

        if decision.limited {
            return Err(Denial::RateLimited);
        }

        Ok(RateChecked {
            gate: self,
            client_addr: client_addr.to_string(),
        })
    }

    /// Run every step for one request
    pub async fn admit(&self, request: GateRequest<'_>) -> Result<Admission, Denial> {
        self.rate_check(request.client_addr)
            .await?
            .resolve_identity(request.cookie_header, request.supplied_email)
            .check_quota()
            .await
    }

    /// Append the ledger entry for an admitted action
    ///
    /// Failures are logged and swallowed: the caller already has its result
    /// and an unrecorded action only under-counts.
    pub async fn record_usage(
        &self,
        admission: &Admission,
        input: serde_json::Value,
        output: serde_json::Value,
    ) {
        let entry = NewSubmission {
            subject: admission.subject.clone(),
            created_at: self.clock.now(),
            input,
            output,
        };

        if let Err(e) = self.ledger.append(entry).await {
            warn!(
                "Failed to record usage for {:?}, continuing: {}",
                admission.subject, e
            );
        }
    }
}

/// Passed the rate limit
pub struct RateChecked<'g> {
    gate: &'g AccessGate,
    client_addr: String,
}

impl<'g> RateChecked<'g> {
    /// Work out who is asking
    ///
    /// A valid session wins over a supplied email, which wins over the client
    /// address.
    pub fn resolve_identity(
        self,
        cookie_header: Option<&str>,
        supplied_email: Option<&str>,
    ) -> IdentityResolved<'g> {
        let session = self.gate.sessions.resolve_session(cookie_header);

        let email = session
            .as_ref()
            .map(|user| normalize_email(&user.email))
            .or_else(|| {
                supplied_email
                    .map(normalize_email)
                    .filter(|email| !email.is_empty())
            });

        IdentityResolved {
            gate: self.gate,
            subject: LedgerSubject::for_caller(email.as_deref(), &self.client_addr),
            session,
        }
    }
}

/// Knows who the request is charged to
pub struct IdentityResolved<'g> {
    gate: &'g AccessGate,
    subject: LedgerSubject,
    session: Option<User>,
}

impl IdentityResolved<'_> {
    pub fn subject(&self) -> &LedgerSubject {
        &self.subject
    }

    /// Last step: consult the quota
    pub async fn check_quota(self) -> Result<Admission, Denial> {
        let source = match self.session {
            Some(_) => IdentitySource::Session,
            None => IdentitySource::Claimed,
        };
        let verdict = self
            .gate
            .quota
            .allow(&self.subject, source)
            .await
            .map_err(Denial::Unavailable)?;

        if !verdict.allowed {
            return Err(Denial::QuotaExceeded(verdict));
        }

        info!("Admitted {:?} ({:?} tier)", self.subject, verdict.tier);
        Ok(Admission {
            subject: self.subject,
            verdict,
            session: self.session,
        })
    }
}

/// A request allowed to perform the metered action
#[derive(Debug, Clone)]
pub struct Admission {
    pub subject: LedgerSubject,
    pub verdict: QuotaVerdict,
    /// The session user, when the identity came from a cookie
    pub session: Option<User>,
}
