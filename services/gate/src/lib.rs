//! Resume Rewriter access gate
//!
//! Passwordless sign-in by magic link, cookie sessions, per-address rate
//! limits and a daily quota in front of the resume rewrite endpoint.

pub mod config;
pub mod error;
pub mod gate;
pub mod jwt;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod quota;
pub mod rate_limiter;
pub mod repositories;
pub mod rewriter;
pub mod routes;
pub mod session;
pub mod validation;

use common::clock::Clock;
use std::sync::Arc;

use crate::{
    config::GateConfig,
    gate::AccessGate,
    jwt::{TokenCodec, TokenError},
    mailer::Mailer,
    quota::QuotaEnforcer,
    rate_limiter::{CounterStore, RateLimiter},
    repositories::{SubmissionLedger, UserStore},
    rewriter::Rewriter,
    session::SessionManager,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GateConfig>,
    pub codec: TokenCodec,
    pub sessions: SessionManager,
    pub rate_limiter: RateLimiter,
    pub gate: AccessGate,
    pub users: Arc<dyn UserStore>,
    pub ledger: Arc<dyn SubmissionLedger>,
    pub mailer: Arc<dyn Mailer>,
    pub rewriter: Arc<dyn Rewriter>,
}

/// Collaborators the gate is assembled from
pub struct Backends {
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserStore>,
    pub ledger: Arc<dyn SubmissionLedger>,
    pub counters: Arc<dyn CounterStore>,
    pub mailer: Arc<dyn Mailer>,
    pub rewriter: Arc<dyn Rewriter>,
}

impl AppState {
    /// Wire the gate components together
    pub fn new(config: GateConfig, backends: Backends) -> Result<Self, TokenError> {
        let Backends {
            clock,
            users,
            ledger,
            counters,
            mailer,
            rewriter,
        } = backends;

        let codec = TokenCodec::new(&config.jwt_secret, clock.clone())?;
        let sessions = SessionManager::new(codec.clone(), config.session_ttl, config.is_production());
        let rate_limiter = RateLimiter::new(counters, clock.clone());
        let quota = QuotaEnforcer::new(
            users.clone(),
            ledger.clone(),
            clock.clone(),
            config.quota.clone(),
        );
        let gate = AccessGate::new(
            rate_limiter.clone(),
            config.rewrite_rate,
            sessions.clone(),
            quota,
            ledger.clone(),
            clock,
        );

        Ok(Self {
            config: Arc::new(config),
            codec,
            sessions,
            rate_limiter,
            gate,
            users,
            ledger,
            mailer,
            rewriter,
        })
    }
}
