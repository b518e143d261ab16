//! Request extractors and middleware

use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use std::{convert::Infallible, net::SocketAddr};
use tracing::warn;

use crate::{AppState, error::GateError};

/// Header carrying the admin shared secret
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Best-effort client address used to key rate limits and anonymous quota
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl ClientAddr {
    /// First `x-forwarded-for` entry, then `x-real-ip`, then the peer address
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let addr = header("x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or_else(|| header("x-real-ip"))
            .map(str::to_string)
            .or_else(|| peer.map(|peer| peer.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());

        ClientAddr(addr)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientAddr::from_parts(&parts.headers, peer))
    }
}

/// Reject admin requests without the configured `x-admin-key`
///
/// With no key configured every admin request is rejected.
pub async fn admin_guard(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, GateError> {
    let supplied = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let authorized = match (state.config.admin_api_key.as_deref(), supplied) {
        (Some(expected), Some(supplied)) => keys_match(expected, supplied),
        _ => false,
    };

    if !authorized {
        warn!("Rejected admin request to {}", req.uri().path());
        return Err(GateError::AdminUnauthorized);
    }

    Ok(next.run(req).await)
}

fn keys_match(expected: &str, supplied: &str) -> bool {
    let (a, b) = (expected.as_bytes(), supplied.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
