//! Errors returned to HTTP callers

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::gate::Denial;

pub const MSG_TOO_MANY_REQUESTS: &str = "Too many requests. Please try again later.";
pub const MSG_QUOTA_EXCEEDED: &str = "Daily quota exceeded. Upgrade to Pro for unlimited rewrites.";
pub const MSG_INTERNAL: &str = "Something went wrong. Please try again.";

/// Error type for every gate endpoint
#[derive(Debug, Error)]
pub enum GateError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing token")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Not authenticated")]
    Unauthenticated,

    /// Missing or wrong admin key
    #[error("Unauthorized")]
    AdminUnauthorized,

    #[error("{}", MSG_TOO_MANY_REQUESTS)]
    RateLimited,

    #[error("{}", MSG_QUOTA_EXCEEDED)]
    QuotaExceeded,

    /// Anything the caller cannot act on; details are logged, not returned
    #[error("{}", MSG_INTERNAL)]
    Internal(#[source] anyhow::Error),
}

impl GateError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        GateError::Internal(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GateError::Validation(_) | GateError::MissingToken => StatusCode::BAD_REQUEST,
            GateError::InvalidToken
            | GateError::Unauthenticated
            | GateError::AdminUnauthorized => StatusCode::UNAUTHORIZED,
            GateError::RateLimited | GateError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code sent alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            GateError::Validation(_) => "invalid_input",
            GateError::MissingToken => "missing_token",
            GateError::InvalidToken => "invalid_token",
            GateError::Unauthenticated => "unauthenticated",
            GateError::AdminUnauthorized => "unauthorized",
            GateError::RateLimited => "rate_limited",
            GateError::QuotaExceeded => "quota_exceeded",
            GateError::Internal(_) => "internal",
        }
    }
}

/// Type alias for gate handler results
pub type GateResult<T> = Result<T, GateError>;

impl From<Denial> for GateError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::RateLimited => GateError::RateLimited,
            Denial::QuotaExceeded(_) => GateError::QuotaExceeded,
            Denial::Unavailable(e) => GateError::Internal(e.into()),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        if let GateError::Internal(source) = &self {
            error!("Request failed: {:#}", source);
        }

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}
