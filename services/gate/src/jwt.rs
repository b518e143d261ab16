//! Token codec for signing and verifying short-lived identity tokens
//!
//! Tokens are HS256 JWTs signed with the server-held secret. Every token
//! carries an absolute `exp` fixed at issuance and a `token_type` so a
//! magic-link token can never stand in for a session token. Expiry is
//! checked against the injected [`Clock`] rather than inside `jsonwebtoken`,
//! with no leeway.

use chrono::{DateTime, Duration, Utc};
use common::clock::Clock;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Emailed sign-in token
    MagicLink,
    /// Cookie-borne session token
    Session,
}

/// Payload carried inside a token envelope
pub trait TokenSubject: Serialize + DeserializeOwned {
    const TOKEN_TYPE: TokenType;
}

/// Subject of a magic-link token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagicLinkSubject {
    pub email: String,
}

impl TokenSubject for MagicLinkSubject {
    const TOKEN_TYPE: TokenType = TokenType::MagicLink;
}

/// Subject of a session token
///
/// `is_pro` and `created_at` are a snapshot taken when the session started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSubject {
    #[serde(rename = "sub")]
    pub user_id: Uuid,
    pub email: String,
    pub is_pro: bool,
    pub created_at: DateTime<Utc>,
}

impl TokenSubject for SessionSubject {
    const TOKEN_TYPE: TokenType = TokenType::Session;
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims<S> {
    #[serde(flatten)]
    pub subject: S,
    /// Token type
    pub token_type: TokenType,
    /// Issued at time (seconds since epoch)
    pub iat: i64,
    /// Expiration time (seconds since epoch)
    pub exp: i64,
}

impl<S> Claims<S> {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Failure to build a codec or sign a token
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing secret is empty")]
    MissingSecret,

    #[error("token ttl must be positive")]
    InvalidTtl,

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// A token failed verification
///
/// Deliberately carries no cause: tampered, expired, malformed and
/// wrong-type tokens are indistinguishable to the caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid or expired token")]
pub struct InvalidToken;

/// Token codec
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Initialize a new codec from the signing secret
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(TokenCodec {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock,
        })
    }

    /// Sign `subject` into a token that expires `ttl` from now
    pub fn issue<S: TokenSubject>(&self, subject: S, ttl: Duration) -> Result<String, TokenError> {
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidTtl);
        }

        // Claims carry whole seconds; round the expiry up so the token
        // never dies before `now + ttl`
        let now = self.clock.now();
        let expires = now + ttl;
        let exp = expires.timestamp() + i64::from(expires.timestamp_subsec_nanos() > 0);
        let claims = Claims {
            subject,
            token_type: S::TOKEN_TYPE,
            iat: now.timestamp(),
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a token and return the claims
    pub fn verify<S: TokenSubject>(&self, token: &str) -> Result<Claims<S>, InvalidToken> {
        let claims = decode::<Claims<S>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                InvalidToken
            })?
            .claims;

        if claims.token_type != S::TOKEN_TYPE {
            debug!(
                "Token rejected: expected {:?}, got {:?}",
                S::TOKEN_TYPE,
                claims.token_type
            );
            return Err(InvalidToken);
        }

        let expires_at = claims.expires_at().ok_or(InvalidToken)?;
        if self.clock.now() > expires_at {
            debug!("Token rejected: expired at {}", expires_at);
            return Err(InvalidToken);
        }

        Ok(claims)
    }
}
