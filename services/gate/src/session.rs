//! Session management using signed cookies
//!
//! A session is a [`SessionSubject`] token carried in the `auth_token`
//! cookie. Nothing is stored server-side; ending a session only clears the
//! cookie on the client.

use axum::http::{HeaderMap, header::COOKIE};
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::Duration;
use tracing::{debug, info};

use crate::{
    jwt::{SessionSubject, TokenCodec, TokenError},
    models::User,
};

/// Name of the session cookie
pub const SESSION_COOKIE_NAME: &str = "auth_token";

/// Session manager for issuing and resolving session cookies
#[derive(Clone)]
pub struct SessionManager {
    codec: TokenCodec,
    ttl: Duration,
    secure: bool,
}

impl SessionManager {
    /// Create a new session manager
    ///
    /// `secure` controls the cookie's `Secure` attribute and should be set
    /// in production.
    pub fn new(codec: TokenCodec, ttl: Duration, secure: bool) -> Self {
        Self { codec, ttl, secure }
    }

    /// Issue a session cookie for a user who just proved their identity
    pub fn start_session(&self, user: &User) -> Result<Cookie<'static>, TokenError> {
        info!("Starting session for user: {}", user.id);

        let token = self.codec.issue(
            SessionSubject {
                user_id: user.id,
                email: user.email.clone(),
                is_pro: user.is_pro,
                created_at: user.created_at,
            },
            self.ttl,
        )?;

        Ok(self.cookie(token, self.ttl))
    }

    /// Resolve the identity carried by a raw `Cookie` header, if any
    pub fn resolve_session(&self, cookie_header: Option<&str>) -> Option<User> {
        let token = find_cookie(cookie_header?, SESSION_COOKIE_NAME)?;

        let claims = match self.codec.verify::<SessionSubject>(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Ignoring session cookie: {}", e);
                return None;
            }
        };

        let subject = claims.subject;
        Some(User {
            id: subject.user_id,
            email: subject.email,
            is_pro: subject.is_pro,
            created_at: subject.created_at,
        })
    }

    /// Resolve the identity from request headers
    pub fn resolve_from_headers(&self, headers: &HeaderMap) -> Option<User> {
        self.resolve_session(cookie_header(headers).as_deref())
    }

    /// Cookie that clears the session on the client
    pub fn end_session(&self) -> Cookie<'static> {
        self.cookie(String::new(), Duration::zero())
    }

    fn cookie(&self, value: String, max_age: Duration) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(max_age.num_seconds()))
            .build()
    }
}

/// Join every `Cookie` header of a request into one `k=v; k=v` list
pub fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join("; "))
    }
}

/// Find a cookie's value in a semicolon-separated `key=value` list
pub fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
