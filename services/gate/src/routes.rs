//! Gate service routes

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::HeaderMap,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    AppState,
    error::{GateError, GateResult},
    jwt::MagicLinkSubject,
    mailer::{Email, magic_link_url},
    middleware::{ClientAddr, admin_guard},
    models::{RewriteRequest, RewriteResponse},
    session::cookie_header,
    validation::{
        MSG_INVALID_EMAIL, MSG_INVALID_INPUT, normalize_email, validate_email,
        validate_rewrite_request,
    },
};

/// Newest submissions returned by the admin listing
pub const ADMIN_SUBMISSIONS_LIMIT: u32 = 50;

/// Request for a magic link
#[derive(Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

/// Query of the magic-link landing call
#[derive(Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

/// Create the router for the gate service
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/users", get(list_users))
        .route("/submissions", get(list_submissions))
        .route_layer(from_fn_with_state(state.clone(), admin_guard));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/request-magic-link", post(request_magic_link))
        .route("/api/auth/verify", get(verify))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .route("/api/rewrite", post(rewrite))
        .nest("/api/admin", admin)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "gate"
    }))
}

/// Email a sign-in link
pub async fn request_magic_link(
    State(state): State<AppState>,
    client: ClientAddr,
    body: Result<Json<MagicLinkRequest>, JsonRejection>,
) -> GateResult<Json<Value>> {
    let decision = state
        .rate_limiter
        .check_policy(&state.config.magic_link_rate, client.as_str())
        .await;
    if decision.limited {
        return Err(GateError::RateLimited);
    }

    let Json(payload) = body.map_err(|_| GateError::Validation(MSG_INVALID_EMAIL.to_string()))?;
    let email = normalize_email(&payload.email);
    validate_email(&email).map_err(GateError::Validation)?;

    let token = state
        .codec
        .issue(
            MagicLinkSubject {
                email: email.clone(),
            },
            state.config.magic_link_ttl,
        )
        .map_err(GateError::internal)?;

    let link = magic_link_url(&state.config.frontend_url, &token);
    state
        .mailer
        .send(Email::magic_link(&email, &link))
        .await
        .map_err(GateError::internal)?;

    info!("Magic link requested for {}", email);
    Ok(Json(json!({ "success": true })))
}

/// Exchange a magic-link token for a session
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
    jar: CookieJar,
) -> GateResult<(CookieJar, Json<Value>)> {
    let token = query
        .token
        .filter(|token| !token.is_empty())
        .ok_or(GateError::MissingToken)?;

    let claims = state
        .codec
        .verify::<MagicLinkSubject>(&token)
        .map_err(|_| GateError::InvalidToken)?;

    let email = normalize_email(&claims.subject.email);
    if validate_email(&email).is_err() {
        return Err(GateError::InvalidToken);
    }

    let user = state
        .users
        .upsert_by_email(&email)
        .await
        .map_err(GateError::internal)?;
    let cookie = state
        .sessions
        .start_session(&user)
        .map_err(GateError::internal)?;

    info!("User {} signed in", user.id);
    Ok((jar.add(cookie), Json(json!({ "user": user }))))
}

/// Current session identity
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> GateResult<Json<Value>> {
    let user = state
        .sessions
        .resolve_from_headers(&headers)
        .ok_or(GateError::Unauthenticated)?;

    Ok(Json(json!({ "user": user })))
}

/// Clear the session cookie
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (
        jar.add(state.sessions.end_session()),
        Json(json!({ "success": true })),
    )
}

/// The metered action
pub async fn rewrite(
    State(state): State<AppState>,
    client: ClientAddr,
    headers: HeaderMap,
    body: Result<Json<RewriteRequest>, JsonRejection>,
) -> GateResult<Json<RewriteResponse>> {
    // Throttle before looking at the body
    let checked = state.gate.rate_check(client.as_str()).await?;

    let Json(mut request) =
        body.map_err(|_| GateError::Validation(MSG_INVALID_INPUT.to_string()))?;
    validate_rewrite_request(&mut request).map_err(GateError::Validation)?;

    let cookies = cookie_header(&headers);
    let admission = checked
        .resolve_identity(cookies.as_deref(), request.user_email.as_deref())
        .check_quota()
        .await?;

    let response = state
        .rewriter
        .rewrite(&request)
        .await
        .map_err(GateError::internal)?;

    let input = json!({
        "resume": request.resume,
        "jobDescription": request.job_description,
        "template": request.template,
    });
    let output = serde_json::to_value(&response).unwrap_or(Value::Null);
    state.gate.record_usage(&admission, input, output).await;

    Ok(Json(response))
}

/// All users, newest first
pub async fn list_users(State(state): State<AppState>) -> GateResult<Json<Value>> {
    let users = state.users.list().await.map_err(GateError::internal)?;
    Ok(Json(json!({ "users": users })))
}

/// Most recent submissions
pub async fn list_submissions(State(state): State<AppState>) -> GateResult<Json<Value>> {
    let submissions = state
        .ledger
        .recent(ADMIN_SUBMISSIONS_LIMIT)
        .await
        .map_err(GateError::internal)?;
    Ok(Json(json!({ "submissions": submissions })))
}
