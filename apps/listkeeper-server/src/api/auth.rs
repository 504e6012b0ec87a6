// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Auth lifecycle endpoints: CSRF token, signup, login, refresh, logout.
//!
//! Every successful signup/login/refresh sets two cookies (refresh token and
//! a fresh CSRF token) and returns the access token plus the CSRF value in
//! the body. Logout clears both cookies.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderName, HeaderValue, StatusCode},
    response::AppendHeaders,
    Json,
};
use chrono::{DateTime, Utc};

use crate::auth::{
    random::random_token, Auth, AuthError, EmailAddress, IssuedTokens, NewPassword, RefreshCookie,
};
use crate::models::{
    AuthResponse, CsrfTokenResponse, LoginRequest, LogoutAllResponse, LogoutResponse, SignupRequest,
};
use crate::state::AppState;

type CookieHeaders<const N: usize> = AppendHeaders<[(HeaderName, HeaderValue); N]>;
type AuthReply = (CookieHeaders<2>, Json<AuthResponse>);

/// Cookies and body for a freshly issued pair.
fn auth_reply(state: &AppState, tokens: IssuedTokens, now: DateTime<Utc>) -> Result<AuthReply, AuthError> {
    let csrf_token = random_token()?;
    let max_age = (tokens.refresh_expires_at - now).num_seconds();

    let headers = AppendHeaders([
        (SET_COOKIE, state.cookies.refresh_cookie(&tokens.refresh_token, max_age)?),
        (SET_COOKIE, state.cookies.csrf_cookie(&csrf_token)?),
    ]);
    let body = AuthResponse {
        access_token: tokens.access_token,
        user: tokens.user,
        csrf_token,
    };
    Ok((headers, Json(body)))
}

fn cleared_cookies(state: &AppState) -> Result<CookieHeaders<2>, AuthError> {
    Ok(AppendHeaders([
        (SET_COOKIE, state.cookies.clear_refresh_cookie()?),
        (SET_COOKIE, state.cookies.clear_csrf_cookie()?),
    ]))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AuthError::InvalidInput(rejection.body_text()))
}

/// Issue a CSRF token.
///
/// Sets the CSRF cookie and returns the same value for the `x-csrf-token`
/// header of subsequent state-changing requests.
#[utoipa::path(
    get,
    path = "/api/users/csrf-token",
    tag = "Auth",
    responses(
        (status = 200, description = "CSRF cookie set", body = CsrfTokenResponse)
    )
)]
pub async fn csrf_token(
    State(state): State<AppState>,
) -> Result<(CookieHeaders<1>, Json<CsrfTokenResponse>), AuthError> {
    let csrf_token = random_token()?;
    let headers = AppendHeaders([(SET_COOKIE, state.cookies.csrf_cookie(&csrf_token)?)]);
    Ok((headers, Json(CsrfTokenResponse { csrf_token })))
}

/// Register a new user and open a session.
#[utoipa::path(
    post,
    path = "/api/users/signup",
    tag = "Auth",
    request_body = SignupRequest,
    params(("x-csrf-token" = String, Header, description = "Value of the CSRF cookie")),
    responses(
        (status = 201, description = "User created", body = AuthResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 403, description = "CSRF check failed"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, CookieHeaders<2>, Json<AuthResponse>), AuthError> {
    let request = json_body(payload)?;
    let email = EmailAddress::parse(&request.email)?;
    let password = NewPassword::parse(&request.password)?;

    let user = state.credentials.create_user(&email, &password).await?;
    let now = Utc::now();
    let tokens = state.tokens.issue_fresh(&user, now)?;

    let (headers, body) = auth_reply(&state, tokens, now)?;
    Ok((StatusCode::CREATED, headers, body))
}

/// Log in with email and password.
#[utoipa::path(
    post,
    path = "/api/users/login",
    tag = "Auth",
    request_body = LoginRequest,
    params(("x-csrf-token" = String, Header, description = "Value of the CSRF cookie")),
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "CSRF check failed")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<AuthReply, AuthError> {
    let request = json_body(payload)?;
    let user = state
        .credentials
        .authenticate(&request.email, &request.password)
        .await?;

    let now = Utc::now();
    let tokens = state.tokens.issue_fresh(&user, now)?;
    tracing::info!(user_id = %user.id, session_id = %tokens.session_id, "User logged in");

    auth_reply(&state, tokens, now)
}

/// Rotate the refresh token.
///
/// A refresh token presented again after its grace period revokes every
/// session of the user.
#[utoipa::path(
    post,
    path = "/api/users/refresh",
    tag = "Auth",
    params(("x-csrf-token" = String, Header, description = "Value of the CSRF cookie")),
    responses(
        (status = 200, description = "Tokens rotated", body = AuthResponse),
        (status = 401, description = "Invalid, expired or reused refresh token"),
        (status = 403, description = "CSRF check failed")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    RefreshCookie(credential): RefreshCookie,
) -> Result<AuthReply, AuthError> {
    let now = Utc::now();
    let tokens = state
        .rotation
        .rotate(&credential.session_id, &credential.user_id, now)?;
    auth_reply(&state, tokens, now)
}

/// Revoke the current session and clear the auth cookies.
///
/// Succeeds even without a valid refresh cookie.
#[utoipa::path(
    post,
    path = "/api/users/logout",
    tag = "Auth",
    params(("x-csrf-token" = String, Header, description = "Value of the CSRF cookie")),
    responses(
        (status = 200, description = "Logged out", body = LogoutResponse),
        (status = 403, description = "CSRF check failed")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    credential: Option<RefreshCookie>,
) -> Result<(CookieHeaders<2>, Json<LogoutResponse>), AuthError> {
    if let Some(RefreshCookie(credential)) = credential {
        state
            .rotation
            .logout(&credential.session_id, &credential.user_id, Utc::now())?;
    }

    let body = LogoutResponse {
        message: "Logout successful".to_string(),
    };
    Ok((cleared_cookies(&state)?, Json(body)))
}

/// Revoke every session of the caller.
#[utoipa::path(
    post,
    path = "/api/users/logout-all",
    tag = "Auth",
    security(("bearer_auth" = [])),
    params(("x-csrf-token" = String, Header, description = "Value of the CSRF cookie")),
    responses(
        (status = 200, description = "All sessions revoked", body = LogoutAllResponse),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "CSRF check failed")
    )
)]
pub async fn logout_all(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<(CookieHeaders<2>, Json<LogoutAllResponse>), AuthError> {
    let revoked = state.rotation.logout_all(&user.user_id, Utc::now())?;

    let body = LogoutAllResponse {
        message: "Logged out from all devices".to_string(),
        revoked,
    };
    Ok((cleared_cookies(&state)?, Json(body)))
}
