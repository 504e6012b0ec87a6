// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for access and refresh tokens.
//!
//! Use the `Auth` extractor in handlers to require a bearer access token:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```
//!
//! `RefreshCookie` reads and verifies the refresh cookie. Wrap it in
//! `Option` where a missing or invalid cookie is not an error (logout).

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;

use super::claims::{AuthenticatedUser, RefreshCredential};
use super::cookies::read_cookie;
use super::error::AuthError;
use crate::state::AppState;

/// Extractor for authenticated users (bearer access token).
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthenticated)?;

        let user = state.access_guard.authorize(token, Utc::now())?;
        Ok(Auth(user))
    }
}

/// Extractor for the verified refresh cookie.
pub struct RefreshCookie(pub RefreshCredential);

impl FromRequestParts<AppState> for RefreshCookie {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = read_cookie(&parts.headers, state.cookies.refresh_cookie_name())
            .ok_or(AuthError::InvalidSession)?;
        let claims = state.tokens.verify_refresh(&token)?;
        Ok(RefreshCookie(claims.into()))
    }
}

impl OptionalFromRequestParts<AppState> for RefreshCookie {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(<Self as FromRequestParts<AppState>>::from_request_parts(parts, state)
            .await
            .ok())
    }
}
