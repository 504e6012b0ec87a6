// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the auth API. All types derive
//! `ToSchema` for the OpenAPI document and use camelCase on the wire.
//!
//! Request bodies carry raw strings; handlers validate them into
//! [`EmailAddress`](crate::auth::EmailAddress) /
//! [`NewPassword`](crate::auth::NewPassword) before anything else sees them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Requests
// =============================================================================

/// Signup payload.
#[derive(Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[schema(example = "alice@x.com")]
    pub email: String,
    /// 6 to 128 characters
    #[schema(example = "secret1")]
    pub password: String,
}

/// Login payload.
#[derive(Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[schema(example = "alice@x.com")]
    pub email: String,
    #[schema(example = "secret1")]
    pub password: String,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
}

/// Body returned by signup, login and refresh.
///
/// The refresh token itself only travels in the http-only cookie.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserProfile,
    /// Value to echo in the `x-csrf-token` header
    pub csrf_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    #[schema(example = "Logout successful")]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutAllResponse {
    pub message: String,
    /// Number of sessions revoked by this call
    pub revoked: usize,
}
