// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims carried by both access and refresh tokens.
///
/// The two token kinds share this shape; they differ only in signing secret
/// and lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Normalized email at issuance
    pub email: String,
    /// Session ID the token is bound to
    pub jti: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

/// Authenticated user information extracted from an access token.
///
/// This is the primary type handlers use to represent the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    /// User ID (`sub` claim)
    pub user_id: String,
    /// Email (`email` claim)
    pub email: String,
    /// Session the access token was issued for (`jti` claim)
    pub session_id: String,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            session_id: claims.jti,
        }
    }
}

/// A verified refresh token, as read from the refresh cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCredential {
    pub user_id: String,
    pub session_id: String,
}

impl From<TokenClaims> for RefreshCredential {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.sub,
            session_id: claims.jti,
        }
    }
}
