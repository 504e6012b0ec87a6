// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access guard: bearer token to authenticated user.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::claims::AuthenticatedUser;
use super::error::AuthError;
use super::tokens::TokenIssuer;
use crate::storage::{AuthDatabase, SessionRepository, UserRepository};

pub struct AccessGuard {
    db: Arc<AuthDatabase>,
    tokens: Arc<TokenIssuer>,
    /// Require at least one live session for the user on every request.
    strict: bool,
}

impl AccessGuard {
    pub fn new(db: Arc<AuthDatabase>, tokens: Arc<TokenIssuer>, strict: bool) -> Self {
        Self { db, tokens, strict }
    }

    /// Verify an access token and resolve its user.
    ///
    /// Every failure collapses to [`AuthError::Unauthenticated`].
    pub fn authorize(&self, token: &str, now: DateTime<Utc>) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.tokens.verify_access(token)?;

        if UserRepository::new(&self.db).get(&claims.sub)?.is_none() {
            tracing::debug!(user_id = %claims.sub, "Access token for unknown user");
            return Err(AuthError::Unauthenticated);
        }

        if self.strict && !SessionRepository::new(&self.db).has_live_session(&claims.sub, now)? {
            tracing::debug!(user_id = %claims.sub, "Access token without live session");
            return Err(AuthError::Unauthenticated);
        }

        Ok(AuthenticatedUser::from_claims(claims))
    }
}
