// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuer: signs access/refresh JWT pairs and records sessions.
//!
//! Access and refresh tokens are HS256 JWTs with the same claim shape,
//! signed with two distinct secrets. A refresh token's `exp` always equals
//! its session's `expires_at`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::claims::TokenClaims;
use super::error::AuthError;
use super::random::random_token;
use crate::config::AuthSettings;
use crate::models::UserProfile;
use crate::storage::{AuthDatabase, DbError, InsertOutcome, SessionRepository, StoredSession, StoredUser};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// A freshly signed token pair.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
    pub session_id: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of [`TokenIssuer::issue_token_pair`].
#[derive(Debug)]
pub enum IssueOutcome {
    Issued(IssuedTokens),
    /// The session to supersede was no longer live; nothing was persisted.
    Superseded,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub struct TokenIssuer {
    db: Arc<AuthDatabase>,
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(db: Arc<AuthDatabase>, settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            db,
            access: SigningKeys::from_secret(settings.jwt_secret.as_bytes()),
            refresh: SigningKeys::from_secret(settings.jwt_refresh_secret.as_bytes()),
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
            validation,
        }
    }

    /// Mint a new session and its token pair.
    ///
    /// With `supersedes`, the previous session is revoked in the same
    /// transaction that records the new one. If it was already revoked,
    /// nothing is written and [`IssueOutcome::Superseded`] is returned.
    pub fn issue_token_pair(
        &self,
        user: &StoredUser,
        supersedes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IssueOutcome, AuthError> {
        let session = StoredSession::new(random_token()?, user.id.clone(), now, self.refresh_ttl);
        let tokens = self.sign_for_session(user, &session, now)?;

        match SessionRepository::new(&self.db).insert(&session, supersedes, now) {
            Ok(InsertOutcome::Inserted) => {
                tracing::debug!(
                    user_id = %user.id,
                    session_id = %session.session_id,
                    rotated_from = supersedes.unwrap_or("-"),
                    "Session issued"
                );
                Ok(IssueOutcome::Issued(tokens))
            }
            Ok(InsertOutcome::Superseded) => Ok(IssueOutcome::Superseded),
            Err(DbError::AlreadyExists(_)) => {
                Err(AuthError::Internal("session id collision".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Issue a pair for a new session (signup, login).
    pub fn issue_fresh(&self, user: &StoredUser, now: DateTime<Utc>) -> Result<IssuedTokens, AuthError> {
        match self.issue_token_pair(user, None, now)? {
            IssueOutcome::Issued(tokens) => Ok(tokens),
            IssueOutcome::Superseded => {
                Err(AuthError::Internal("fresh session reported as superseded".into()))
            }
        }
    }

    /// Sign a pair bound to an existing session without touching the ledger.
    pub fn sign_for_session(
        &self,
        user: &StoredUser,
        session: &StoredSession,
        now: DateTime<Utc>,
    ) -> Result<IssuedTokens, AuthError> {
        let access_claims = TokenClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            jti: session.session_id.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        let refresh_claims = TokenClaims {
            exp: session.expires_at.timestamp(),
            ..access_claims.clone()
        };

        Ok(IssuedTokens {
            access_token: sign(&access_claims, &self.access.encoding)?,
            refresh_token: sign(&refresh_claims, &self.refresh.encoding)?,
            user: user.profile(),
            session_id: session.session_id.clone(),
            refresh_expires_at: session.expires_at,
        })
    }

    /// Verify an access token. Any failure is [`AuthError::Unauthenticated`].
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        decode::<TokenClaims>(token, &self.access.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                AuthError::Unauthenticated
            })
    }

    /// Verify a refresh token.
    ///
    /// An expired signature means the session itself expired.
    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        decode::<TokenClaims>(token, &self.refresh.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Refresh token rejected");
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::SessionExpired,
                    _ => AuthError::InvalidSession,
                }
            })
    }
}

fn sign(claims: &TokenClaims, key: &EncodingKey) -> Result<String, AuthError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| AuthError::Internal(format!("token signing failed: {e}")))
}
