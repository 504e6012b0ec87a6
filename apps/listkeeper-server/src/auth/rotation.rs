// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Refresh-token rotation with reuse detection.
//!
//! ## State machine
//!
//! For a presented `(session_id, user_id)`:
//!
//! | Session state                  | Outcome                                    |
//! |--------------------------------|--------------------------------------------|
//! | missing / other user           | `InvalidSession`                           |
//! | expired                        | `SessionExpired`                           |
//! | live                           | revoke + issue successor (one transaction) |
//! | revoked, within grace          | re-sign for the live descendant            |
//! | revoked, past grace            | revoke every session of the user, `ReuseDetected` |
//!
//! A live session that loses the revoke race to a concurrent rotation is
//! re-read once and then handled as revoked-within-grace.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::error::AuthError;
use super::tokens::{IssueOutcome, IssuedTokens, TokenIssuer};
use crate::storage::{AuthDatabase, RevocationState, SessionRepository, StoredSession, StoredUser, UserRepository};

/// A live session can be superseded at most once between our read and our
/// write, so two passes always settle.
const MAX_ROTATION_ATTEMPTS: usize = 2;

pub struct RotationEngine {
    db: Arc<AuthDatabase>,
    issuer: Arc<TokenIssuer>,
    grace: Duration,
}

impl RotationEngine {
    pub fn new(db: Arc<AuthDatabase>, issuer: Arc<TokenIssuer>, grace: Duration) -> Self {
        Self { db, issuer, grace }
    }

    /// Exchange a refresh token's session for a new token pair.
    pub fn rotate(
        &self,
        session_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedTokens, AuthError> {
        let sessions = SessionRepository::new(&self.db);

        let mut session = sessions
            .find_for_user(session_id, user_id)?
            .ok_or(AuthError::InvalidSession)?;
        let user = UserRepository::new(&self.db)
            .get(user_id)?
            .ok_or(AuthError::InvalidSession)?;

        for _ in 0..MAX_ROTATION_ATTEMPTS {
            if session.is_expired(now) {
                return Err(AuthError::SessionExpired);
            }

            match session.revocation_state(now, self.grace) {
                RevocationState::Live => {
                    match self.issuer.issue_token_pair(&user, Some(session_id), now)? {
                        IssueOutcome::Issued(tokens) => {
                            tracing::info!(
                                user_id = %user.id,
                                old_session_id = %session_id,
                                new_session_id = %tokens.session_id,
                                "Refresh token rotated"
                            );
                            return Ok(tokens);
                        }
                        IssueOutcome::Superseded => {
                            tracing::debug!(
                                session_id = %session_id,
                                "Lost rotation race, re-evaluating"
                            );
                            session = sessions
                                .find_for_user(session_id, user_id)?
                                .ok_or(AuthError::InvalidSession)?;
                        }
                    }
                }
                RevocationState::RevokedFresh => return self.resume_lineage(&user, &session, now),
                RevocationState::RevokedStale => return Err(self.reuse_detected(&user, &session, now)?),
            }
        }

        Err(AuthError::Internal("rotation did not settle".into()))
    }

    /// Revoke one session of `user_id` (logout). Idempotent.
    ///
    /// A token rotated away within the grace window stands for its live
    /// descendant, so that descendant is revoked instead.
    pub fn logout(&self, session_id: &str, user_id: &str, now: DateTime<Utc>) -> Result<bool, AuthError> {
        let sessions = SessionRepository::new(&self.db);
        let Some(session) = sessions.find_for_user(session_id, user_id)? else {
            return Ok(false);
        };

        let target = match session.revocation_state(now, self.grace) {
            RevocationState::Live => Some(session),
            RevocationState::RevokedFresh => sessions
                .live_descendant(session_id, now)?
                .filter(|live| live.user_id == user_id),
            RevocationState::RevokedStale => None,
        };
        let Some(target) = target else {
            return Ok(false);
        };

        let revoked = sessions.revoke(&target.session_id, now)?;
        if revoked {
            tracing::info!(
                target: "auth.session.revoked",
                user_id = %user_id,
                session_id = %target.session_id,
                presented_session_id = %session_id,
                "Session logged out"
            );
        }
        Ok(revoked)
    }

    /// Revoke every live session of a user (logout everywhere).
    pub fn logout_all(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize, AuthError> {
        let revoked = SessionRepository::new(&self.db).revoke_all(user_id, now)?;
        tracing::info!(
            target: "auth.session.revoked",
            user_id = %user_id,
            revoked,
            "All sessions logged out"
        );
        Ok(revoked)
    }

    /// Benign retry of a just-rotated token: hand out a pair for the session
    /// that currently continues this lineage.
    fn resume_lineage(
        &self,
        user: &StoredUser,
        session: &StoredSession,
        now: DateTime<Utc>,
    ) -> Result<IssuedTokens, AuthError> {
        let descendant = SessionRepository::new(&self.db)
            .live_descendant(&session.session_id, now)?
            .filter(|live| live.user_id == user.id);

        match descendant {
            Some(live) => {
                tracing::debug!(
                    user_id = %user.id,
                    session_id = %session.session_id,
                    live_session_id = %live.session_id,
                    "Refresh retried within grace period"
                );
                self.issuer.sign_for_session(user, &live, now)
            }
            None => Err(AuthError::InvalidSession),
        }
    }

    fn reuse_detected(
        &self,
        user: &StoredUser,
        session: &StoredSession,
        now: DateTime<Utc>,
    ) -> Result<AuthError, AuthError> {
        let revoked = SessionRepository::new(&self.db).revoke_all(&user.id, now)?;
        tracing::warn!(
            target: "auth.token.reuse_detected",
            user_id = %user.id,
            session_id = %session.session_id,
            rotated_at = ?session.rotated_at,
            revoked,
            "Refresh token reused after grace period; revoked all sessions"
        );
        Ok(AuthError::ReuseDetected)
    }
}
