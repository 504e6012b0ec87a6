// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session ledger: one row per issued refresh token.
//!
//! Rows are created by the token issuer, flipped to revoked by rotation,
//! logout or revoke-all, and only ever deleted by the cleanup sweep.
//!
//! ## Atomicity
//!
//! Revocation is a compare-and-revoke: the row is re-read inside the write
//! transaction and only flipped when `is_revoked` is still false. Rotation
//! performs that flip and the insert of the successor row in the same
//! transaction, so two requests racing on one refresh token cannot both
//! mint a successor.

use chrono::{DateTime, Duration, Utc};
use redb::{ReadableTable, Table};
use serde::{Deserialize, Serialize};

use super::super::auth_database::{
    user_prefix, user_prefix_end, user_session_key, AuthDatabase, DbError, DbResult, SESSIONS,
    USER_SESSIONS,
};

/// Upper bound on `replaced_by` hops followed when resolving a lineage.
const MAX_LINEAGE_HOPS: usize = 64;

/// Revocation state of a session as seen by the rotation engine.
///
/// Expiry is orthogonal and checked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationState {
    /// Not revoked
    Live,
    /// Revoked, still inside the rotation grace window
    RevokedFresh,
    /// Revoked, past the grace window
    RevokedStale,
}

/// Refresh-token session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    /// Session id (`jti`), 32 random bytes base64url-encoded
    pub session_id: String,
    /// Owning user
    pub user_id: String,
    /// When the session was issued
    pub created_at: DateTime<Utc>,
    /// Absolute expiry of the refresh token
    pub expires_at: DateTime<Utc>,
    /// Whether the session has been revoked
    pub is_revoked: bool,
    /// When the session was superseded or logged out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotated_at: Option<DateTime<Utc>>,
    /// Session that superseded this one through rotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
}

impl StoredSession {
    /// Create a fresh live session expiring `ttl` after `now`.
    pub fn new(session_id: String, user_id: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            session_id,
            user_id,
            created_at: now,
            expires_at: now + ttl,
            is_revoked: false,
            rotated_at: None,
            replaced_by: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Not revoked and expiring in the future.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }

    pub fn revocation_state(&self, now: DateTime<Utc>, grace: Duration) -> RevocationState {
        match (self.is_revoked, self.rotated_at) {
            (false, _) => RevocationState::Live,
            (true, Some(rotated_at)) if now - rotated_at <= grace => RevocationState::RevokedFresh,
            (true, _) => RevocationState::RevokedStale,
        }
    }

    /// Expired, or revoked longer ago than `retention`.
    pub fn is_purgeable(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        if self.is_expired(now) {
            return true;
        }
        self.is_revoked && self.rotated_at.unwrap_or(self.created_at) < now - retention
    }

    fn mark_revoked(&mut self, now: DateTime<Utc>, replaced_by: Option<&str>) {
        self.is_revoked = true;
        self.rotated_at = Some(now);
        self.replaced_by = replaced_by.map(str::to_string);
    }
}

/// Result of inserting a session that may supersede another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The new row was written (and the superseded row revoked).
    Inserted,
    /// The row to supersede was already revoked or gone; nothing was written.
    Superseded,
}

#[derive(Debug, PartialEq, Eq)]
enum RevokeOutcome {
    Revoked,
    AlreadyRevoked,
    Missing,
}

type SessionTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

fn read_session<T>(table: &T, session_id: &str) -> DbResult<Option<StoredSession>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let session = match table.get(session_id)? {
        Some(value) => Some(serde_json::from_slice(value.value())?),
        None => None,
    };
    Ok(session)
}

fn write_session(table: &mut SessionTable<'_>, session: &StoredSession) -> DbResult<()> {
    let json = serde_json::to_vec(session)?;
    table.insert(session.session_id.as_str(), json.as_slice())?;
    Ok(())
}

/// Flip `is_revoked` from false to true. Must run inside a write transaction.
fn compare_and_revoke(
    table: &mut SessionTable<'_>,
    session_id: &str,
    now: DateTime<Utc>,
    replaced_by: Option<&str>,
) -> DbResult<RevokeOutcome> {
    let Some(mut session) = read_session(&*table, session_id)? else {
        return Ok(RevokeOutcome::Missing);
    };
    if session.is_revoked {
        return Ok(RevokeOutcome::AlreadyRevoked);
    }
    session.mark_revoked(now, replaced_by);
    write_session(table, &session)?;
    Ok(RevokeOutcome::Revoked)
}

fn session_ids_for_user<T>(index: &T, user_id: &str) -> DbResult<Vec<String>>
where
    T: ReadableTable<&'static [u8], &'static str>,
{
    let start = user_prefix(user_id);
    let end = user_prefix_end(user_id);

    let mut ids = Vec::new();
    for entry in index.range(start.as_slice()..end.as_slice())? {
        let (_, value) = entry?;
        ids.push(value.value().to_string());
    }
    Ok(ids)
}

/// Repository for the session ledger.
pub struct SessionRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> SessionRepository<'a> {
    /// Create a new SessionRepository.
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Insert a new session, optionally superseding a previous one.
    ///
    /// With `supersedes`, the previous row is compare-and-revoked in the same
    /// transaction (`rotated_at = now`, `replaced_by = session.session_id`).
    /// If it was no longer live, nothing is written and
    /// [`InsertOutcome::Superseded`] is returned.
    pub fn insert(
        &self,
        session: &StoredSession,
        supersedes: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<InsertOutcome> {
        let write_txn = self.db.begin_write()?;
        let step = {
            let mut sessions = write_txn.open_table(SESSIONS)?;
            let mut index = write_txn.open_table(USER_SESSIONS)?;

            let duplicate = sessions.get(session.session_id.as_str())?.is_some();
            if duplicate {
                Err(DbError::AlreadyExists(format!(
                    "Session {}",
                    session.session_id
                )))
            } else {
                let lost_race = match supersedes {
                    Some(previous) => {
                        compare_and_revoke(
                            &mut sessions,
                            previous,
                            now,
                            Some(session.session_id.as_str()),
                        )? != RevokeOutcome::Revoked
                    }
                    None => false,
                };

                if lost_race {
                    Ok(InsertOutcome::Superseded)
                } else {
                    write_session(&mut sessions, session)?;
                    let key = user_session_key(&session.user_id, &session.session_id);
                    index.insert(key.as_slice(), session.session_id.as_str())?;
                    Ok(InsertOutcome::Inserted)
                }
            }
        };

        match step {
            Ok(InsertOutcome::Inserted) => {
                write_txn.commit()?;
                Ok(InsertOutcome::Inserted)
            }
            other => {
                write_txn.abort()?;
                other
            }
        }
    }

    /// Look up a session by id.
    pub fn get(&self, session_id: &str) -> DbResult<Option<StoredSession>> {
        let read_txn = self.db.begin_read()?;
        let sessions = read_txn.open_table(SESSIONS)?;
        read_session(&sessions, session_id)
    }

    /// Look up a session by id, only if it belongs to `user_id`.
    pub fn find_for_user(&self, session_id: &str, user_id: &str) -> DbResult<Option<StoredSession>> {
        Ok(self.get(session_id)?.filter(|s| s.user_id == user_id))
    }

    /// All sessions of a user, in index order.
    pub fn list_for_user(&self, user_id: &str) -> DbResult<Vec<StoredSession>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_SESSIONS)?;
        let sessions = read_txn.open_table(SESSIONS)?;

        let mut result = Vec::new();
        for session_id in session_ids_for_user(&index, user_id)? {
            if let Some(session) = read_session(&sessions, &session_id)? {
                result.push(session);
            }
        }
        Ok(result)
    }

    /// Revoke a single session (logout).
    ///
    /// Idempotent: returns `true` only for the call that flipped the row.
    pub fn revoke(&self, session_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut sessions = write_txn.open_table(SESSIONS)?;
            compare_and_revoke(&mut sessions, session_id, now, None)?
        };

        if outcome == RevokeOutcome::Revoked {
            write_txn.commit()?;
            Ok(true)
        } else {
            write_txn.abort()?;
            Ok(false)
        }
    }

    /// Revoke every live session of a user. Returns how many were revoked.
    pub fn revoke_all(&self, user_id: &str, now: DateTime<Utc>) -> DbResult<usize> {
        let write_txn = self.db.begin_write()?;
        let revoked = {
            let index = write_txn.open_table(USER_SESSIONS)?;
            let mut sessions = write_txn.open_table(SESSIONS)?;

            let mut count = 0;
            for session_id in session_ids_for_user(&index, user_id)? {
                let Some(mut session) = read_session(&sessions, &session_id)? else {
                    continue;
                };
                if session.is_live(now) {
                    session.mark_revoked(now, None);
                    write_session(&mut sessions, &session)?;
                    count += 1;
                }
            }
            count
        };
        write_txn.commit()?;
        Ok(revoked)
    }

    /// Whether the user holds at least one live session.
    pub fn has_live_session(&self, user_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_SESSIONS)?;
        let sessions = read_txn.open_table(SESSIONS)?;

        for session_id in session_ids_for_user(&index, user_id)? {
            if let Some(session) = read_session(&sessions, &session_id)? {
                if session.is_live(now) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Follow `replaced_by` links from `session_id` to the first live session.
    ///
    /// Returns `None` when the lineage ends in a revoked (without successor),
    /// expired or purged row.
    pub fn live_descendant(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<StoredSession>> {
        let read_txn = self.db.begin_read()?;
        let sessions = read_txn.open_table(SESSIONS)?;

        let mut current = read_session(&sessions, session_id)?;
        for _ in 0..MAX_LINEAGE_HOPS {
            let Some(session) = current else {
                return Ok(None);
            };
            if session.is_live(now) {
                return Ok(Some(session));
            }
            match session.replaced_by.as_deref() {
                Some(next) => current = read_session(&sessions, next)?,
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Delete sessions that are expired or were revoked before
    /// `now - retention`. Returns how many rows were removed.
    ///
    /// Candidates are collected in a read transaction; the write transaction
    /// re-checks each row and only deletes.
    pub fn purge_stale(&self, now: DateTime<Utc>, retention: Duration) -> DbResult<usize> {
        let candidates = {
            let read_txn = self.db.begin_read()?;
            let sessions = read_txn.open_table(SESSIONS)?;

            let mut candidates = Vec::new();
            for entry in sessions.iter()? {
                let (key, value) = entry?;
                match serde_json::from_slice::<StoredSession>(value.value()) {
                    Ok(session) if session.is_purgeable(now, retention) => {
                        candidates.push((session.session_id, session.user_id));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(
                            session_id = %key.value(),
                            error = %e,
                            "Skipping malformed session row"
                        );
                    }
                }
            }
            candidates
        };

        if candidates.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut sessions = write_txn.open_table(SESSIONS)?;
            let mut index = write_txn.open_table(USER_SESSIONS)?;

            let mut removed = 0;
            for (session_id, user_id) in &candidates {
                let still_stale = read_session(&sessions, session_id)?
                    .is_some_and(|s| s.is_purgeable(now, retention));
                if !still_stale {
                    continue;
                }
                sessions.remove(session_id.as_str())?;
                let key = user_session_key(user_id, session_id);
                index.remove(key.as_slice())?;
                removed += 1;
            }
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
