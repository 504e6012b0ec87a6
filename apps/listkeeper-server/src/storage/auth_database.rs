// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded credential and session database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized StoredUser
//! - `user_email_index`: normalized email → user_id
//! - `sessions`: session_id → serialized StoredSession
//! - `user_sessions`: composite key (user_id|session_id) → session_id
//!
//! redb admits a single write transaction at a time. Every conditional
//! update in the repositories (duplicate-email check, compare-and-revoke)
//! re-reads its row inside the write transaction, so the check and the
//! write cannot interleave with another writer.

use std::path::Path;

use redb::{Database, ReadTransaction, ReadableDatabase, TableDefinition, WriteTransaction};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary user table: user_id → serialized StoredUser (JSON bytes).
pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Unique index: normalized email → user_id.
pub(crate) const USER_EMAIL_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("user_email_index");

/// Session ledger: session_id → serialized StoredSession (JSON bytes).
pub(crate) const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Index: `user_id|session_id` → session_id, for per-user range scans.
pub(crate) const USER_SESSIONS: TableDefinition<&[u8], &str> =
    TableDefinition::new("user_sessions");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the user_sessions table.
///
/// Format: `user_id | session_id`. User ids are UUIDs and session ids are
/// base64url, so neither contains the separator or a 0xFF byte.
pub(crate) fn user_session_key(user_id: &str, session_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + 1 + session_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(session_id.as_bytes());
    key
}

/// Prefix covering every index entry of a user.
pub(crate) fn user_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(user_id.len() + 1);
    prefix.extend_from_slice(user_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Exclusive upper bound for a range scan over [`user_prefix`].
pub(crate) fn user_prefix_end(user_id: &str) -> Vec<u8> {
    let mut end = user_prefix(user_id);
    end.push(0xFF);
    end
}

// =============================================================================
// AuthDatabase
// =============================================================================

/// Embedded ACID store for users and sessions.
pub struct AuthDatabase {
    db: Database,
}

impl AuthDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_EMAIL_INDEX)?;
            let _ = write_txn.open_table(SESSIONS)?;
            let _ = write_txn.open_table(USER_SESSIONS)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Auth database opened");
        Ok(Self { db })
    }

    pub(crate) fn begin_read(&self) -> DbResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    pub(crate) fn begin_write(&self) -> DbResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Verify the database can serve reads.
    pub fn health_check(&self) -> DbResult<()> {
        let read_txn = self.begin_read()?;
        let _ = read_txn.open_table(SESSIONS)?;
        let _ = read_txn.open_table(USERS)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_directories_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("auth.redb");
        let db = AuthDatabase::open(&path).unwrap();

        assert!(path.exists());
        db.health_check().unwrap();
    }

    #[test]
    fn reopening_existing_database_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.redb");
        drop(AuthDatabase::open(&path).unwrap());

        let db = AuthDatabase::open(&path).unwrap();
        db.health_check().unwrap();
    }

    #[test]
    fn user_session_keys_stay_inside_prefix_range() {
        let key = user_session_key("user-1", "c2Vzc2lvbg");
        let start = user_prefix("user-1");
        let end = user_prefix_end("user-1");
        assert!(key.as_slice() >= start.as_slice());
        assert!(key.as_slice() < end.as_slice());

        // A user id sharing a textual prefix must not fall in the range
        let other = user_session_key("user-10", "c2Vzc2lvbg");
        assert!(!(other.as_slice() >= start.as_slice() && other.as_slice() < end.as_slice()));
    }
}
