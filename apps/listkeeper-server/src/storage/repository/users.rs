// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository (credential store persistence).
//!
//! Users are keyed by an opaque UUID and indexed by their normalized email.
//! Emails must already be normalized by the caller; this layer only enforces
//! uniqueness.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use super::super::auth_database::{AuthDatabase, DbError, DbResult, USERS, USER_EMAIL_INDEX};
use crate::models::UserProfile;

/// User record as persisted in the database.
///
/// `password_hash` is a PHC-formatted Argon2id string. It is serialized only
/// into storage; API responses go through [`UserProfile`].
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredUser {
    /// Opaque unique identifier (UUID v4)
    pub id: String,
    /// Normalized (trimmed, NFKC, lowercase) email address
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl StoredUser {
    /// Public view of the user.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
        }
    }
}

impl std::fmt::Debug for StoredUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Repository for user records.
pub struct UserRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository.
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Insert a new user.
    ///
    /// Fails with [`DbError::AlreadyExists`] if the email (or id) is taken.
    /// The uniqueness check runs inside the write transaction.
    pub fn create(&self, user: &StoredUser) -> DbResult<()> {
        let json = serde_json::to_vec(user)?;

        let write_txn = self.db.begin_write()?;
        let conflict = {
            let mut emails = write_txn.open_table(USER_EMAIL_INDEX)?;
            let mut users = write_txn.open_table(USERS)?;

            let email_taken = emails.get(user.email.as_str())?.is_some();
            let id_taken = users.get(user.id.as_str())?.is_some();

            if email_taken {
                Some(format!("User with email {}", user.email))
            } else if id_taken {
                Some(format!("User {}", user.id))
            } else {
                emails.insert(user.email.as_str(), user.id.as_str())?;
                users.insert(user.id.as_str(), json.as_slice())?;
                None
            }
        };

        if let Some(what) = conflict {
            write_txn.abort()?;
            return Err(DbError::AlreadyExists(what));
        }

        write_txn.commit()?;
        Ok(())
    }

    /// Look up a user by id.
    pub fn get(&self, user_id: &str) -> DbResult<Option<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        let user = match table.get(user_id)? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(user)
    }

    /// Look up a user by normalized email.
    pub fn find_by_email(&self, email: &str) -> DbResult<Option<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_EMAIL_INDEX)?;
        let user_id = index.get(email)?.map(|v| v.value().to_string());

        match user_id {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }
}
