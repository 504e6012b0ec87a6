// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use crate::auth::PasswordCost;
use crate::config::{AuthSettings, LogFormat};
use crate::state::AppState;
use crate::storage::{AuthDatabase, StoredUser, UserRepository};

/// Cheap Argon2 parameters so tests don't spend seconds hashing.
pub const TEST_PASSWORD_COST: PasswordCost = PasswordCost {
    memory_kib: 1024,
    iterations: 1,
    parallelism: 1,
};

pub fn test_settings() -> AuthSettings {
    AuthSettings {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_dir: PathBuf::from("unused"),
        production: false,
        jwt_secret: "test-access-secret-0123456789abcdef".to_string(),
        jwt_refresh_secret: "test-refresh-secret-0123456789abcdef".to_string(),
        access_ttl: Duration::minutes(15),
        refresh_ttl: Duration::days(7),
        refresh_grace: Duration::seconds(30),
        revoked_retention: Duration::days(30),
        sweep_interval: std::time::Duration::from_secs(86400),
        strict_session_check: true,
        password_cost: TEST_PASSWORD_COST,
        log_format: LogFormat::Pretty,
    }
}

/// Fresh database in a temporary directory. Keep the `TempDir` alive.
pub fn temp_db() -> (Arc<AuthDatabase>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = AuthDatabase::open(&dir.path().join("auth.redb")).unwrap();
    (Arc::new(db), dir)
}

/// A user record that is not persisted.
pub fn sample_user(email: &str) -> StoredUser {
    StoredUser {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaA".to_string(),
        created_at: Utc::now(),
    }
}

/// Persist a user with a placeholder hash.
pub fn insert_user(db: &AuthDatabase, email: &str) -> StoredUser {
    let user = sample_user(email);
    UserRepository::new(db).create(&user).unwrap();
    user
}

pub fn test_state_with(settings: AuthSettings) -> (AppState, TempDir) {
    let (db, dir) = temp_db();
    (AppState::new(db, &settings).unwrap(), dir)
}

pub fn test_state() -> (AppState, TempDir) {
    test_state_with(test_settings())
}
