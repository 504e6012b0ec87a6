// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state of the service lives in a single embedded redb file
//! (`$DATA_DIR/auth.redb`):
//!
//! ```text
//! users             user_id            -> StoredUser (JSON)
//! user_email_index  normalized email   -> user_id
//! sessions          session_id (jti)   -> StoredSession (JSON)
//! user_sessions     user_id|session_id -> session_id
//! ```
//!
//! Session rows are never deleted on the request path; only the
//! cleanup sweep removes them.

pub mod auth_database;
pub mod repository;

pub use auth_database::{AuthDatabase, DbError, DbResult};
pub use repository::{
    InsertOutcome, RevocationState, SessionRepository, StoredSession, StoredUser, UserRepository,
};
