// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the auth database.
//!
//! Each repository borrows the [`AuthDatabase`](super::AuthDatabase) and
//! owns the transaction boundaries of its operations.

pub mod sessions;
pub mod users;

pub use sessions::{InsertOutcome, RevocationState, SessionRepository, StoredSession};
pub use users::{StoredUser, UserRepository};
