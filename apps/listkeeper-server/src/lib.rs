// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Listkeeper Server - session and credential service
//!
//! Signup/login with Argon2id password hashing, short-lived access tokens,
//! rotating refresh tokens with reuse detection, and a double-submit CSRF
//! guard, backed by an embedded redb database.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Credentials, tokens, rotation, access and CSRF guards
//! - `config` - Environment configuration
//! - `storage` - Embedded user and session store (redb)
//! - `sweeper` - Background cleanup of dead sessions

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;
