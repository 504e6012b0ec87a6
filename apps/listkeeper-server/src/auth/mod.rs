// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Credential and session lifecycle for the API.
//!
//! ## Auth Flow
//!
//! 1. Signup/login verifies credentials and mints a session:
//!    - short-lived access token (returned in the JSON body)
//!    - long-lived refresh token (http-only cookie), bound to the session id
//! 2. API calls send `Authorization: Bearer <access token>`; the `Auth`
//!    extractor verifies it and, in strict mode, that the user still holds
//!    a live session
//! 3. `POST /refresh` rotates the refresh token; a rotated token presented
//!    again after the grace period revokes every session of the user
//!
//! ## Security
//!
//! - Access and refresh tokens are signed with different secrets
//! - State-changing auth routes require the double-submit CSRF token
//! - Passwords are Argon2id; login does the same work for unknown emails
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod cookies;
pub mod credentials;
pub mod csrf;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod random;
pub mod rotation;
pub mod tokens;

pub use claims::{AuthenticatedUser, RefreshCredential, TokenClaims};
pub use cookies::CookiePolicy;
pub use credentials::{CredentialStore, EmailAddress, NewPassword, PasswordCost};
pub use error::AuthError;
pub use extractor::{Auth, RefreshCookie};
pub use guard::AccessGuard;
pub use rotation::RotationEngine;
pub use tokens::{IssueOutcome, IssuedTokens, TokenIssuer};
