// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential store: user creation and password verification.
//!
//! Passwords are hashed with Argon2id into PHC strings. Hashing and
//! verification are CPU-heavy and always run on the blocking pool.
//!
//! Login does the same amount of work whether or not the email exists: an
//! unknown email is verified against a dummy hash produced with the same
//! parameters at construction time.

use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::Utc;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use super::error::AuthError;
use super::random::fill_random;
use crate::storage::{AuthDatabase, DbError, StoredUser, UserRepository};

const SALT_BYTES: usize = 16;
const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_PASSWORD_CHARS: usize = 128;

// =============================================================================
// Boundary types
// =============================================================================

/// Normalized, syntactically valid email address.
///
/// Normalization: trim, Unicode NFKC, lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let normalized = raw.trim().nfkc().collect::<String>().to_lowercase();
        if !looks_like_email(&normalized) {
            return Err(AuthError::InvalidInput("email is not valid".into()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn looks_like_email(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_EMAIL_LEN {
        return false;
    }
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// Password accepted at signup.
#[derive(Clone)]
pub struct NewPassword(String);

impl NewPassword {
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let chars = raw.chars().count();
        if chars < MIN_PASSWORD_CHARS {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }
        if chars > MAX_PASSWORD_CHARS {
            return Err(AuthError::InvalidInput(format!(
                "password must be at most {MAX_PASSWORD_CHARS} characters"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for NewPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NewPassword(<redacted>)")
    }
}

// =============================================================================
// Hashing
// =============================================================================

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordCost {
    /// ~100 ms on current server hardware.
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl PasswordCost {
    fn hasher(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| AuthError::Internal(format!("invalid Argon2 parameters: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

fn hash_with(hasher: &Argon2<'_>, password: &[u8]) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; SALT_BYTES];
    fill_random(&mut salt_bytes)?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AuthError::Internal(format!("salt encoding failed: {e}")))?;

    let hash = hasher
        .hash_password(password, &salt)
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

fn verify_with(hasher: &Argon2<'_>, password: &[u8], phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => hasher.verify_password(password, &parsed).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Stored password hash is not a valid PHC string");
            false
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::Internal(format!("password task failed: {e}")))
}

// =============================================================================
// CredentialStore
// =============================================================================

pub struct CredentialStore {
    db: Arc<AuthDatabase>,
    hasher: Argon2<'static>,
    dummy_hash: String,
}

impl CredentialStore {
    /// Build the store. Computes the dummy hash, so this takes one hash worth
    /// of CPU time.
    pub fn new(db: Arc<AuthDatabase>, cost: PasswordCost) -> Result<Self, AuthError> {
        let hasher = cost.hasher()?;

        let mut placeholder = [0u8; 32];
        fill_random(&mut placeholder)?;
        let dummy_hash = hash_with(&hasher, &placeholder)?;

        Ok(Self {
            db,
            hasher,
            dummy_hash,
        })
    }

    /// Register a new user.
    ///
    /// The cheap pre-check avoids hashing for obvious duplicates; the
    /// authoritative check is inside the insert transaction.
    pub async fn create_user(
        &self,
        email: &EmailAddress,
        password: &NewPassword,
    ) -> Result<StoredUser, AuthError> {
        if self.find_by_normalized_email(email)?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let hasher = self.hasher.clone();
        let secret = password.clone();
        let password_hash = run_blocking(move || hash_with(&hasher, secret.expose().as_bytes())).await??;

        let user = StoredUser {
            id: Uuid::new_v4().to_string(),
            email: email.as_str().to_string(),
            password_hash,
            created_at: Utc::now(),
        };

        match UserRepository::new(&self.db).create(&user) {
            Ok(()) => {
                tracing::info!(user_id = %user.id, "User registered");
                Ok(user)
            }
            Err(DbError::AlreadyExists(_)) => Err(AuthError::DuplicateEmail),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify a password against `user`, or against the dummy hash when the
    /// user is absent. Always performs one Argon2 verification.
    pub async fn verify_password(
        &self,
        user: Option<&StoredUser>,
        password: &str,
    ) -> Result<bool, AuthError> {
        let phc = match user {
            Some(u) => u.password_hash.clone(),
            None => self.dummy_hash.clone(),
        };
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        let matched = run_blocking(move || verify_with(&hasher, password.as_bytes(), &phc)).await?;
        Ok(matched && user.is_some())
    }

    /// Login: look up by email and verify the password.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<StoredUser, AuthError> {
        let user = self.find_by_email(email)?;
        let valid = self.verify_password(user.as_ref(), password).await?;

        match user {
            Some(user) if valid => Ok(user),
            _ => {
                tracing::info!(target: "auth.login.failed", "Login rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Look up by raw email. Malformed input finds nothing.
    pub fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>, AuthError> {
        match EmailAddress::parse(email) {
            Ok(normalized) => self.find_by_normalized_email(&normalized),
            Err(_) => Ok(None),
        }
    }

    fn find_by_normalized_email(&self, email: &EmailAddress) -> Result<Option<StoredUser>, AuthError> {
        Ok(UserRepository::new(&self.db).find_by_email(email.as_str())?)
    }
}
