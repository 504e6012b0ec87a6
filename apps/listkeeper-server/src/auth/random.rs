// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Opaque random identifiers (session ids, CSRF tokens).

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};

use super::error::AuthError;

/// Entropy of every generated token, in bytes.
pub const TOKEN_BYTES: usize = 32;

/// Fill `buf` from the OS CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), AuthError> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| AuthError::Internal("system random generator failed".into()))
}

/// 32 random bytes, base64url without padding (43 characters).
pub fn random_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    fill_random(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
