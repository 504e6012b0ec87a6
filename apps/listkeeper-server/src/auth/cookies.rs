// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Refresh and CSRF cookies.
//!
//! In production both cookies carry the `__Host-` prefix, which browsers
//! only accept with `Secure`, `Path=/` and no `Domain` attribute.

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};

use super::error::AuthError;

const REFRESH_COOKIE: &str = "refresh-token";
const REFRESH_COOKIE_HOST: &str = "__Host-refresh-token";
const CSRF_COOKIE: &str = "csrf-token";
const CSRF_COOKIE_HOST: &str = "__Host-csrf-token";

/// Lifetime of the CSRF cookie (24 h).
pub const CSRF_COOKIE_MAX_AGE_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Cookie naming and attributes for the current environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    production: bool,
}

impl CookiePolicy {
    pub fn new(production: bool) -> Self {
        Self { production }
    }

    pub fn refresh_cookie_name(&self) -> &'static str {
        if self.production {
            REFRESH_COOKIE_HOST
        } else {
            REFRESH_COOKIE
        }
    }

    pub fn csrf_cookie_name(&self) -> &'static str {
        if self.production {
            CSRF_COOKIE_HOST
        } else {
            CSRF_COOKIE
        }
    }

    /// `Set-Cookie` for a refresh token expiring in `max_age_secs`.
    pub fn refresh_cookie(&self, token: &str, max_age_secs: i64) -> Result<HeaderValue, AuthError> {
        self.build(
            self.refresh_cookie_name(),
            token,
            SameSite::Strict,
            max_age_secs.max(0),
        )
    }

    pub fn csrf_cookie(&self, token: &str) -> Result<HeaderValue, AuthError> {
        self.build(
            self.csrf_cookie_name(),
            token,
            self.csrf_same_site(),
            CSRF_COOKIE_MAX_AGE_SECS,
        )
    }

    pub fn clear_refresh_cookie(&self) -> Result<HeaderValue, AuthError> {
        self.build(self.refresh_cookie_name(), "", SameSite::Strict, 0)
    }

    pub fn clear_csrf_cookie(&self) -> Result<HeaderValue, AuthError> {
        self.build(self.csrf_cookie_name(), "", self.csrf_same_site(), 0)
    }

    // Cross-site frontends need the CSRF cookie sent on top-level POSTs
    fn csrf_same_site(&self) -> SameSite {
        if self.production {
            SameSite::None
        } else {
            SameSite::Lax
        }
    }

    fn build(
        &self,
        name: &str,
        value: &str,
        same_site: SameSite,
        max_age_secs: i64,
    ) -> Result<HeaderValue, AuthError> {
        let mut cookie = format!(
            "{name}={value}; Path=/; HttpOnly; SameSite={}; Max-Age={max_age_secs}",
            same_site.as_str()
        );
        if self.production {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
            .map_err(|e| AuthError::Internal(format!("invalid cookie header: {e}")))
    }
}

/// Read a cookie value from every `Cookie` header of the request.
///
/// Empty values count as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == name {
                let val = val.trim();
                if !val.is_empty() {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}
