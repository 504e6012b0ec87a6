// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::DbError;

/// Authentication error type.
///
/// Every variant is terminal for the request. Credential and token failures
/// are deliberately uninformative: the message never says whether the email
/// exists, which check failed, or why a token was rejected.
#[derive(Debug)]
pub enum AuthError {
    /// Signup with an email that is already registered
    DuplicateEmail,
    /// Unknown email or wrong password
    InvalidCredentials,
    /// Refresh token does not map to a usable session
    InvalidSession,
    /// Refresh token's session has expired
    SessionExpired,
    /// A rotated refresh token was presented after the grace period
    ReuseDetected,
    /// Missing or invalid access token, or no live session
    Unauthenticated,
    /// CSRF cookie/header missing or mismatched
    CsrfRejected,
    /// Request payload failed boundary validation
    InvalidInput(String),
    /// Internal error; the detail is logged, never returned
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::DuplicateEmail => "duplicate_email",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidSession => "invalid_session",
            AuthError::SessionExpired => "session_expired",
            AuthError::ReuseDetected => "reuse_detected",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::CsrfRejected => "csrf_rejected",
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::InvalidSession
            | AuthError::SessionExpired
            | AuthError::ReuseDetected
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::CsrfRejected => StatusCode::FORBIDDEN,
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::DuplicateEmail => write!(f, "Email is already registered"),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::InvalidSession => write!(f, "Invalid session"),
            AuthError::SessionExpired => write!(f, "Session has expired"),
            AuthError::ReuseDetected => {
                write!(f, "Refresh token reuse detected; all sessions have been revoked")
            }
            AuthError::Unauthenticated => write!(f, "Authentication required"),
            AuthError::CsrfRejected => write!(f, "CSRF token missing or invalid"),
            AuthError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            AuthError::Internal(_) => write!(f, "Internal server error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<DbError> for AuthError {
    fn from(e: DbError) -> Self {
        AuthError::Internal(format!("storage: {e}"))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Internal authentication error");
        }
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
