// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{AccessGuard, AuthError, CookiePolicy, CredentialStore, RotationEngine, TokenIssuer};
use crate::config::AuthSettings;
use crate::storage::AuthDatabase;

/// Shared application state. Cheap to clone; every component is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<AuthDatabase>,
    pub credentials: Arc<CredentialStore>,
    pub tokens: Arc<TokenIssuer>,
    pub rotation: Arc<RotationEngine>,
    pub access_guard: Arc<AccessGuard>,
    pub cookies: CookiePolicy,
}

impl AppState {
    /// Wire every component from one settings value.
    ///
    /// Builds the credential store, which hashes once for the dummy hash.
    pub fn new(db: Arc<AuthDatabase>, settings: &AuthSettings) -> Result<Self, AuthError> {
        let credentials = Arc::new(CredentialStore::new(db.clone(), settings.password_cost)?);
        let tokens = Arc::new(TokenIssuer::new(db.clone(), settings));
        let rotation = Arc::new(RotationEngine::new(
            db.clone(),
            tokens.clone(),
            settings.refresh_grace,
        ));
        let access_guard = Arc::new(AccessGuard::new(
            db.clone(),
            tokens.clone(),
            settings.strict_session_check,
        ));
        let cookies = CookiePolicy::new(settings.production);

        Ok(Self {
            db,
            credentials,
            tokens,
            rotation,
            access_guard,
            cookies,
        })
    }
}
