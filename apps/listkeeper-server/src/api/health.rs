// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Liveness and readiness checks.
//!
//! The only dependency of the service is its embedded database, so
//! readiness means "a read transaction on the auth tables succeeds".

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Ok,
    Degraded,
    Unavailable,
}

/// Readiness report.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// `ok` when every check passes, `degraded` otherwise
    pub status: ComponentStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub service: ComponentStatus,
    /// Auth database (users and sessions tables)
    pub database: ComponentStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: ComponentStatus,
}

fn database_status(state: &AppState) -> ComponentStatus {
    match state.db.health_check() {
        Ok(()) => ComponentStatus::Ok,
        Err(e) => {
            tracing::warn!(error = %e, "Auth database health check failed");
            ComponentStatus::Unavailable
        }
    }
}

fn ready_report(state: &AppState) -> (StatusCode, Json<ReadyResponse>) {
    let database = database_status(state);
    let (code, status) = match database {
        ComponentStatus::Ok => (StatusCode::OK, ComponentStatus::Ok),
        _ => (StatusCode::SERVICE_UNAVAILABLE, ComponentStatus::Degraded),
    };

    let report = ReadyResponse {
        status,
        checks: HealthChecks {
            service: ComponentStatus::Ok,
            database,
        },
    };
    (code, Json(report))
}

/// Full health report (same checks as readiness).
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "All checks pass", body = ReadyResponse),
        (status = 503, description = "Auth database unavailable", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    ready_report(&state)
}

/// Liveness check; never touches the database.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is running", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: ComponentStatus::Ok,
    })
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to serve auth requests", body = ReadyResponse),
        (status = 503, description = "Auth database unavailable", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    ready_report(&state)
}
