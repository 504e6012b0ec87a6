// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Sweeper
//!
//! Background task that deletes dead session rows.
//!
//! ## Strategy
//!
//! Once at startup and then every `interval` (default 24 h) the sweeper
//! removes sessions that are:
//! 1. past `expires_at`, or
//! 2. revoked, with `rotated_at` older than `retention` (default 30 days).
//!
//! Revoked rows inside the retention window stay, so reuse detection keeps
//! working for them. Each sweep is one read transaction plus one write
//! transaction; no in-memory state is shared with request handlers.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`; cancellation is observed
//! between sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::storage::{AuthDatabase, DbResult, SessionRepository};

pub struct SessionSweeper {
    db: Arc<AuthDatabase>,
    interval: Duration,
    retention: chrono::Duration,
}

impl SessionSweeper {
    pub fn new(db: Arc<AuthDatabase>, interval: Duration, retention: chrono::Duration) -> Self {
        Self {
            db,
            interval,
            retention,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            retention_days = self.retention.num_days(),
            "Session sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Session sweeper shutting down");
                return;
            }

            if let Err(e) = self.sweep_once(Utc::now()) {
                warn!(error = %e, "Session sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Session sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep. Returns the number of deleted rows.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let removed = SessionRepository::new(&self.db).purge_stale(now, self.retention)?;
        if removed > 0 {
            info!(removed, "Session sweep removed stale sessions");
        }
        Ok(removed)
    }
}
