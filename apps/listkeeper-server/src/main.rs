// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use listkeeper_server::{
    api::router,
    config::{AuthSettings, LogFormat, DEFAULT_LOG_FILTER},
    state::AppState,
    storage::AuthDatabase,
    sweeper::SessionSweeper,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() {
    let settings = match AuthSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(settings.log_format);
    info!(?settings, "Configuration loaded");

    let db = Arc::new(
        AuthDatabase::open(&settings.database_path()).expect("Failed to open auth database"),
    );

    let shutdown = CancellationToken::new();
    let sweeper = SessionSweeper::new(
        db.clone(),
        settings.sweep_interval,
        settings.revoked_retention,
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let addr = settings.bind_address();
    let state = AppState::new(db, &settings).expect("Failed to initialize application state");
    let app = router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    info!(%addr, "Listkeeper server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        tracing::warn!(error = %e, "Session sweeper task failed");
    }
    info!("Server stopped");
}
