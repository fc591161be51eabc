//! MaskFlow API - column masking automation
//!
//! Classifies warehouse columns by name and provisions role-scoped masking
//! policies for the sensitive ones. Every generated statement goes through
//! the asynchronous execution service and is tracked until it finishes,
//! fails or times out.

mod cluster;
mod config;
mod error;
mod masking;
mod models;
mod routes;
mod state;
mod statement;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting MaskFlow...");

    let settings = Settings::load()?;
    info!(
        "Configuration loaded (poll {}ms, max wait {}s, default schema '{}')",
        settings.masking.poll_interval.as_millis(),
        settings.masking.max_wait.as_secs(),
        settings.masking.default_schema
    );

    let state = Arc::new(AppState::new(settings.masking.clone()));

    for cluster in &settings.clusters {
        if let Err(e) = state
            .clusters
            .register(&cluster.identifier, &cluster.connection_string)
            .await
        {
            warn!("Skipping cluster '{}': {}", cluster.identifier, e);
        }
    }
    if settings.clusters.is_empty() {
        warn!("No clusters configured; register one with POST /api/clusters");
    }

    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("Server listening on http://{}", addr);
    info!("API Endpoints:");
    info!("   GET    /api/clusters          - List registered clusters");
    info!("   POST   /api/clusters          - Register a cluster");
    info!("   DELETE /api/clusters/{{id}}     - Remove a cluster");
    info!("   GET    /api/masking/rules     - Sensitivity rules");
    info!("   GET    /api/masking/templates - Masking templates");
    info!("   POST   /api/masking/classify  - Classify column names");
    info!("   POST   /api/masking/scan      - Scan a schema");
    info!("   POST   /api/masking/preview   - Plan masking DDL");
    info!("   POST   /api/masking/apply     - Apply masking policies");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,maskflow=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
