//! SchemaLens - see what changed in your database at a glance
//!
//! Loads a schema snapshot (by introspecting PostgreSQL or from a pushed
//! payload), diffs it against the previous load, lays the tables out as a
//! layered diagram and keeps changed tables and columns highlighted for a
//! short window.

mod config;
mod coordinator;
mod ddl;
mod diagram;
mod error;
mod graph;
mod highlight;
mod routes;
mod snapshot;
mod source;
mod state;

use crate::config::Settings;
use crate::routes::create_router;
use crate::source::PostgresSource;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting SchemaLens...");

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "📋 Configuration loaded (highlight window: {}ms)",
        settings.highlight.duration.as_millis()
    );

    // The database is optional: without it snapshots can only be pushed
    let source = match &settings.database {
        Some(database) => match PostgresSource::connect(database).await {
            Ok(source) => Some(source),
            Err(e) => {
                warn!("⚠️  Could not connect to database, running push-only: {}", e);
                None
            }
        },
        None => {
            warn!("⚠️  DATABASE_URL not set, running push-only");
            None
        }
    };

    let state = Arc::new(AppState::new(&settings, source));

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   POST /api/schemas/{{schema}}/refresh    - Introspect and apply a schema");
    info!("   POST /api/schemas/{{schema}}/statements - Report an executed statement");
    info!("   POST /api/snapshots                   - Apply a pushed snapshot");
    info!("   GET  /api/diagram                     - Positioned diagram");
    info!("   GET  /api/changes                     - Last diff and open highlights");
    info!("   GET  /api/snapshot                    - Current snapshot metadata");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemalens=debug,tower_http=debug"));

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

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
