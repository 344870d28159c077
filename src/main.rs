//! Request Desk API - request tracker backed by a JSON file
//!
//! Keeps a list of pending requests: pick one at random, mark it done, edit or
//! delete entries, link them to clubs (map points), and bulk-import rows from
//! Excel workbooks. All state lives in a single JSON document on disk, read
//! through a cache keyed on the file's modification time.

mod config;
mod error;
mod import;
mod models;
mod routes;
mod state;
mod store;
mod tracker;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use crate::store::DataStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first: the environment picks the default log level
    let settings = Settings::load()?;
    init_tracing(settings.environment.default_log_filter());

    info!("🚀 Starting Request Desk ({:?})...", settings.environment);

    let store = DataStore::new(&settings.storage.data_file);
    match store.read().await {
        Ok(data) => info!(
            "📋 Loaded {} requests and {} clubs from {}",
            data.requests.len(),
            data.map_points.len(),
            store.path().display()
        ),
        Err(e) => warn!("⚠️  Data file is not readable yet: {}", e),
    }

    let state = Arc::new(AppState::new(store));
    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   GET    /health                      - Health check");
    info!("   GET    /api/requests?search=        - List requests");
    info!("   POST   /api/requests                - Add a request");
    info!("   DELETE /api/requests                - Delete all requests");
    info!("   GET    /api/requests/random         - Pick a random request");
    info!("   PUT    /api/requests/:id            - Edit a request");
    info!("   DELETE /api/requests/:id            - Delete a request");
    info!("   POST   /api/requests/:id/complete   - Mark a request done");
    info!("   GET    /api/clubs                   - List clubs");
    info!("   POST   /api/clubs                   - Add a club");
    info!("   PUT    /api/clubs/:id               - Edit a club");
    info!("   DELETE /api/clubs/:id               - Delete a club");
    info!("   GET    /api/data                    - Get all data");
    info!("   POST   /api/data                    - Replace all data");
    info!("   POST   /api/import                  - Merge requests and clubs");
    info!("   POST   /api/import/spreadsheet      - Import an Excel workbook");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

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
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
