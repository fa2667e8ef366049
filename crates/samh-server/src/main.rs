mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use samh_api::nim::NimSuggestionGenerator;
use samh_api::suggestions::{StaticSuggestions, SuggestionGenerator, SuggestionService};
use samh_api::{AppState, AppStateInner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "samh=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = samh_db::Database::open(&config.db_path)?;

    let generator: Arc<dyn SuggestionGenerator> = match config.nim.clone() {
        Some(nim) => {
            info!("Suggestions via {} ({})", nim.base_url, nim.model);
            Arc::new(NimSuggestionGenerator::new(nim))
        }
        None => {
            warn!("SAMH_NIM_API_KEY not set, serving fixed suggestions");
            Arc::new(StaticSuggestions)
        }
    };

    let state: AppState = Arc::new(AppStateInner {
        db,
        suggestions: SuggestionService::new(generator),
    });

    let app = samh_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr();
    info!("SAMH chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
