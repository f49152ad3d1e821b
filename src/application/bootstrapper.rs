//! Application bootstrapper
//!
//! Wires the HTTP server, queue workers and the periodic task scheduler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::CONFIG;
use crate::db;
use crate::endpoints;
use crate::services::jobs::{handlers::default_worker, start_workers, QUEUES};
use crate::services::scheduler::start_scheduler;
use crate::state::AppState;

/// Options for `serve`
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    /// Run queue workers inside the server process
    pub workers: bool,
    /// Run the periodic task scheduler inside the server process
    pub scheduler: bool,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            host: CONFIG.server.host.clone(),
            port: CONFIG.server.port,
            workers: true,
            scheduler: true,
        }
    }
}

/// Bootstrap and run the application
pub async fn run(options: ServeOptions) -> anyhow::Result<()> {
    tracing::info!("Starting back office v{}", CONFIG.version);

    let state = init_state().await?;

    if options.workers {
        let queues: Vec<String> = QUEUES.iter().map(|q| q.to_string()).collect();
        let worker = Arc::new(default_worker(&state));
        start_workers(
            worker,
            &queues,
            Duration::from_millis(CONFIG.queue.poll_interval_ms),
        );
    }
    if options.scheduler {
        start_scheduler(&state);
    }

    let app = create_app(state);
    serve(app, &options.host, options.port).await
}

/// Connect to the database (running migrations) and build the shared state
pub async fn init_state() -> anyhow::Result<AppState> {
    let conn = db::connect().await?;
    tracing::info!("Database connection established");
    Ok(AppState::from_config(conn))
}

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    endpoints::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&CONFIG.server.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Start the HTTP server and stop on Ctrl+C
async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
