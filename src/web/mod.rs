//! HTTP interface.
//!
//! Thin handlers over the database and the ingestion pipeline: the upload
//! endpoint stages the file and dispatches an isolated ingestion job, the
//! policy endpoints are read-only queries, and the system endpoints expose
//! the CPU monitor and scheduled messages.

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::Config, database::Database, monitor::MonitorHandle};

pub mod api;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Config,
    pub monitor: MonitorHandle,
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub async fn new(
        config: Config,
        database: Database,
        monitor: MonitorHandle,
    ) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        let app = Self::create_router(AppState {
            database,
            config,
            monitor,
        });

        Ok(Self { app, addr })
    }

    /// Create the router with all routes and middleware
    pub fn create_router(state: AppState) -> Router {
        // Multipart envelope needs headroom beyond the file-size cap
        let body_limit = state.config.storage.max_upload_bytes + 64 * 1024;

        Router::new()
            .route("/", get(api::index))
            .route("/upload", post(api::upload_file))
            .route("/policy", get(api::list_policies))
            .route("/policy/search", get(api::search_policies))
            .route("/policy/aggregate", get(api::aggregate_policies))
            .route("/system/cpu", get(api::cpu_usage))
            .route("/system/schedule-message", post(api::schedule_message))
            .route("/system/scheduled-messages", get(api::list_scheduled_messages))
            .route(
                "/system/scheduled-messages/:id",
                delete(api::cancel_scheduled_message),
            )
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the web server
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, self.app).await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}
