//! Router assembly and listener startup

use crate::handlers;
use crate::ws;
use axum::routing::{get, post};
use axum::Router;
use ripplica_core::config::ServerConfig;
use ripplica_core::{MetricsSnapshot, Pipeline, ProgressHub, Runtime, VLLMClient};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub hub: Arc<ProgressHub>,
    /// Idle time after which a progress socket is pinged
    pub keepalive: Duration,
    llm: Option<Arc<VLLMClient>>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, hub: Arc<ProgressHub>, config: &ServerConfig) -> Self {
        Self {
            pipeline,
            hub,
            keepalive: Duration::from_secs(config.keepalive_secs.max(1)),
            llm: None,
        }
    }

    pub fn from_runtime(runtime: &Runtime) -> Self {
        Self {
            llm: Some(runtime.llm.clone()),
            ..Self::new(runtime.pipeline.clone(), runtime.hub.clone(), &runtime.config.server)
        }
    }

    pub fn llm_metrics(&self) -> Option<MetricsSnapshot> {
        self.llm.as_ref().map(|llm| llm.metrics())
    }
}

/// Build the axum Router with every endpoint
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/query", post(handlers::query))
        .route("/query/stream/:ws_id", post(handlers::query_stream))
        .route("/ws/status/:ws_id", get(ws::status_socket))
        .route("/search-only", post(handlers::search_only))
        .route("/scrape-only", post(handlers::scrape_only))
        .route("/classify", post(handlers::classify))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/clear", post(handlers::cache_clear))
        .route("/cache/check", post(handlers::cache_check))
        .route("/cache/add", post(handlers::cache_add))
        .route("/cache/similar", post(handlers::cache_similar))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on `bind` until the process is stopped
pub async fn start(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
