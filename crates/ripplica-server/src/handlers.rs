//! JSON endpoint handlers
//!
//! Each handler maps one pipeline operation onto a route. Query runs hold a
//! cancellation guard, so a client that goes away mid-run releases its
//! fetches and model calls.

use crate::protocol::{
    CacheAddRequest, CacheCheckRequest, CacheClearResponse, ErrorBody, QueryRequest,
    ScrapeRequest, SearchRequest, SimilarRequest,
};
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ripplica_core::pipeline::{
    CacheAddOutcome, CacheCheckOutcome, CacheSimilarOutcome, CacheStatsOutcome,
    ScrapeOnlyOutcome, SearchOnlyOutcome,
};
use ripplica_core::{
    ClassificationVerdict, FailureKind, ProgressEmitter, QueryOutcome, RipplicaError, VERSION,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Error status plus `{error, reasoning}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, body: ErrorBody) -> Self {
        Self { status, body }
    }

    fn invalid(reasoning: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorBody::new("invalid_input", reasoning),
        )
    }
}

impl From<RipplicaError> for ApiError {
    fn from(err: RipplicaError) -> Self {
        let status = match err {
            RipplicaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, ErrorBody::from(&err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn require_query(query: &str) -> std::result::Result<&str, ApiError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ApiError::invalid("query must not be empty"));
    }
    Ok(query)
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Ripplica query API",
        "version": VERSION,
        "endpoints": {
            "POST /query": "Process a query through the complete pipeline",
            "POST /query/stream/{ws_id}": "Process a query, streaming progress to a connected socket",
            "GET /ws/status/{ws_id}": "WebSocket for progress events of one session",
            "POST /search-only": "Search for candidate URLs only",
            "POST /scrape-only": "Fetch and extract the given URLs only",
            "POST /classify": "Classify a query",
            "GET /cache/stats": "Cache statistics",
            "POST /cache/clear": "Clear the cache",
            "POST /cache/check": "Check whether a query would hit the cache",
            "POST /cache/add": "Add a query and answer to the cache",
            "POST /cache/similar": "Find similar cached queries",
            "GET /health": "Health check",
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": VERSION,
        "sessions": state.hub.session_count(),
        "llm": state.llm_metrics(),
    }))
}

async fn run_query(
    state: &AppState,
    query: &str,
    emitter: &ProgressEmitter,
) -> ApiResult<QueryOutcome> {
    let query = require_query(query)?;
    let cancel = CancellationToken::new();
    // Cancelled when this future is dropped on client disconnect
    let _guard = cancel.clone().drop_guard();

    match state.pipeline.run(query, emitter, &cancel).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            tracing::error!("Query '{}' failed: {}", query, e);
            Err(e.into())
        }
    }
}

pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<QueryOutcome> {
    run_query(&state, &req.query, &ProgressEmitter::noop()).await
}

pub async fn query_stream(
    State(state): State<AppState>,
    Path(ws_id): Path<String>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<QueryOutcome> {
    if !state.hub.is_connected(&ws_id) {
        tracing::debug!("No socket connected for session {}, events will be dropped", ws_id);
    }
    let emitter = state.hub.emitter_for(&ws_id);
    let started = std::time::Instant::now();
    let result = run_query(&state, &req.query, &emitter).await;
    tracing::info!(
        "Streaming query for session {} finished in {:.2}s",
        ws_id,
        started.elapsed().as_secs_f64()
    );
    result
}

pub async fn search_only(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchOnlyOutcome> {
    let query = require_query(&req.query)?;
    Ok(Json(state.pipeline.search_only(query, req.max_results).await))
}

pub async fn scrape_only(
    State(state): State<AppState>,
    Json(req): Json<ScrapeRequest>,
) -> ApiResult<ScrapeOnlyOutcome> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    Ok(Json(state.pipeline.scrape_only(&req.urls, &cancel).await))
}

pub async fn classify(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<ClassificationVerdict> {
    let query = require_query(&req.query)?;
    state.pipeline.classify(query).await.map(Json).map_err(|e| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorBody::kind(
                FailureKind::CollaboratorUnavailable,
                format!("Classification failed: {}", e),
            ),
        )
    })
}

pub async fn cache_stats(State(state): State<AppState>) -> ApiResult<CacheStatsOutcome> {
    Ok(Json(state.pipeline.cache_stats().await?))
}

pub async fn cache_clear(State(state): State<AppState>) -> ApiResult<CacheClearResponse> {
    let removed = state.pipeline.cache_clear().await?;
    tracing::info!("Cleared {} cache entries", removed);
    Ok(Json(CacheClearResponse {
        message: "Cache cleared successfully".to_string(),
        removed,
    }))
}

pub async fn cache_check(
    State(state): State<AppState>,
    Json(req): Json<CacheCheckRequest>,
) -> ApiResult<CacheCheckOutcome> {
    let query = require_query(&req.query)?;
    Ok(Json(state.pipeline.cache_check(query, Some(req.threshold)).await?))
}

pub async fn cache_add(
    State(state): State<AppState>,
    Json(req): Json<CacheAddRequest>,
) -> ApiResult<CacheAddOutcome> {
    Ok(Json(state.pipeline.cache_add(&req.query, &req.summary).await?))
}

pub async fn cache_similar(
    State(state): State<AppState>,
    Json(req): Json<SimilarRequest>,
) -> ApiResult<CacheSimilarOutcome> {
    let query = require_query(&req.query)?;
    Ok(Json(state.pipeline.cache_similar(query, req.threshold).await?))
}
