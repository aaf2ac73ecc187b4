//! Router tests driven through `tower::ServiceExt::oneshot`

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use ripplica_core::config::{DistillConfig, RetrievalConfig, ServerConfig};
use ripplica_core::error::{Result, RipplicaError};
use ripplica_core::llm::{ClassificationVerdict, QueryIntent};
use ripplica_core::{
    Classifier, Collaborators, Distiller, Embedder, FetchMode, PageFetcher, Pipeline,
    PipelineOptions, ProgressHub, Retriever, SearchProvider, SimilarityCache, Step, Summarizer,
};
use ripplica_server::{router, AppState};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct KeywordClassifier {
    offline: bool,
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, query: &str) -> Result<ClassificationVerdict> {
        if self.offline {
            return Err(RipplicaError::Classification("connection refused".into()));
        }
        if query.to_lowercase().starts_with("set ") {
            return Ok(ClassificationVerdict::invalid(
                0.9,
                QueryIntent::InvalidQuery,
                "Device command, not research",
            ));
        }
        Ok(ClassificationVerdict::valid(false, QueryIntent::Comparison))
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

struct LetterEmbedder {
    offline: AtomicBool,
}

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RipplicaError::Embedding("connection refused".into()));
        }
        let mut v = vec![0.0; 26];
        for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
        Ok(v)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        26
    }

    fn model_name(&self) -> &str {
        "letters"
    }
}

struct EchoSummarizer;

#[async_trait]
impl Summarizer for EchoSummarizer {
    async fn summarize(&self, texts: &[String], query: &str) -> Result<String> {
        Ok(format!("# {}\n\nBased on {} sources.", query, texts.len()))
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

struct StaticSearch;

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<String>> {
        Ok(vec![
            "https://www.energy.gov/electric-vehicles".to_string(),
            "https://en.wikipedia.org/wiki/Electric_car".to_string(),
            "https://www.energy.gov/electric-vehicles".to_string(),
        ]
        .into_iter()
        .take(max_results)
        .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

struct StaticFetcher;

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _mode: FetchMode, _timeout: Duration) -> Result<String> {
        let body: Vec<String> = (0..5)
            .map(|i| {
                format!(
                    "Finding {} at {} is that electric cars need less maintenance than gas cars",
                    i, url
                )
            })
            .collect();
        Ok(format!("<html><body><p>{}.</p></body></html>", body.join(". ")))
    }

    fn name(&self) -> &str {
        "static"
    }
}

struct TestApp {
    app: Router,
    hub: Arc<ProgressHub>,
    embedder: Arc<LetterEmbedder>,
}

fn test_app_with(classifier_offline: bool) -> TestApp {
    let embedder = Arc::new(LetterEmbedder {
        offline: AtomicBool::new(false),
    });
    let pipeline = Pipeline::new(
        Collaborators {
            classifier: Arc::new(KeywordClassifier {
                offline: classifier_offline,
            }),
            embedder: embedder.clone(),
            summarizer: Arc::new(EchoSummarizer),
            cache: Arc::new(SimilarityCache::in_memory()),
            retriever: Arc::new(Retriever::new(
                Arc::new(StaticSearch),
                Arc::new(StaticFetcher),
                RetrievalConfig::default(),
            )),
            distiller: Arc::new(Distiller::new(DistillConfig::default())),
        },
        PipelineOptions::default(),
    );
    let hub = Arc::new(ProgressHub::new(64));
    let state = AppState::new(Arc::new(pipeline), hub.clone(), &ServerConfig::default());
    TestApp {
        app: router(state),
        hub,
        embedder,
    }
}

fn test_app() -> TestApp {
    test_app_with(false)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.map(|b| b.to_string()).unwrap_or_default()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_and_root() {
    let t = test_app();

    let (status, body) = call(&t.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sessions"], 0);

    let (status, body) = call(&t.app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["endpoints"]["POST /query"].is_string());
}

#[tokio::test]
async fn test_query_then_cache_hit() {
    let t = test_app();
    let request = json!({ "query": "Compare electric vs gas cars" });

    let (status, first) = call(&t.app, Method::POST, "/query", Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["is_valid"], true);
    assert_eq!(first["from_cache"], false);
    // Duplicate search result is dropped before fetching
    assert_eq!(first["urls_found"], 2);
    assert_eq!(first["content_scraped"], 2);

    let (status, second) = call(&t.app, Method::POST, "/query", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["from_cache"], true);
    assert_eq!(second["summary"], first["summary"]);
}

#[tokio::test]
async fn test_rejected_query_is_not_an_error() {
    let t = test_app();
    let (status, body) = call(
        &t.app,
        Method::POST,
        "/query",
        Some(json!({ "query": "Set alarm for 6am" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_valid"], false);
    assert_eq!(body["summary"], "Query invalid");
    assert_eq!(body["failure"]["kind"], "rejection");
}

#[tokio::test]
async fn test_blank_query_is_bad_request() {
    let t = test_app();
    let (status, body) = call(&t.app, Method::POST, "/query", Some(json!({ "query": "   " }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn test_embedding_outage_is_service_unavailable() {
    let t = test_app();
    t.embedder.offline.store(true, Ordering::SeqCst);

    let (status, body) = call(
        &t.app,
        Method::POST,
        "/query",
        Some(json!({ "query": "Compare electric vs gas cars" })),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "collaborator_unavailable");
    assert!(body["reasoning"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_classify_endpoint() {
    let t = test_app();
    let (status, body) = call(
        &t.app,
        Method::POST,
        "/classify",
        Some(json!({ "query": "Compare electric vs gas cars" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_valid"], true);

    let offline = test_app_with(true);
    let (status, body) = call(
        &offline.app,
        Method::POST,
        "/classify",
        Some(json!({ "query": "Compare electric vs gas cars" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "collaborator_unavailable");
}

#[tokio::test]
async fn test_streamed_query_reports_progress() {
    let t = test_app();
    let mut events = t.hub.connect("session-1");

    let (status, body) = call(
        &t.app,
        Method::POST,
        "/query/stream/session-1",
        Some(json!({ "query": "Compare electric vs gas cars" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_valid"], true);

    let mut steps = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
        steps.push(event.step);
        if event.step == Step::Done {
            break;
        }
    }
    assert_eq!(steps.first(), Some(&Step::Validating));
    assert_eq!(steps.last(), Some(&Step::Done));
    assert!(steps.contains(&Step::Scraping));
}

#[tokio::test]
async fn test_stream_without_socket_still_answers() {
    let t = test_app();
    let (status, body) = call(
        &t.app,
        Method::POST,
        "/query/stream/nobody",
        Some(json!({ "query": "Compare electric vs gas cars" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_valid"], true);
    assert_eq!(t.hub.session_count(), 0);
}

#[tokio::test]
async fn test_search_and_scrape_only() {
    let t = test_app();

    let (status, body) = call(
        &t.app,
        Method::POST,
        "/search-only",
        Some(json!({ "query": "electric cars" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["urls_found"], 2);

    let (status, body) = call(
        &t.app,
        Method::POST,
        "/scrape-only",
        Some(json!({ "urls": ["https://a.example.com/page", "https://b.example.com/page"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["urls_processed"], 2);
    assert_eq!(body["successful_scrapes"], 2);
    assert_eq!(body["results"][0]["url"], "https://a.example.com/page");
}

#[tokio::test]
async fn test_cache_maintenance_endpoints() {
    let t = test_app();
    let query = "How do heat pumps work";

    let (status, added) = call(
        &t.app,
        Method::POST,
        "/cache/add",
        Some(json!({ "query": query, "summary": "Heat pumps move heat instead of making it." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["success"], true);

    let (_, stats) = call(&t.app, Method::GET, "/cache/stats", None).await;
    assert_eq!(stats["cache_count"], 1);

    let (_, check) = call(&t.app, Method::POST, "/cache/check", Some(json!({ "query": query }))).await;
    assert_eq!(check["hit"], true);
    assert_eq!(check["cached_query"], query);

    let (_, similar) = call(
        &t.app,
        Method::POST,
        "/cache/similar",
        Some(json!({ "query": query, "threshold": 0.9 })),
    )
    .await;
    assert_eq!(similar["similar_count"], 1);
    assert_eq!(similar["similar_queries"][0]["doc_id"], added["doc_id"]);

    let (status, cleared) = call(&t.app, Method::POST, "/cache/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["removed"], 1);

    let (_, stats) = call(&t.app, Method::GET, "/cache/stats", None).await;
    assert_eq!(stats["cache_count"], 0);
}

#[tokio::test]
async fn test_cache_add_rejects_blank_summary() {
    let t = test_app();
    let (status, body) = call(
        &t.app,
        Method::POST,
        "/cache/add",
        Some(json!({ "query": "How do heat pumps work", "summary": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}
