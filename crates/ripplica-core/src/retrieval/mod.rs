//! Retrieval orchestrator: web search, then bounded concurrent page fetches

mod extract;
mod fetch;
mod search;

pub use extract::{clean_content, extract_readable_text, remove_duplicate_sentences, MIN_EXTRACTED_CHARS};
pub use fetch::{default_fetcher, find_chromium, ChromiumFetcher, FetchMode, HttpFetcher, PageFetcher};
pub use search::{filter_urls, is_valid_search_url, parse_result_links, DuckDuckGoSearch, SearchProvider};

use crate::config::RetrievalConfig;
use crate::error::{FailureKind, Result, RipplicaError, StepError};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Content longer than this counts as a successful scrape
pub const MIN_CONTENT_CHARS: usize = 100;

/// Outcome of fetching one candidate URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub url: String,
    pub content: String,
    pub content_length: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RetrievalResult {
    pub fn from_content(url: impl Into<String>, content: String) -> Self {
        let content_length = content.chars().count();
        Self {
            url: url.into(),
            content,
            content_length,
            success: content_length > MIN_CONTENT_CHARS,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            url: url.into(),
            content: String::new(),
            content_length: 0,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Wall-clock seconds spent in each phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalTimings {
    pub search_time: f64,
    pub scrape_time: f64,
}

/// Everything one retrieval produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Retrieval {
    pub urls: Vec<String>,
    pub results: Vec<RetrievalResult>,
    pub timings: RetrievalTimings,
}

impl Retrieval {
    pub fn successful(&self) -> impl Iterator<Item = &RetrievalResult> {
        self.results.iter().filter(|r| r.success)
    }
}

/// Runs search and fetch against injected providers
pub struct Retriever {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            search,
            fetcher,
            config,
        }
    }

    /// Search backed by `fetcher`, against the configured endpoint
    pub fn with_fetcher(fetcher: Arc<dyn PageFetcher>, config: RetrievalConfig) -> Self {
        let search = Arc::new(DuckDuckGoSearch::new(
            fetcher.clone(),
            config.search_endpoint.clone(),
            config.page_timeout(),
        ));
        Self::new(search, fetcher, config)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Candidate URLs for `query`, filtered and capped at `max_results`
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<String>, StepError> {
        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StepError::new("search", RipplicaError::Cancelled)),
            found = self.search.search(query, max_results) => found,
        };
        found
            .map(|urls| filter_urls(urls, max_results))
            .map_err(|e| StepError::new("search", e))
    }

    /// Fetch every URL with at most `min(max_concurrency, urls.len())` in
    /// flight. Results come back in input order.
    pub async fn fetch_all(&self, urls: &[String], cancel: &CancellationToken) -> Vec<RetrievalResult> {
        if urls.is_empty() {
            return Vec::new();
        }
        let limit = self.config.max_concurrency.max(1).min(urls.len());
        tracing::debug!("Fetching {} URLs, {} at a time", urls.len(), limit);

        let tasks: Vec<_> = urls
            .iter()
            .enumerate()
            .map(|(idx, url)| self.fetch_indexed(idx, url, cancel))
            .collect();
        let mut indexed: Vec<(usize, RetrievalResult)> =
            stream::iter(tasks).buffer_unordered(limit).collect().await;

        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    async fn fetch_indexed(&self, idx: usize, url: &str, cancel: &CancellationToken) -> (usize, RetrievalResult) {
        (idx, self.fetch_one(url, cancel).await)
    }

    /// Fetch one URL; failures are recorded on the result
    pub async fn fetch_one(&self, url: &str, cancel: &CancellationToken) -> RetrievalResult {
        match self.fetch_with_fallback(url, cancel).await {
            Ok(content) => {
                let result = RetrievalResult::from_content(url, content);
                tracing::debug!("Scraped {} ({} chars)", url, result.content_length);
                result
            }
            Err(e) => {
                tracing::warn!("{} ({})", e, url);
                RetrievalResult::failed(url, e)
            }
        }
    }

    async fn fetch_with_fallback(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, StepError> {
        match self.attempt(url, FetchMode::Light, cancel).await {
            Ok(text) if text.chars().count() >= self.config.min_viable_chars => return Ok(text),
            Ok(text) => tracing::debug!(
                "Light fetch of {} gave {} chars, retrying in full mode",
                url,
                text.chars().count()
            ),
            Err(RipplicaError::Cancelled) => {
                return Err(StepError::new("scrape", RipplicaError::Cancelled))
            }
            Err(e) => tracing::debug!("Light fetch of {} failed: {}, retrying in full mode", url, e),
        }

        self.attempt(url, FetchMode::Full, cancel)
            .await
            .map_err(|e| StepError::new("scrape", e))
    }

    async fn attempt(&self, url: &str, mode: FetchMode, cancel: &CancellationToken) -> Result<String> {
        let html = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RipplicaError::Cancelled),
            html = self.fetcher.fetch(url, mode, self.config.page_timeout()) => html?,
        };
        Ok(extract_readable_text(&html))
    }

    /// Search, then fetch what the search found. A failed search degrades
    /// to an empty candidate list. `on_found` sees the candidates before any
    /// fetch starts; it is skipped when the run was cancelled during search.
    pub async fn retrieve<F>(
        &self,
        query: &str,
        max_results: usize,
        cancel: &CancellationToken,
        on_found: F,
    ) -> Retrieval
    where
        F: FnOnce(&[String]) + Send,
    {
        let started = Instant::now();
        let urls = match self.search(query, max_results, cancel).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!(kind = %FailureKind::DegradedStep, "{}", e);
                Vec::new()
            }
        };
        let search_time = started.elapsed().as_secs_f64();

        if cancel.is_cancelled() {
            return Retrieval {
                urls,
                results: Vec::new(),
                timings: RetrievalTimings {
                    search_time,
                    scrape_time: 0.0,
                },
            };
        }
        on_found(&urls);

        let started = Instant::now();
        let results = self.fetch_all(&urls, cancel).await;
        let scrape_time = started.elapsed().as_secs_f64();

        Retrieval {
            urls,
            results,
            timings: RetrievalTimings {
                search_time,
                scrape_time,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn page(topic: &str) -> String {
        let sentences: Vec<String> = (0..5)
            .map(|i| {
                format!(
                    "{} fact {} explains how regenerative braking recovers kinetic energy during deceleration",
                    topic, i
                )
            })
            .collect();
        format!("<html><body><main><p>{}.</p></main></body></html>", sentences.join(". "))
    }

    #[derive(Default)]
    struct FakeFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<(String, FetchMode)>>,
        /// url -> (light markup, full markup); `None` means the attempt errors
        pages: HashMap<String, (Option<String>, Option<String>)>,
        delays: HashMap<String, u64>,
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, mode: FetchMode, _timeout: Duration) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push((url.to_string(), mode));

            let delay = self.delays.get(url).copied().unwrap_or(50);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let (light, full) = self.pages.get(url).cloned().unwrap_or((None, None));
            let markup = match mode {
                FetchMode::Light => light,
                FetchMode::Full => full,
            };
            markup.ok_or_else(|| RipplicaError::Fetch(format!("{} unreachable", url)))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct FixedSearch(Vec<String>);

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://site{}.example.com/article", i)).collect()
    }

    fn retriever(fetcher: Arc<FakeFetcher>, found: Vec<String>) -> Retriever {
        Retriever::new(Arc::new(FixedSearch(found)), fetcher, RetrievalConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let list = urls(8);
        let mut fetcher = FakeFetcher::default();
        for url in &list {
            fetcher.pages.insert(url.clone(), (Some(page("ev")), None));
        }
        let fetcher = Arc::new(fetcher);
        let retriever = retriever(fetcher.clone(), Vec::new());

        let results = retriever.fetch_all(&list, &CancellationToken::new()).await;
        assert_eq!(results.len(), 8);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_url_count() {
        let list = urls(2);
        let mut fetcher = FakeFetcher::default();
        for url in &list {
            fetcher.pages.insert(url.clone(), (Some(page("ev")), None));
        }
        let fetcher = Arc::new(fetcher);
        retriever(fetcher.clone(), Vec::new())
            .fetch_all(&list, &CancellationToken::new())
            .await;
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let list = urls(4);
        let mut fetcher = FakeFetcher::default();
        for (i, url) in list.iter().enumerate() {
            fetcher.pages.insert(url.clone(), (Some(page(&format!("topic{}", i))), None));
            // Earlier URLs finish last
            fetcher.delays.insert(url.clone(), 400 - (i as u64) * 100);
        }
        let results = retriever(Arc::new(fetcher), Vec::new())
            .fetch_all(&list, &CancellationToken::new())
            .await;
        let got: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(got, list.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(results[2].content.contains("topic2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_light_content_retries_full() {
        let url = urls(1).remove(0);
        let mut fetcher = FakeFetcher::default();
        fetcher.pages.insert(
            url.clone(),
            (Some("<html><body>Loading</body></html>".into()), Some(page("full"))),
        );
        let fetcher = Arc::new(fetcher);
        let result = retriever(fetcher.clone(), Vec::new())
            .fetch_one(&url, &CancellationToken::new())
            .await;

        assert!(result.success);
        assert!(result.content.contains("full fact 0"));
        let modes: Vec<FetchMode> = fetcher.calls.lock().unwrap().iter().map(|(_, m)| *m).collect();
        assert_eq!(modes, vec![FetchMode::Light, FetchMode::Full]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_does_not_abort_siblings() {
        let list = urls(3);
        let mut fetcher = FakeFetcher::default();
        fetcher.pages.insert(list[0].clone(), (Some(page("ok")), None));
        fetcher.pages.insert(list[1].clone(), (None, None));
        fetcher.pages.insert(list[2].clone(), (None, Some(page("retry"))));

        let results = retriever(Arc::new(fetcher), Vec::new())
            .fetch_all(&list, &CancellationToken::new())
            .await;

        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].content, "");
        assert!(results[1].error.as_deref().unwrap().contains("unreachable"));
        assert!(results[2].success);
    }

    #[test]
    fn test_success_threshold() {
        assert!(!RetrievalResult::from_content("u", "x".repeat(100)).success);
        assert!(RetrievalResult::from_content("u", "x".repeat(101)).success);
    }

    #[tokio::test]
    async fn test_search_filters_and_caps() {
        let found = vec![
            "https://duckduckgo.com/y.js?ad_domain=x".to_string(),
            "https://one.example.com/a".to_string(),
            "https://one.example.com/a".to_string(),
            "https://two.example.com/b".to_string(),
            "https://googleadservices.com/pagead".to_string(),
            "https://three.example.com/c".to_string(),
        ];
        let retriever = retriever(Arc::new(FakeFetcher::default()), found);
        let urls = retriever
            .search("ev", 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://one.example.com/a", "https://two.example.com/b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_retrieval_records_failures() {
        let list = urls(3);
        let mut fetcher = FakeFetcher::default();
        for url in &list {
            fetcher.pages.insert(url.clone(), (Some(page("ev")), Some(page("ev"))));
        }
        let fetcher = Arc::new(fetcher);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let announced = AtomicUsize::new(0);
        let retrieval = retriever(fetcher.clone(), list)
            .retrieve("ev", 5, &cancel, |_| {
                announced.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(retrieval.urls.is_empty());
        assert!(retrieval.results.is_empty());
        assert_eq!(announced.load(Ordering::SeqCst), 0);

        let results = retriever(fetcher.clone(), Vec::new())
            .fetch_all(&urls(3), &cancel)
            .await;
        assert!(results.iter().all(|r| !r.success));
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrieve_announces_candidates_then_fetches_in_order() {
        let list = urls(3);
        let mut fetcher = FakeFetcher::default();
        for url in &list {
            fetcher.pages.insert(url.clone(), (Some(page("ev")), None));
        }

        let announced = Mutex::new(Vec::new());
        let retrieval = retriever(Arc::new(fetcher), list.clone())
            .retrieve("ev", 5, &CancellationToken::new(), |found| {
                announced.lock().unwrap().extend_from_slice(found);
            })
            .await;

        assert_eq!(*announced.lock().unwrap(), list);
        assert_eq!(retrieval.urls, list);
        let fetched: Vec<&str> = retrieval.results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(fetched, list.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(retrieval.successful().count(), 3);
    }
}
