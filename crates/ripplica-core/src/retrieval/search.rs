//! Web search over the DuckDuckGo results page

use super::fetch::{FetchMode, PageFetcher};
use crate::error::{Result, RipplicaError};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Provides candidate URLs for a query
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>>;

    fn name(&self) -> &str;
}

/// Shown by the results page when nothing matched
const NO_RESULTS_MARKER: &str = "Make sure all words are spelled correctly.";

/// Provider-internal hosts
const PROVIDER_DOMAINS: &[&str] = &["duckduckgo.com", "start.duckduckgo.com", "links.duckduckgo.com"];

/// Ad and click-tracking markers
const AD_MARKERS: &[&str] = &[
    "y.js",
    "ad_domain",
    "ad_provider",
    "click_metadata",
    "bing.com/aclick",
    "doubleclick.net",
    "googleadservices.com",
    "googlesyndication.com",
];

const MIN_URL_LEN: usize = 15;
const MAX_URL_LEN: usize = 1000;

const RESULT_SELECTORS: &[&str] = &[
    "a[data-testid='result-title-a']",
    "a[data-testid='result-title']",
    ".result__title a",
    ".result a",
    "h2 a",
    ".web-result__title a",
    "a[href^='http']",
];

lazy_static! {
    static ref RESULT_LINKS: Vec<Selector> = RESULT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect();

    static ref FALLBACK_PATTERNS: Vec<Regex> = [
        r#"data-testid="result-title-a"[^>]*href="(https?://[^"]*)""#,
        r#"<a[^>]*class="[^"]*result[^"]*"[^>]*href="(https?://[^"]*)""#,
        r#"<a[^>]*data-testid="[^"]*"[^>]*href="(https?://[^"]*)""#,
        r#"href="(https?://[^"]*)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

/// Whether a link looks like an organic result rather than an ad or provider page
pub fn is_valid_search_url(url: &str) -> bool {
    if !url.starts_with("http") {
        return false;
    }
    let len = url.chars().count();
    if !(MIN_URL_LEN..=MAX_URL_LEN).contains(&len) {
        return false;
    }
    !PROVIDER_DOMAINS.iter().any(|d| url.contains(d)) && !AD_MARKERS.iter().any(|m| url.contains(m))
}

/// Keep valid URLs in first-seen order, without duplicates, up to `max`
pub fn filter_urls<I, S>(urls: I, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .map(Into::into)
        .filter(|u| is_valid_search_url(u))
        .filter(|u| seen.insert(u.clone()))
        .take(max)
        .collect()
}

/// Pull result links out of a results page.
///
/// Selector matches come first; when they fall short of `max`, a regex scan
/// of the raw markup tops the list up.
pub fn parse_result_links(html: &str, max: usize) -> Vec<String> {
    if html.contains(NO_RESULTS_MARKER) {
        return Vec::new();
    }

    let document = Html::parse_document(html);
    let selected: Vec<String> = RESULT_LINKS
        .iter()
        .flat_map(|selector| document.select(selector))
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.starts_with("http"))
        .map(|href| href.to_string())
        .collect();

    let mut urls = filter_urls(selected, max);
    if urls.len() < max {
        tracing::debug!(
            "Selectors found {} of {} results, scanning markup",
            urls.len(),
            max
        );
        let scanned = FALLBACK_PATTERNS
            .iter()
            .flat_map(|re| re.captures_iter(html))
            .filter_map(|c| c.get(1).map(|m| m.as_str().replace("&amp;", "&")));
        urls = filter_urls(urls.into_iter().chain(scanned), max);
    }
    urls
}

/// Search through the DuckDuckGo results page, rendered by a page fetcher
pub struct DuckDuckGoSearch {
    fetcher: Arc<dyn PageFetcher>,
    endpoint: String,
    timeout: Duration,
}

impl DuckDuckGoSearch {
    pub fn new(fetcher: Arc<dyn PageFetcher>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn search_url(&self, query: &str) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            &self.endpoint,
            &[("va", "j"), ("t", "hc"), ("q", query)],
        )
        .map_err(|e| RipplicaError::Config(format!("invalid search endpoint: {}", e)))?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let url = self.search_url(query)?;
        tracing::debug!("Searching: {}", url);

        let html = self
            .fetcher
            .fetch(&url, FetchMode::Full, self.timeout)
            .await
            .map_err(|e| RipplicaError::Search(e.to_string()))?;

        let urls = parse_result_links(&html, max_results);
        tracing::info!("Search for '{}' found {} URLs", query, urls.len());
        Ok(urls)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_filter() {
        assert!(is_valid_search_url("https://en.wikipedia.org/wiki/Electric_car"));
        assert!(!is_valid_search_url("https://duckduckgo.com/?q=cars"));
        assert!(!is_valid_search_url("https://links.duckduckgo.com/d.js?q=1"));
        assert!(!is_valid_search_url("https://ad.doubleclick.net/click?x=1"));
        assert!(!is_valid_search_url("https://www.bing.com/aclick?ld=abc"));
        assert!(!is_valid_search_url("https://a.io"));
        assert!(!is_valid_search_url("ftp://example.com/file.txt"));
        let long = format!("https://example.com/{}", "a".repeat(1000));
        assert!(!is_valid_search_url(&long));
    }

    #[test]
    fn test_filter_urls_dedupes_in_order() {
        let urls = filter_urls(
            [
                "https://b.example.com/page",
                "https://duckduckgo.com/y.js?ad=1",
                "https://a.example.com/page",
                "https://b.example.com/page",
                "https://c.example.com/page",
            ],
            2,
        );
        assert_eq!(urls, vec!["https://b.example.com/page", "https://a.example.com/page"]);
    }

    #[test]
    fn test_parse_result_links_prefers_selectors() {
        let html = r#"<html><body>
            <h2><a data-testid="result-title-a" href="https://www.caranddriver.com/ev-vs-gas">EV vs gas</a></h2>
            <h2><a data-testid="result-title-a" href="https://duckduckgo.com/y.js?ad_provider=x">Ad</a></h2>
            <h2><a data-testid="result-title-a" href="https://www.energy.gov/electric-vehicles">EVs</a></h2>
            <a href="/relative/link">internal</a>
        </body></html>"#;
        let urls = parse_result_links(html, 5);
        assert_eq!(
            urls,
            vec![
                "https://www.caranddriver.com/ev-vs-gas",
                "https://www.energy.gov/electric-vehicles"
            ]
        );
    }

    #[test]
    fn test_no_results_marker() {
        let html = "<html><body><p>Make sure all words are spelled correctly.</p>\
                    <a href=\"https://example.com/whatever\">x</a></body></html>";
        assert!(parse_result_links(html, 5).is_empty());
    }

    #[test]
    fn test_regex_fallback_tops_up() {
        // Script-embedded links the DOM selectors cannot see
        let html = r#"<html><body><script>
            var r = '<a class="result" href="https://example.org/one">';
            var s = '<a href="https://example.org/two">';
        </script></body></html>"#;
        let urls = parse_result_links(html, 5);
        assert_eq!(urls, vec!["https://example.org/one", "https://example.org/two"]);
    }

    #[test]
    fn test_search_url_encodes_query() {
        struct Never;
        #[async_trait]
        impl PageFetcher for Never {
            async fn fetch(&self, _: &str, _: FetchMode, _: Duration) -> Result<String> {
                Ok(String::new())
            }
            fn name(&self) -> &str {
                "never"
            }
        }
        let search = DuckDuckGoSearch::new(Arc::new(Never), "https://duckduckgo.com/", Duration::from_secs(1));
        let url = search.search_url("electric vs gas & cars").unwrap();
        assert!(url.starts_with("https://duckduckgo.com/?va=j&t=hc&q="));
        assert!(url.contains("electric+vs+gas+%26+cars"));
    }
}
