//! Page fetching: headless Chromium when available, plain HTTP otherwise

use crate::config::RetrievalConfig;
use crate::error::{Result, RipplicaError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetScriptExecutionDisabledParams;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How much of a browser a fetch attempt gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Scripting disabled, short settle delay
    Light,
    /// Scripting enabled, longer settle delay
    Full,
}

/// Retrieves raw page markup
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, mode: FetchMode, timeout: Duration) -> Result<String>;

    fn name(&self) -> &str;
}

/// Find the Chromium binary path.
pub fn find_chromium(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        tracing::warn!("Configured Chromium path {} does not exist", path.display());
    }

    for candidate in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(candidate) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Fetcher driving one shared headless Chromium instance
pub struct ChromiumFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
    light_settle: Duration,
    full_settle: Duration,
    active_pages: Arc<AtomicUsize>,
}

impl ChromiumFetcher {
    /// Launch a headless browser
    pub async fn launch(config: &RetrievalConfig) -> Result<Self> {
        let chrome_path = find_chromium(config.chromium_path.as_deref())
            .ok_or_else(|| RipplicaError::Browser("Chromium not found".to_string()))?;

        let browser_config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--window-size=1920,1080")
            .arg(format!("--user-agent={}", config.user_agent))
            .build()
            .map_err(|e| RipplicaError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RipplicaError::Browser(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        tracing::info!("Launched headless Chromium");
        Ok(Self {
            browser,
            handler,
            light_settle: Duration::from_millis(config.light_settle_ms),
            full_settle: Duration::from_millis(config.full_settle_ms),
            active_pages: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn active_pages(&self) -> usize {
        self.active_pages.load(Ordering::Relaxed)
    }

    async fn render(&self, page: &Page, url: &str, mode: FetchMode) -> Result<String> {
        if mode == FetchMode::Light {
            page.execute(SetScriptExecutionDisabledParams::new(true))
                .await
                .map_err(|e| RipplicaError::Browser(format!("failed to disable scripts: {e}")))?;
        }

        page.goto(url)
            .await
            .map_err(|e| RipplicaError::Fetch(format!("navigation to {} failed: {}", url, e)))?;

        let settle = match mode {
            FetchMode::Light => self.light_settle,
            FetchMode::Full => self.full_settle,
        };
        tokio::time::sleep(settle).await;

        page.content()
            .await
            .map_err(|e| RipplicaError::Browser(format!("failed to read page HTML: {e}")))
    }
}

/// Counts a tab toward `active_pages` until dropped
struct PageSlot(Arc<AtomicUsize>);

impl PageSlot {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for PageSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Open tab. Closed however the fetch ends, including when the fetch
/// future is dropped mid-render.
struct OpenTab {
    page: Page,
    closed: bool,
    _slot: PageSlot,
}

impl OpenTab {
    async fn close(mut self) {
        self.closed = true;
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("Failed to close tab: {}", e);
        }
    }
}

impl Drop for OpenTab {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let page = self.page.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::debug!("Failed to close abandoned tab: {}", e);
                }
            });
        }
    }
}

impl Drop for ChromiumFetcher {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl PageFetcher for ChromiumFetcher {
    async fn fetch(&self, url: &str, mode: FetchMode, timeout: Duration) -> Result<String> {
        let attempt = async {
            let page = self
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| RipplicaError::Browser(format!("failed to create page: {e}")))?;
            let tab = OpenTab {
                page,
                closed: false,
                _slot: PageSlot::acquire(&self.active_pages),
            };
            let html = self.render(&tab.page, url, mode).await;
            tab.close().await;
            html
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(html) => html,
            Err(_) => Err(RipplicaError::Timeout(timeout.as_millis() as u64)),
        }
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

/// Plain HTTP fetcher; both modes behave the same since nothing executes scripts
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, _mode: FetchMode, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RipplicaError::Timeout(timeout.as_millis() as u64)
                } else if e.is_connect() {
                    RipplicaError::Fetch(format!("cannot reach {}: {}", url, e))
                } else {
                    RipplicaError::Fetch(format!("failed to fetch {}: {}", url, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = match status {
                StatusCode::NOT_FOUND => "not found".to_string(),
                StatusCode::FORBIDDEN => "access forbidden".to_string(),
                StatusCode::TOO_MANY_REQUESTS => "rate limited".to_string(),
                s => s.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(RipplicaError::Fetch(format!(
                "HTTP {} ({}) from {}",
                status.as_u16(),
                reason,
                url
            )));
        }

        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !content_type.contains("html") && !content_type.starts_with("text/") {
                return Err(RipplicaError::Fetch(format!(
                    "unsupported content type '{}' from {}",
                    content_type, url
                )));
            }
        }

        response
            .text()
            .await
            .map_err(|e| RipplicaError::Fetch(format!("failed to read body from {}: {}", url, e)))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Chromium when it can be launched, plain HTTP otherwise
pub async fn default_fetcher(config: &RetrievalConfig) -> Arc<dyn PageFetcher> {
    match ChromiumFetcher::launch(config).await {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            tracing::warn!("{}; falling back to plain HTTP fetching", e);
            Arc::new(HttpFetcher::new(&config.user_agent))
        }
    }
}
