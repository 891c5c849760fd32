//! Extraction strategies and dispatch
//!
//! Every strategy implements one contract: [`Strategy::execute`] takes the
//! job's [`StrategyContext`] and returns an [`Outcome`]:
//!
//! | Outcome | Meaning |
//! |---|---|
//! | `Done(payload)` | terminal result |
//! | `Failed(error)` | terminal or retryable error |
//! | `Continue(continuation)` | iterative strategies request another pass |
//!
//! Single-shot strategies (static, browser, api, document, ocr) always return
//! `Done` or `Failed`. The crawler and streaming monitor keep their state in
//! [`Progress`] and return `Continue` until the worker sees a stop condition.
//! Auth wraps another strategy with a credential pre-step.
//!
//! `auto` is not a strategy: the [`Dispatcher`] resolves it to a concrete kind
//! with a lightweight probe before the job runs.

pub mod api;
pub mod auth;
pub mod browser;
pub mod context;
pub mod crawler;
pub mod document;
pub mod extract;
pub mod ocr;
pub mod static_page;
pub mod streaming;
pub mod transport;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{StrategyConfig, StrategyKind};
use crate::notifications::channels::webhook::WebhookChannel;
use crate::utils::error::StrategyError;

pub use context::{JobRuntime, Services, StrategyContext};
pub use transport::{FetchRequest, FetchedPage, HttpTransport, Session, Transport};

use browser::{FetchRenderer, PageRenderer};
use document::{BasicDocumentParser, DocumentParser};
use ocr::{OcrEngine, UnconfiguredOcr};

// ============================================================================
// Contract
// ============================================================================

/// Result of one `execute` call
#[derive(Debug)]
pub enum Outcome {
    Done(Value),
    Failed(StrategyError),
    Continue(Continuation),
}

impl From<Result<Value, StrategyError>> for Outcome {
    fn from(result: Result<Value, StrategyError>) -> Self {
        match result {
            Ok(value) => Self::Done(value),
            Err(e) => Self::Failed(e),
        }
    }
}

/// Request for another iteration
#[derive(Debug, Clone)]
pub struct Continuation {
    /// Earliest instant the next iteration should start
    pub resume_at: Option<Instant>,
    /// Progress snapshot published to the event sink
    pub progress: Value,
}

impl Continuation {
    pub fn now(progress: Value) -> Self {
        Self {
            resume_at: None,
            progress,
        }
    }
}

/// An extraction strategy
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn execute(&self, ctx: &mut StrategyContext) -> Outcome;
}

/// Collapse per-URL records into one payload
pub(crate) fn merge_records(mut records: Vec<Value>) -> Value {
    if records.len() == 1 {
        records.remove(0)
    } else {
        Value::Array(records)
    }
}

// ============================================================================
// Iteration state
// ============================================================================

/// Why an iterative job stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    FrontierExhausted,
    PageCapReached,
    DurationElapsed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrontierExhausted => "frontier_exhausted",
            Self::PageCapReached => "page_cap_reached",
            Self::DurationElapsed => "duration_elapsed",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Iteration state owned by one job
#[derive(Debug, Default)]
pub enum Progress {
    #[default]
    Idle,
    Crawl(Box<crawler::CrawlState>),
    Stream(Box<streaming::StreamState>),
}

impl Progress {
    /// Stop condition reached, if any
    pub fn stop_reason(&self, now: Instant) -> Option<StopReason> {
        match self {
            Self::Idle => None,
            Self::Crawl(state) => state.stop_reason(),
            Self::Stream(state) => state.stop_reason(now),
        }
    }

    /// Overall deadline of a duration-bounded job
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Stream(state) => Some(state.deadline()),
            Self::Idle | Self::Crawl(_) => None,
        }
    }

    /// Final payload once a stop condition is reached
    pub fn finish(self, reason: StopReason) -> Result<Value, StrategyError> {
        match self {
            Self::Idle => Ok(Value::Null),
            Self::Crawl(state) => state.finish(reason),
            Self::Stream(state) => Ok(state.finish(reason)),
        }
    }

    pub fn summary(&self) -> Value {
        match self {
            Self::Idle => Value::Null,
            Self::Crawl(state) => state.summary(),
            Self::Stream(state) => state.summary(),
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Builds strategies for jobs and resolves `auto`
#[derive(Clone)]
pub struct Dispatcher {
    renderer: Arc<dyn PageRenderer>,
    documents: Arc<dyn DocumentParser>,
    ocr: Arc<dyn OcrEngine>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            renderer: Arc::new(FetchRenderer),
            documents: Arc::new(BasicDocumentParser),
            ocr: Arc::new(UnconfiguredOcr),
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a real rendering backend for the browser strategy
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_document_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.documents = parser;
        self
    }

    pub fn with_ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = engine;
        self
    }

    /// Build the strategy for a concrete configuration
    pub fn build(&self, config: &StrategyConfig) -> Result<Box<dyn Strategy>, StrategyError> {
        let strategy: Box<dyn Strategy> = match config {
            StrategyConfig::Auto => {
                return Err(StrategyError::Unsupported(String::from(
                    "auto must be resolved before dispatch",
                )))
            }
            StrategyConfig::Static => Box::new(static_page::StaticStrategy),
            StrategyConfig::Browser(browser) => Box::new(browser::BrowserStrategy::new(
                browser.clone(),
                Arc::clone(&self.renderer),
            )),
            StrategyConfig::Api(api) => Box::new(api::ApiStrategy::new(api.clone())),
            StrategyConfig::Crawler(crawl) => Box::new(crawler::CrawlerStrategy::new(crawl.clone())),
            StrategyConfig::Document => {
                Box::new(document::DocumentStrategy::new(Arc::clone(&self.documents)))
            }
            StrategyConfig::Ocr(ocr) => {
                Box::new(ocr::OcrStrategy::new(ocr.clone(), Arc::clone(&self.ocr)))
            }
            StrategyConfig::Streaming(stream) => {
                let webhook = match &stream.webhook_url {
                    Some(url) => Some(Arc::new(WebhookChannel::from_url(url.clone()).map_err(
                        |e| StrategyError::Unsupported(format!("webhook unavailable: {e}")),
                    )?)),
                    None => None,
                };
                Box::new(streaming::StreamingStrategy::new(stream.clone(), webhook))
            }
            StrategyConfig::Auth(auth) => {
                let inner = self.build(&auth.inner)?;
                Box::new(auth::AuthStrategy::new(auth.method.clone(), inner))
            }
        };
        Ok(strategy)
    }

    /// Resolve `auto` by probing the first target
    ///
    /// Probe failures fall back to `static`; only cancellation is an error.
    pub async fn resolve_auto(&self, ctx: &mut StrategyContext) -> Result<StrategyKind, StrategyError> {
        let Some(url) = ctx.primary_url().map(str::to_string) else {
            return Ok(StrategyKind::Static);
        };

        match ctx.get(&url).await {
            Ok(page) => Ok(classify(&page)),
            Err(crate::utils::error::FetchError::Cancelled) => {
                Err(crate::utils::error::FetchError::Cancelled.into())
            }
            Err(e) => {
                tracing::info!(
                    job_id = %ctx.job_id,
                    url = %url,
                    error = %e,
                    "Probe failed, defaulting to static"
                );
                Ok(StrategyKind::Static)
            }
        }
    }
}

/// Probe a URL directly and classify it
pub async fn probe(transport: &dyn Transport, url: &str, timeout: Duration) -> StrategyKind {
    let request = FetchRequest::get(url, timeout);
    match transport.fetch(&request, None, &Session::default()).await {
        Ok(page) if page.error_for_status().is_ok() => classify(&page),
        Ok(page) => {
            tracing::info!(url = %url, status = page.status, "Probe returned error status, defaulting to static");
            StrategyKind::Static
        }
        Err(e) => {
            tracing::info!(url = %url, error = %e, "Probe failed, defaulting to static");
            StrategyKind::Static
        }
    }
}

/// Classify a probed page
///
/// JSON endpoint → `api`; heavy script markers or empty markup → `browser`;
/// anything else → `static`.
pub fn classify(page: &FetchedPage) -> StrategyKind {
    if page.is_json() {
        return StrategyKind::Api;
    }

    let trimmed = page.text.trim_start();
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(&page.text).is_ok()
    {
        return StrategyKind::Api;
    }

    if extract::markup_signals(&page.text).needs_browser() {
        StrategyKind::Browser
    } else {
        StrategyKind::Static
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn page(content_type: Option<&str>, body: &'static str) -> FetchedPage {
        FetchedPage::new("https://example.com/", 200, content_type, Bytes::from_static(body.as_bytes()))
    }

    #[test]
    fn test_classify_json_content_type() {
        assert_eq!(classify(&page(Some("application/json"), r#"{"a":1}"#)), StrategyKind::Api);
    }

    #[test]
    fn test_classify_json_body_without_header() {
        assert_eq!(classify(&page(Some("text/plain"), r#"[1, 2, 3]"#)), StrategyKind::Api);
    }

    #[test]
    fn test_classify_app_shell() {
        let shell = r#"<html><body><div id="root"></div><script src="/main.js"></script></body></html>"#;
        assert_eq!(classify(&page(Some("text/html"), shell)), StrategyKind::Browser);
        assert_eq!(classify(&page(Some("text/html"), "")), StrategyKind::Browser);
    }

    #[test]
    fn test_classify_static_markup() {
        let html = r#"<html><head><title>Docs</title></head><body>
            <h1>Manual</h1><p>Plenty of server-rendered prose lives here.</p></body></html>"#;
        assert_eq!(classify(&page(Some("text/html"), html)), StrategyKind::Static);
    }

    #[test]
    fn test_build_rejects_auto() {
        assert!(Dispatcher::default().build(&StrategyConfig::Auto).is_err());
    }

    #[test]
    fn test_build_every_concrete_kind() {
        let dispatcher = Dispatcher::default();
        for kind in [
            StrategyKind::Static,
            StrategyKind::Browser,
            StrategyKind::Api,
            StrategyKind::Crawler,
            StrategyKind::Document,
            StrategyKind::Ocr,
            StrategyKind::Streaming,
        ] {
            let strategy = dispatcher.build(&StrategyConfig::default_for(kind)).unwrap();
            assert_eq!(strategy.kind(), kind);
        }
    }

    #[test]
    fn test_merge_records() {
        assert_eq!(merge_records(vec![Value::from(1)]), Value::from(1));
        assert_eq!(
            merge_records(vec![Value::from(1), Value::from(2)]),
            serde_json::json!([1, 2])
        );
    }
}
