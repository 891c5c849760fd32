//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use siphon::config::Config;
use siphon::models::{Job, JobId};
use siphon::notifications::RecordingSink;
use siphon::proxy::ProxyPool;
use siphon::scheduler::Engine;
use siphon::storage::{CredentialStore, MemoryJobStore, StaticCredentialStore};
use siphon::strategy::{FetchRequest, FetchedPage, Session, Transport};
use siphon::utils::error::FetchError;
use siphon::utils::retry::RetryConfig;

/// Response handler; receives the request and how many times its URL was hit before
pub type Handler =
    Arc<dyn Fn(&FetchRequest, usize) -> Result<FetchedPage, FetchError> + Send + Sync>;

/// One request observed by [`FakeTransport`]
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub url: String,
    pub method: String,
    pub proxy: Option<String>,
    pub cookies: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// In-memory transport with per-URL handlers; unknown URLs answer 404
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Handler>>,
    /// Extra latency keyed by URL and 0-based hit index
    delays: Mutex<HashMap<(String, usize), Duration>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(
        &self,
        url: &str,
        handler: impl Fn(&FetchRequest, usize) -> Result<FetchedPage, FetchError> + Send + Sync + 'static,
    ) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(handler));
    }

    pub fn html(&self, url: &str, body: impl Into<String>) {
        let body = body.into();
        self.route(url, move |req, _| Ok(page(&req.url, 200, "text/html", &body)));
    }

    pub fn json(&self, url: &str, body: serde_json::Value) {
        let body = body.to_string();
        self.route(url, move |req, _| Ok(page(&req.url, 200, "application/json", &body)));
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        self.route(url, move |_, _| Err(error.clone()));
    }

    /// Hold the `nth` (0-based) request to `url` for `delay` before answering
    pub fn delay(&self, url: &str, nth: usize, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert((url.to_string(), nth), delay);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn hits(&self, url: &str) -> usize {
        self.seen.lock().unwrap().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(
        &self,
        request: &FetchRequest,
        proxy: Option<&str>,
        session: &Session,
    ) -> Result<FetchedPage, FetchError> {
        let previous = self.hits(&request.url);
        self.seen.lock().unwrap().push(SeenRequest {
            url: request.url.clone(),
            method: request.method.to_string(),
            proxy: proxy.map(str::to_string),
            cookies: session.cookie_header(),
            headers: session
                .headers()
                .iter()
                .chain(request.headers.iter())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        });

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&(request.url.clone(), previous))
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let handler = self.routes.lock().unwrap().get(&request.url).cloned();
        match handler {
            Some(handler) => handler(request, previous),
            None => Ok(page(&request.url, 404, "text/html", "not found")),
        }
    }
}

/// Build a response page
pub fn page(url: &str, status: u16, content_type: &str, body: &str) -> FetchedPage {
    FetchedPage::new(url, status, Some(content_type), Bytes::from(body.to_string()))
}

/// Minimal HTML document with the given title and links
pub fn html_with_links(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{href}">{href}</a>"#))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1>\
         <p>Server rendered content for {title}.</p>{anchors}</body></html>"
    )
}

/// Config with fast retries and a small pool
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.engine.workers = 2;
    config.engine.max_pending_jobs = 16;
    config.retry = RetryConfig::with_delays(2, 10, 100);
    config
}

/// Engine wired to a fake transport, memory store and recording sink
pub struct Harness {
    pub engine: Engine,
    pub transport: Arc<FakeTransport>,
    pub store: Arc<MemoryJobStore>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, None, None)
    }

    pub fn with_parts(
        config: Config,
        pool: Option<Arc<ProxyPool>>,
        credentials: Option<Arc<dyn CredentialStore>>,
    ) -> Self {
        let transport = FakeTransport::new();
        let store = Arc::new(MemoryJobStore::new());
        let sink = Arc::new(RecordingSink::new());

        let mut builder = Engine::builder(config)
            .transport(transport.clone())
            .store(store.clone())
            .sink(sink.clone())
            .credentials(
                credentials.unwrap_or_else(|| Arc::new(StaticCredentialStore::empty())),
            );
        if let Some(pool) = pool {
            builder = builder.pool(pool);
        }

        Self {
            engine: builder.build().expect("engine builds"),
            transport,
            store,
            sink,
        }
    }

    /// Wait for a job with a generous virtual-time bound
    pub async fn finish(&self, id: JobId) -> Job {
        tokio::time::timeout(Duration::from_secs(24 * 3600), self.engine.wait_for(id))
            .await
            .expect("job should settle")
            .expect("job exists")
    }
}
