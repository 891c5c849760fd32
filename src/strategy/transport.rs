//! Outbound HTTP transport
//!
//! Every strategy fetch goes through a [`Transport`]. The production
//! [`HttpTransport`] adds the stealth layer:
//! - User-Agent rotation over realistic browser strings
//! - a shared governor rate limiter across all workers
//! - per-fetch proxy binding via `reqwest::Proxy`
//! - charset-aware body decoding
//!
//! Cookies are not kept in a shared jar. Each job carries its own
//! [`Session`], so authenticated state never leaks between jobs.

use async_trait::async_trait;
use bytes::Bytes;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{
        HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE,
        SET_COOKIE, USER_AGENT,
    },
    redirect, Client, Method,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::utils::decode_body;
use crate::utils::error::FetchError;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

// ============================================================================
// Request / Response
// ============================================================================

/// Request body variants
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

/// One outbound request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
    /// Follow 3xx responses; login flows disable this to capture cookies
    pub follow_redirects: bool,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: BTreeMap::new(),
            body: None,
            timeout,
            follow_redirects: true,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

/// A fetched response
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Cookies set by the response, in header order
    pub set_cookies: Vec<(String, String)>,
    pub body: Bytes,
    /// Body decoded with the detected charset
    pub text: String,
    pub latency: Duration,
}

impl FetchedPage {
    /// Build a page from raw parts, decoding the body
    pub fn new(url: impl Into<String>, status: u16, content_type: Option<&str>, body: Bytes) -> Self {
        let text = decode_body(&body, content_type);
        Self {
            url: url.into(),
            status,
            content_type: content_type.map(str::to_string),
            set_cookies: Vec::new(),
            body,
            text,
            latency: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Content type without parameters, lowercased
    pub fn mime(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase())
    }

    pub fn is_json(&self) -> bool {
        self.mime()
            .map(|m| m == "application/json" || m.ends_with("+json"))
            .unwrap_or(false)
    }

    /// Map a non-success status onto a fetch error
    pub fn error_for_status(&self) -> Result<(), FetchError> {
        match self.status {
            200..=399 => Ok(()),
            429 => Err(FetchError::RateLimit),
            403 => Err(FetchError::Blocked(403)),
            400..=499 => Err(FetchError::ClientError(self.status)),
            _ => Err(FetchError::ServerError(self.status)),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Per-job cookies and headers applied to every request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    cookies: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
}

impl Session {
    pub fn set_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Merge cookies set by a response
    pub fn absorb(&mut self, page: &FetchedPage) {
        for (name, value) in &page.set_cookies {
            self.set_cookie(name.clone(), value.clone());
        }
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// `Cookie` header value, if any cookies are set
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Parse the leading `name=value` pair of a `Set-Cookie` header
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}

// ============================================================================
// Transport
// ============================================================================

/// Performs one request, optionally through a proxy
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        request: &FetchRequest,
        proxy: Option<&str>,
        session: &Session,
    ) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed transport with rate limiting and UA rotation
pub struct HttpTransport {
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    clients: Mutex<HashMap<(Option<String>, bool), Client>>,
    user_agent: String,
    rotate_user_agents: bool,
}

impl HttpTransport {
    /// Create a transport from engine configuration
    pub fn new(config: &EngineConfig) -> Result<Self, FetchError> {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let transport = Self {
            rate_limiter: RateLimiter::direct(Quota::per_second(rate)),
            clients: Mutex::new(HashMap::new()),
            user_agent: config.user_agent.clone(),
            rotate_user_agents: config.rotate_user_agents,
        };
        // Build the direct client eagerly so configuration errors surface at startup
        transport.client_for(None, true)?;
        Ok(transport)
    }

    fn client_for(&self, proxy: Option<&str>, follow_redirects: bool) -> Result<Client, FetchError> {
        let key = (proxy.map(str::to_string), follow_redirects);
        let mut clients = self.clients.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder().gzip(true).redirect(if follow_redirects {
            redirect::Policy::limited(10)
        } else {
            redirect::Policy::none()
        });
        if let Some(address) = proxy {
            let proxy = reqwest::Proxy::all(address).map_err(|e| {
                FetchError::InvalidProxy(format!("{}: {e}", crate::utils::redact_url(address)))
            })?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        let client = builder.build()?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    fn user_agent(&self) -> &str {
        if self.rotate_user_agents {
            let mut rng = rand::thread_rng();
            USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
        } else {
            &self.user_agent
        }
    }

    fn build_headers(&self, request: &FetchRequest, session: &Session) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(ua) = HeaderValue::from_str(self.user_agent()) {
            headers.insert(USER_AGENT, ua);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.8,*/*;q=0.7",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        if let Some(cookie) = session.cookie_header() {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.insert(COOKIE, value);
            }
        }

        // Request headers override session headers, which override defaults
        for (name, value) in session.headers().iter().chain(request.headers.iter()) {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::debug!(header = %name, "Skipping invalid header"),
            }
        }

        headers
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        request: &FetchRequest,
        proxy: Option<&str>,
        session: &Session,
    ) -> Result<FetchedPage, FetchError> {
        url::Url::parse(&request.url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {e}", request.url)))?;

        self.rate_limiter.until_ready().await;

        let client = self.client_for(proxy, request.follow_redirects)?;
        let mut builder = client
            .request(request.method.clone(), &request.url)
            .headers(self.build_headers(request, session))
            .timeout(request.timeout);
        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            None => builder,
        };

        let started = Instant::now();
        tracing::debug!(
            url = %request.url,
            method = %request.method,
            proxied = proxy.is_some(),
            "Fetching"
        );

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let set_cookies: Vec<(String, String)> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();

        let body = response.bytes().await?;

        let mut page = FetchedPage::new(final_url, status, content_type.as_deref(), body);
        page.set_cookies = set_cookies;
        page.latency = started.elapsed();
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_rotation() {
        let transport = HttpTransport::new(&EngineConfig::default()).unwrap();
        for _ in 0..10 {
            assert!(USER_AGENTS.contains(&transport.user_agent()));
        }
    }

    #[test]
    fn test_fixed_user_agent() {
        let config = EngineConfig {
            rotate_user_agents: false,
            user_agent: String::from("siphon-test/1.0"),
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.user_agent(), "siphon-test/1.0");
    }

    #[test]
    fn test_parse_set_cookie() {
        assert_eq!(
            parse_set_cookie("sid=abc123; Path=/; HttpOnly"),
            Some((String::from("sid"), String::from("abc123")))
        );
        assert_eq!(parse_set_cookie("=bad"), None);
        assert_eq!(parse_set_cookie("novalue"), None);
    }

    #[test]
    fn test_session_cookie_header() {
        let mut session = Session::default();
        assert!(session.cookie_header().is_none());
        session.set_cookie("a", "1");
        session.set_cookie("b", "2");
        assert_eq!(session.cookie_header().as_deref(), Some("a=1; b=2"));
    }

    #[test]
    fn test_status_mapping() {
        let page = |status| FetchedPage::new("https://example.com", status, None, Bytes::new());
        assert!(page(200).error_for_status().is_ok());
        assert!(page(302).error_for_status().is_ok());
        assert_eq!(page(429).error_for_status(), Err(FetchError::RateLimit));
        assert_eq!(page(403).error_for_status(), Err(FetchError::Blocked(403)));
        assert_eq!(page(404).error_for_status(), Err(FetchError::ClientError(404)));
        assert_eq!(page(503).error_for_status(), Err(FetchError::ServerError(503)));
    }

    #[test]
    fn test_json_detection() {
        let page = FetchedPage::new(
            "https://api.example.com",
            200,
            Some("application/vnd.api+json; charset=utf-8"),
            Bytes::from_static(b"{}"),
        );
        assert!(page.is_json());
        assert_eq!(page.mime().as_deref(), Some("application/vnd.api+json"));
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let transport = HttpTransport::new(&EngineConfig::default()).unwrap();
        assert!(matches!(
            transport.client_for(Some("http://[::1"), true),
            Err(FetchError::InvalidProxy(_))
        ));
    }
}
