// Core data structures for the siphon engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::scheduler::error::SchedulerError;

/// Crawl depth bounds accepted at submission
pub const MAX_DEPTH_RANGE: (u32, u32) = (1, 5);

/// Page cap bounds accepted at submission
pub const MAX_PAGES_RANGE: (usize, usize) = (1, 1000);

/// Poll interval bounds (seconds) for streaming jobs
pub const POLL_INTERVAL_RANGE: (u64, u64) = (10, 3600);

/// Duration bounds (minutes) for streaming jobs
pub const MAX_DURATION_RANGE: (u64, u64) = (1, 1440);

// ============================================================================
// Identity
// ============================================================================

/// Stable job identifier, unchanged across retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its string form
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Job State
// ============================================================================

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Strategy Configuration
// ============================================================================

/// Concrete extraction strategy (after `auto` resolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Static,
    Browser,
    Api,
    Crawler,
    Document,
    Ocr,
    Streaming,
    Auth,
    Auto,
}

impl StrategyKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Browser => "browser",
            Self::Api => "api",
            Self::Crawler => "crawler",
            Self::Document => "document",
            Self::Ocr => "ocr",
            Self::Streaming => "streaming",
            Self::Auth => "auth",
            Self::Auto => "auto",
        }
    }

    /// Strategies that pay a heavier acquisition cost get a larger timeout budget
    pub fn is_heavy(&self) -> bool {
        matches!(self, Self::Browser | Self::Document | Self::Ocr)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy selection plus the configuration that strategy needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StrategyConfig {
    Auto,
    Static,
    Browser(BrowserConfig),
    Api(ApiConfig),
    Crawler(CrawlConfig),
    Document,
    Ocr(OcrConfig),
    Streaming(StreamingConfig),
    Auth(AuthConfig),
}

impl StrategyConfig {
    /// The strategy kind this configuration selects
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Auto => StrategyKind::Auto,
            Self::Static => StrategyKind::Static,
            Self::Browser(_) => StrategyKind::Browser,
            Self::Api(_) => StrategyKind::Api,
            Self::Crawler(_) => StrategyKind::Crawler,
            Self::Document => StrategyKind::Document,
            Self::Ocr(_) => StrategyKind::Ocr,
            Self::Streaming(_) => StrategyKind::Streaming,
            Self::Auth(_) => StrategyKind::Auth,
        }
    }

    /// Default configuration for a kind chosen by auto-resolution
    pub fn default_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Browser => Self::Browser(BrowserConfig::default()),
            StrategyKind::Api => Self::Api(ApiConfig::default()),
            StrategyKind::Crawler => Self::Crawler(CrawlConfig::default()),
            StrategyKind::Document => Self::Document,
            StrategyKind::Ocr => Self::Ocr(OcrConfig::default()),
            StrategyKind::Streaming => Self::Streaming(StreamingConfig::default()),
            StrategyKind::Auto => Self::Auto,
            StrategyKind::Static | StrategyKind::Auth => Self::Static,
        }
    }

    /// Innermost strategy kind that performs extraction
    pub fn effective_kind(&self) -> StrategyKind {
        match self {
            Self::Auth(auth) => auth.inner.effective_kind(),
            other => other.kind(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::Auto
    }
}

/// Browser rendering options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Selector the renderer should wait for before capturing markup
    pub wait_for_selector: Option<String>,
}

/// API replay options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// HTTP method (GET, POST, ...)
    pub method: String,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
    /// Optional JSON request body
    pub body: Option<Value>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            method: String::from("GET"),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// URL include/exclude filters for crawls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlPatterns {
    /// Regex patterns; when non-empty a URL must match at least one
    pub include: Vec<String>,
    /// Regex patterns; a matching URL is always rejected
    pub exclude: Vec<String>,
}

/// Multi-page crawl options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Maximum link depth from the seed URLs (1-5)
    pub max_depth: u32,
    /// Cap on visited plus pending pages
    pub max_pages: usize,
    /// URL filters applied to discovered links
    pub url_patterns: UrlPatterns,
    /// Whether links to other domains are enqueued
    pub follow_external_links: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 50,
            url_patterns: UrlPatterns::default(),
            follow_external_links: false,
        }
    }
}

/// OCR options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Language hint passed to the OCR engine
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: String::from("eng"),
        }
    }
}

/// Continuous monitoring options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Seconds between polls (10-3600)
    pub poll_interval_seconds: u64,
    /// Total monitoring time in minutes
    pub max_duration_minutes: u64,
    /// Fraction of changed fields (0.0-1.0) that raises an alert
    pub change_threshold: f64,
    /// Optional webhook notified on alerts
    pub webhook_url: Option<String>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            max_duration_minutes: 60,
            change_threshold: 0.1,
            webhook_url: None,
        }
    }
}

/// How an authenticated session is established
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthMethod {
    /// Inject the stored cookies verbatim
    Cookies,
    /// POST username/password to a login form
    Form {
        login_url: String,
        #[serde(default = "default_username_field")]
        username_field: String,
        #[serde(default = "default_password_field")]
        password_field: String,
        /// Cookie that must exist after login; any cookie counts when unset
        #[serde(default)]
        session_cookie: Option<String>,
    },
    /// Attach `Authorization: Bearer <token>`
    Bearer,
}

fn default_username_field() -> String {
    String::from("username")
}

fn default_password_field() -> String {
    String::from("password")
}

fn default_auth_inner() -> Box<StrategyConfig> {
    Box::new(StrategyConfig::Static)
}

/// Authenticated extraction: a credential pre-step wrapping another strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    #[serde(default = "default_auth_inner")]
    pub inner: Box<StrategyConfig>,
}

/// Output schema: field name to CSS selector
pub type OutputSchema = BTreeMap<String, String>;

// ============================================================================
// Job Specification
// ============================================================================

/// Client-submitted extraction request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Target URL(s)
    pub urls: Vec<String>,
    /// Requested strategy and its configuration
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Optional field extraction schema
    #[serde(default)]
    pub output_schema: Option<OutputSchema>,
}

impl JobSpec {
    /// Create a spec for a single URL
    pub fn new(url: impl Into<String>, strategy: StrategyConfig) -> Self {
        Self {
            urls: vec![url.into()],
            strategy,
            output_schema: None,
        }
    }

    /// Attach an output schema
    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// First target URL
    pub fn primary_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }

    /// Validate configuration before queueing
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.urls.is_empty() {
            return Err(SchedulerError::invalid_spec("urls", "at least one URL is required"));
        }
        for raw in &self.urls {
            validate_http_url("urls", raw)?;
        }
        if let Some(schema) = &self.output_schema {
            for (field, selector) in schema {
                if scraper::Selector::parse(selector).is_err() {
                    return Err(SchedulerError::invalid_spec(
                        "output_schema",
                        format!("invalid selector for field '{field}': {selector}"),
                    ));
                }
            }
        }
        validate_strategy(&self.strategy)
    }
}

fn validate_http_url(field: &str, raw: &str) -> Result<(), SchedulerError> {
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(SchedulerError::invalid_spec(
            field,
            format!("unsupported scheme '{}' in {raw}", parsed.scheme()),
        )),
        Err(e) => Err(SchedulerError::invalid_spec(field, format!("{raw}: {e}"))),
    }
}

fn validate_strategy(config: &StrategyConfig) -> Result<(), SchedulerError> {
    match config {
        StrategyConfig::Crawler(crawl) => {
            let (min_depth, max_depth) = MAX_DEPTH_RANGE;
            if crawl.max_depth < min_depth || crawl.max_depth > max_depth {
                return Err(SchedulerError::invalid_spec(
                    "max_depth",
                    format!("{} outside [{min_depth}, {max_depth}]", crawl.max_depth),
                ));
            }
            let (min_pages, max_pages) = MAX_PAGES_RANGE;
            if crawl.max_pages < min_pages || crawl.max_pages > max_pages {
                return Err(SchedulerError::invalid_spec(
                    "max_pages",
                    format!("{} outside [{min_pages}, {max_pages}]", crawl.max_pages),
                ));
            }
            for pattern in crawl.url_patterns.include.iter().chain(&crawl.url_patterns.exclude) {
                if let Err(e) = regex::Regex::new(pattern) {
                    return Err(SchedulerError::invalid_spec(
                        "url_patterns",
                        format!("invalid pattern '{pattern}': {e}"),
                    ));
                }
            }
            Ok(())
        }
        StrategyConfig::Streaming(stream) => {
            let (min_poll, max_poll) = POLL_INTERVAL_RANGE;
            if stream.poll_interval_seconds < min_poll || stream.poll_interval_seconds > max_poll {
                return Err(SchedulerError::invalid_spec(
                    "poll_interval_seconds",
                    format!("{} outside [{min_poll}, {max_poll}]", stream.poll_interval_seconds),
                ));
            }
            let (min_dur, max_dur) = MAX_DURATION_RANGE;
            if stream.max_duration_minutes < min_dur || stream.max_duration_minutes > max_dur {
                return Err(SchedulerError::invalid_spec(
                    "max_duration_minutes",
                    format!("{} outside [{min_dur}, {max_dur}]", stream.max_duration_minutes),
                ));
            }
            if !(0.0..=1.0).contains(&stream.change_threshold) {
                return Err(SchedulerError::invalid_spec(
                    "change_threshold",
                    format!("{} outside [0, 1]", stream.change_threshold),
                ));
            }
            if let Some(webhook) = &stream.webhook_url {
                validate_http_url("webhook_url", webhook)?;
            }
            Ok(())
        }
        StrategyConfig::Api(api) => {
            if reqwest::Method::from_bytes(api.method.to_uppercase().as_bytes()).is_err() {
                return Err(SchedulerError::invalid_spec(
                    "method",
                    format!("invalid HTTP method '{}'", api.method),
                ));
            }
            Ok(())
        }
        StrategyConfig::Auth(auth) => {
            if let AuthMethod::Form { login_url, .. } = &auth.method {
                validate_http_url("login_url", login_url)?;
            }
            match auth.inner.kind() {
                StrategyKind::Auth | StrategyKind::Auto => Err(SchedulerError::invalid_spec(
                    "inner",
                    format!("auth cannot wrap the '{}' strategy", auth.inner.kind()),
                )),
                _ => validate_strategy(&auth.inner),
            }
        }
        StrategyConfig::Browser(browser) => match &browser.wait_for_selector {
            Some(selector) if scraper::Selector::parse(selector).is_err() => Err(
                SchedulerError::invalid_spec("wait_for_selector", format!("invalid selector: {selector}")),
            ),
            _ => Ok(()),
        },
        StrategyConfig::Auto
        | StrategyConfig::Static
        | StrategyConfig::Document
        | StrategyConfig::Ocr(_) => Ok(()),
    }
}

// ============================================================================
// Job
// ============================================================================

/// Classification of a job failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidSpec,
    TransientInfra,
    Strategy,
    CapacityExceeded,
    Credential,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSpec => "invalid_spec",
            Self::TransientInfra => "transient_infra",
            Self::Strategy => "strategy",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::Credential => "credential",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error attached to a failed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: FailureKind,
    pub message: String,
    /// Proxy used by the last attempt
    pub proxy: Option<String>,
    /// URL of the last attempted fetch
    pub url: Option<String>,
    /// Number of attempts made for the failing step
    pub attempt: u32,
}

impl ErrorDescriptor {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            proxy: None,
            url: None,
            attempt: 1,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// One extraction request and its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub spec: JobSpec,
    pub state: JobState,
    /// Concrete strategy once resolved
    pub resolved_strategy: Option<StrategyKind>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set only when completed
    pub result: Option<Value>,
    /// Set only when failed
    pub error: Option<ErrorDescriptor>,
}

impl Job {
    /// Create a queued job from a spec
    pub fn new(spec: JobSpec) -> Self {
        Self {
            id: JobId::new(),
            spec,
            state: JobState::Queued,
            resolved_strategy: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// Outcome of a single fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Success,
    Fail,
    Skip,
}

/// One fetch attempt belonging to a crawler or streaming job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub job_id: JobId,
    pub url: String,
    pub attempt: u32,
    pub outcome: TaskOutcome,
    pub proxy: Option<String>,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Events
// ============================================================================

/// Event payloads published to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A state machine transition; `from` is empty for the initial submission
    StateChanged {
        from: Option<JobState>,
        to: JobState,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorDescriptor>,
    },
    /// Iteration progress for crawler/streaming jobs
    Progress { data: Value },
    /// A transient failure is being retried
    Retrying {
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// Streaming change detection crossed the threshold
    ChangeAlert {
        cycle: u32,
        fraction: f64,
        changed_fields: Vec<String>,
        snapshot: Value,
    },
}

/// Event emitted for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl JobEvent {
    pub fn new(job_id: JobId, payload: EventPayload) -> Self {
        Self {
            job_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Event type name used by subscribers
    pub fn event_type(&self) -> &'static str {
        match self.payload {
            EventPayload::StateChanged { .. } => "state_changed",
            EventPayload::Progress { .. } => "progress",
            EventPayload::Retrying { .. } => "retrying",
            EventPayload::ChangeAlert { .. } => "change_alert",
        }
    }

    /// The transition carried by a state event
    pub fn transition(&self) -> Option<(Option<JobState>, JobState)> {
        match &self.payload {
            EventPayload::StateChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawl_spec(max_depth: u32, max_pages: usize) -> JobSpec {
        JobSpec::new(
            "https://example.com",
            StrategyConfig::Crawler(CrawlConfig {
                max_depth,
                max_pages,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_crawl_depth_bounds() {
        assert!(crawl_spec(1, 10).validate().is_ok());
        assert!(crawl_spec(5, 10).validate().is_ok());
        assert!(crawl_spec(0, 10).validate().is_err());
        assert!(crawl_spec(6, 10).validate().is_err());
        assert!(crawl_spec(2, 0).validate().is_err());
    }

    #[test]
    fn test_poll_interval_bounds() {
        let spec = |poll| {
            JobSpec::new(
                "https://example.com",
                StrategyConfig::Streaming(StreamingConfig {
                    poll_interval_seconds: poll,
                    ..Default::default()
                }),
            )
        };
        assert!(spec(10).validate().is_ok());
        assert!(spec(3600).validate().is_ok());
        assert!(spec(9).validate().is_err());
        assert!(spec(3601).validate().is_err());
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let spec = JobSpec::new("ftp://example.com/file", StrategyConfig::Static);
        assert!(spec.validate().is_err());
        let empty = JobSpec::default();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_auth_rejects_auth_and_auto_inner() {
        let wrap = |inner: StrategyConfig| {
            JobSpec::new(
                "https://example.com",
                StrategyConfig::Auth(AuthConfig {
                    method: AuthMethod::Bearer,
                    inner: Box::new(inner),
                }),
            )
        };

        let nested = wrap(StrategyConfig::Auth(AuthConfig {
            method: AuthMethod::Cookies,
            inner: Box::new(StrategyConfig::Static),
        }));
        assert!(nested.validate().is_err());
        assert!(wrap(StrategyConfig::Auto).validate().is_err());
        assert!(wrap(StrategyConfig::Static).validate().is_ok());
    }

    #[test]
    fn test_strategy_config_deserialize() {
        let json = r#"{
            "urls": ["https://example.com"],
            "strategy": {"kind": "crawler", "max_depth": 3, "follow_external_links": true}
        }"#;
        let spec: JobSpec = serde_json::from_str(json).unwrap();
        match spec.strategy {
            StrategyConfig::Crawler(crawl) => {
                assert_eq!(crawl.max_depth, 3);
                assert_eq!(crawl.max_pages, 50);
                assert!(crawl.follow_external_links);
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn test_auth_defaults_to_static_inner() {
        let json = r#"{"kind": "auth", "method": {"type": "bearer"}}"#;
        let config: StrategyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.effective_kind(), StrategyKind::Static);
    }

    #[test]
    fn test_missing_strategy_is_auto() {
        let spec: JobSpec = serde_json::from_str(r#"{"urls": ["https://example.com"]}"#).unwrap();
        assert_eq!(spec.strategy.kind(), StrategyKind::Auto);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = JobEvent::new(
            JobId::new(),
            EventPayload::StateChanged {
                from: Some(JobState::Queued),
                to: JobState::Running,
                result: None,
                error: None,
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "state_changed");
        assert_eq!(value["to"], "running");
        assert_eq!(event.event_type(), "state_changed");
    }
}
