//! Per-job execution context handed to strategies
//!
//! A context is created once per job execution and owned by the worker
//! driving it. It carries everything a strategy needs for one iteration: the
//! job's targets, the proxy leased for this iteration, the job's session and
//! iteration state, and handles to the shared collaborators.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::transport::{FetchRequest, FetchedPage, Session, Transport};
use super::Progress;
use crate::metrics;
use crate::models::{EventPayload, JobEvent, JobId, JobSpec, OutputSchema, StrategyKind, Task, TaskOutcome};
use crate::notifications::EventSink;
use crate::proxy::{AttemptOutcome, ProxyEndpoint, ProxyPool};
use crate::scheduler::cancel::CancelFlag;
use crate::storage::{CredentialStore, Credentials, JobStore};
use crate::utils::error::{CredentialError, FetchError};

/// Shared collaborators used by every job
#[derive(Clone)]
pub struct Services {
    pub transport: Arc<dyn Transport>,
    pub pool: Arc<ProxyPool>,
    pub store: Arc<dyn JobStore>,
    pub sink: Arc<dyn EventSink>,
    pub credentials: Arc<dyn CredentialStore>,
}

/// Job-owned state that survives between iterations and across a requeue
#[derive(Debug, Default)]
pub struct JobRuntime {
    /// Concrete strategy configuration once resolved
    pub strategy: Option<crate::models::StrategyConfig>,
    pub session: Session,
    pub authenticated: bool,
    pub progress: Progress,
}

/// Execution context for one job
pub struct StrategyContext {
    pub job_id: JobId,
    pub urls: Vec<String>,
    pub schema: Option<OutputSchema>,
    /// Strategy used for metrics labels and the timeout budget
    pub kind: StrategyKind,
    /// Per-fetch timeout
    pub timeout: Duration,
    pub session: Session,
    pub authenticated: bool,
    pub progress: Progress,
    /// 1-based attempt number of the current iteration
    pub attempt: u32,
    pub cancel: CancelFlag,
    proxy: Option<Arc<ProxyEndpoint>>,
    last_url: Option<String>,
    last_latency: Duration,
    services: Services,
}

impl StrategyContext {
    pub fn new(
        job_id: JobId,
        spec: &JobSpec,
        runtime: JobRuntime,
        cancel: CancelFlag,
        services: Services,
    ) -> Self {
        Self {
            job_id,
            urls: spec.urls.clone(),
            schema: spec.output_schema.clone(),
            kind: spec.strategy.effective_kind(),
            timeout: Duration::from_secs(30),
            session: runtime.session,
            authenticated: runtime.authenticated,
            progress: runtime.progress,
            attempt: 1,
            cancel,
            proxy: None,
            last_url: None,
            last_latency: Duration::ZERO,
            services,
        }
    }

    /// Hand iteration state back for a requeue
    pub fn into_runtime(self, strategy: Option<crate::models::StrategyConfig>) -> JobRuntime {
        JobRuntime {
            strategy,
            session: self.session,
            authenticated: self.authenticated,
            progress: self.progress,
        }
    }

    pub fn primary_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }

    pub fn set_proxy(&mut self, proxy: Option<Arc<ProxyEndpoint>>) {
        self.proxy = proxy;
    }

    /// Redacted address of the proxy used by this iteration
    pub fn proxy_label(&self) -> Option<String> {
        self.proxy.as_ref().map(|p| p.display_address())
    }

    /// URL of the most recent fetch attempt
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    pub fn last_latency(&self) -> Duration {
        self.last_latency
    }

    /// GET request with this job's timeout budget
    pub fn request(&self, url: &str) -> FetchRequest {
        FetchRequest::get(url, self.timeout)
    }

    /// GET `url`, failing on non-success statuses
    pub async fn get(&mut self, url: &str) -> Result<FetchedPage, FetchError> {
        let request = self.request(url);
        self.fetch(request).await
    }

    /// Perform a request, failing on non-success statuses
    pub async fn fetch(&mut self, request: FetchRequest) -> Result<FetchedPage, FetchError> {
        let page = self.fetch_raw(request).await?;
        page.error_for_status()?;
        Ok(page)
    }

    /// Perform a request and return the response whatever its status
    ///
    /// The outcome is reported to the proxy pool when it reflects on the
    /// proxy (timeouts, refused connections, blocks, rate limits, 5xx).
    pub async fn fetch_raw(&mut self, request: FetchRequest) -> Result<FetchedPage, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        self.last_url = Some(request.url.clone());

        let started = Instant::now();
        let proxy_address = self.proxy.as_ref().map(|p| p.address().to_string());
        let result = self
            .services
            .transport
            .fetch(&request, proxy_address.as_deref(), &self.session)
            .await;
        self.last_latency = started.elapsed();

        let proxy_verdict = match &result {
            Ok(page) => Some(
                page.error_for_status()
                    .err()
                    .map_or(true, |e| !e.counts_against_proxy()),
            ),
            Err(e) if e.counts_against_proxy() => Some(false),
            Err(_) => None,
        };

        if let Some(success) = proxy_verdict {
            metrics::record_fetch(self.kind.as_str(), success, self.last_latency.as_secs_f64());
            if let Some(proxy) = &self.proxy {
                let outcome = AttemptOutcome {
                    success,
                    latency: self.last_latency,
                };
                self.services.pool.report(proxy.id(), outcome);
            }
        }

        match &result {
            Ok(page) => tracing::debug!(
                job_id = %self.job_id,
                url = %request.url,
                status = page.status,
                latency_ms = self.last_latency.as_millis() as u64,
                "Fetched"
            ),
            Err(e) => tracing::debug!(
                job_id = %self.job_id,
                url = %request.url,
                error = %e,
                "Fetch failed"
            ),
        }

        result
    }

    /// Append one fetch attempt to the task ledger
    pub async fn record_task(&self, url: &str, outcome: TaskOutcome) {
        let task = Task {
            job_id: self.job_id,
            url: url.to_string(),
            attempt: self.attempt,
            outcome,
            proxy: self.proxy_label(),
            latency_ms: self.last_latency.as_millis() as u64,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.services.store.append_task(self.job_id, task).await {
            tracing::warn!(job_id = %self.job_id, url = %url, error = %e, "Failed to append task");
        }
    }

    /// Publish a non-transition event for this job
    pub async fn publish(&self, payload: EventPayload) {
        let event = JobEvent::new(self.job_id, payload);
        self.services.sink.publish(&event).await;
    }

    pub async fn resolve_credentials(&self) -> Result<Credentials, CredentialError> {
        self.services.credentials.resolve_credentials(self.job_id).await
    }
}
