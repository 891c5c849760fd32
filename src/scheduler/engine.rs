//! Job scheduler and worker pool
//!
//! The engine accepts jobs, keeps a bounded FIFO queue and hands jobs to a
//! fixed pool of workers. All lifecycle transitions go through
//! [`state::apply`](super::state::apply) under the scheduler lock; the store
//! write and the event publish happen outside it, in that order.
//!
//! A job stays in the live map until its terminal state has been saved and
//! announced, so status reads never observe a stale store record.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::cancel::CancelFlag;
use super::error::{SchedulerError, SchedulerResult};
use super::state::{self, Transition};
use super::worker;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::{Job, JobEvent, JobId, JobSpec, JobState, StrategyKind, Task};
use crate::notifications::{EventSink, LogSink};
use crate::proxy::{ProxyEndpoint, ProxyPool, ProxyProber};
use crate::storage::{CredentialStore, JobStore, MemoryJobStore, StaticCredentialStore};
use crate::strategy::{Dispatcher, FetchRequest, HttpTransport, JobRuntime, Services, Session, Transport};

/// Entry in the pending queue
struct QueuedJob {
    id: JobId,
    /// Iteration state carried over from a requeue
    resume: Option<JobRuntime>,
}

/// Non-terminal (or not yet settled) job held in memory
struct LiveJob {
    job: Job,
    cancel: CancelFlag,
}

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<QueuedJob>,
    jobs: HashMap<JobId, LiveJob>,
    busy: usize,
    /// Slots held by submissions waiting on the store
    reserved: usize,
    stopping: bool,
}

/// Job handed to a worker
pub(crate) struct Claimed {
    pub job: Job,
    pub cancel: CancelFlag,
    pub resume: Option<JobRuntime>,
    pub event: JobEvent,
}

pub(crate) struct EngineInner {
    pub(crate) config: Config,
    state: Mutex<SchedulerState>,
    pub(crate) work_available: Notify,
    job_settled: Notify,
    pub(crate) services: Services,
    pub(crate) dispatcher: Dispatcher,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Scraping job engine
///
/// Cheap to clone; all clones share one scheduler.
///
/// # Example
///
/// ```no_run
/// use siphon::config::Config;
/// use siphon::models::{JobSpec, StrategyConfig};
/// use siphon::scheduler::Engine;
///
/// # async fn run() -> siphon::error::Result<()> {
/// let engine = Engine::builder(Config::default()).build()?;
/// engine.start();
///
/// let id = engine
///     .submit(JobSpec::new("https://example.com", StrategyConfig::Static))
///     .await?;
/// let job = engine.wait_for(id).await?;
/// println!("{}: {:?}", job.state, job.result);
///
/// engine.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn JobStore>>,
    sink: Option<Arc<dyn EventSink>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    pool: Option<Arc<ProxyPool>>,
    dispatcher: Dispatcher,
}

impl EngineBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Use an existing pool instead of one built from the proxy config
    pub fn pool(mut self, pool: Arc<ProxyPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config
            .validate()
            .map_err(|e| Error::config(e.to_string()))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config.engine)?),
        };
        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(ProxyPool::from_config(&self.config.proxy)));

        let services = Services {
            transport,
            pool,
            store: self.store.unwrap_or_else(|| Arc::new(MemoryJobStore::new())),
            sink: self.sink.unwrap_or_else(|| Arc::new(LogSink)),
            credentials: self
                .credentials
                .unwrap_or_else(|| Arc::new(StaticCredentialStore::empty())),
        };

        let (shutdown, _) = watch::channel(false);
        Ok(Engine {
            inner: Arc::new(EngineInner {
                config: self.config,
                state: Mutex::new(SchedulerState::default()),
                work_available: Notify::new(),
                job_settled: Notify::new(),
                services,
                dispatcher: self.dispatcher,
                shutdown,
                handles: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl Engine {
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder {
            config,
            transport: None,
            store: None,
            sink: None,
            credentials: None,
            pool: None,
            dispatcher: Dispatcher::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.inner.services.pool
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.services.store
    }

    pub fn queue_depth(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn busy_workers(&self) -> usize {
        self.lock().busy
    }

    pub fn is_stopping(&self) -> bool {
        self.lock().stopping
    }

    // ========================================================================
    // Client operations
    // ========================================================================

    /// Validate and enqueue a job
    ///
    /// Rejected submissions (invalid spec, full queue, shutdown) create no
    /// job record.
    pub async fn submit(&self, spec: JobSpec) -> SchedulerResult<JobId> {
        if self.is_stopping() {
            metrics::record_job_rejected("shutting_down");
            return Err(SchedulerError::ShuttingDown);
        }
        if let Err(e) = spec.validate() {
            metrics::record_job_rejected("invalid_spec");
            tracing::info!(error = %e, "Rejected job spec");
            return Err(e);
        }

        let job = Job::new(spec);
        let id = job.id;
        let cancel = CancelFlag::new();

        // Visible to cancel before the record is stored
        let limit = self.inner.config.engine.max_pending_jobs;
        {
            let mut state = self.lock();
            if state.queue.len() + state.reserved >= limit {
                metrics::record_job_rejected("capacity_exceeded");
                tracing::warn!(limit, "Queue full, rejecting job");
                return Err(SchedulerError::CapacityExceeded { limit });
            }
            state.reserved += 1;
            state.jobs.insert(
                id,
                LiveJob {
                    job: job.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        if let Err(e) = self.inner.services.store.insert_job(&job).await {
            let mut state = self.lock();
            state.reserved -= 1;
            state.jobs.remove(&id);
            return Err(SchedulerError::store_error("insert_job", e.to_string()));
        }

        self.inner.services.sink.publish(&state::submitted(&job)).await;
        tracing::info!(
            job_id = %id,
            strategy = %job.spec.strategy.kind(),
            urls = job.spec.urls.len(),
            "Job queued"
        );

        let cancelled = {
            let mut state = self.lock();
            state.reserved -= 1;
            if cancel.is_cancelled() {
                true
            } else {
                state.queue.push_back(QueuedJob { id, resume: None });
                metrics::set_queue_depth(state.queue.len());
                false
            }
        };
        metrics::record_job_submitted();

        if cancelled {
            self.settle(id, Transition::Cancel).await;
            tracing::info!(job_id = %id, "Cancelled job during submission");
        } else {
            self.inner.work_available.notify_one();
        }

        Ok(id)
    }

    /// Cancel a queued or running job
    ///
    /// Queued jobs are cancelled immediately. Running jobs are flagged and
    /// stop at their next suspension point.
    pub async fn cancel(&self, id: JobId) -> SchedulerResult<()> {
        enum Action {
            Settle,
            Flagged,
            NotLive,
        }

        let action = {
            let mut state = self.lock();
            let state = &mut *state;
            match state.jobs.get(&id) {
                Some(live) if live.job.state.is_terminal() => {
                    return Err(SchedulerError::AlreadyTerminal {
                        job_id: id,
                        state: live.job.state,
                    })
                }
                Some(live) if live.job.state == JobState::Queued => {
                    match state.queue.iter().position(|q| q.id == id) {
                        Some(position) => {
                            state.queue.remove(position);
                            metrics::set_queue_depth(state.queue.len());
                            Action::Settle
                        }
                        // Still being submitted or requeued; whoever enqueues it settles it
                        None => {
                            live.cancel.cancel();
                            Action::Flagged
                        }
                    }
                }
                Some(live) => {
                    live.cancel.cancel();
                    Action::Flagged
                }
                None => Action::NotLive,
            }
        };

        match action {
            Action::Settle => {
                self.settle(id, Transition::Cancel).await;
                tracing::info!(job_id = %id, "Cancelled queued job");
            }
            Action::Flagged => tracing::info!(job_id = %id, "Cancellation requested"),
            Action::NotLive => return self.cancel_persisted(id).await,
        }
        Ok(())
    }

    /// Cancel a job known only to the store
    async fn cancel_persisted(&self, id: JobId) -> SchedulerResult<()> {
        let mut job = self
            .load(id)
            .await?
            .ok_or(SchedulerError::NotFound { job_id: id })?;

        let event = state::apply(&mut job, Transition::Cancel)?;
        self.persist(&job).await;
        self.inner.services.sink.publish(&event).await;
        Ok(())
    }

    /// Current job record
    pub async fn get_status(&self, id: JobId) -> SchedulerResult<Job> {
        if let Some(live) = self.lock().jobs.get(&id) {
            return Ok(live.job.clone());
        }
        self.load(id)
            .await?
            .ok_or(SchedulerError::NotFound { job_id: id })
    }

    /// Wait until a job has reached a terminal state and been announced
    pub async fn wait_for(&self, id: JobId) -> SchedulerResult<Job> {
        loop {
            let settled = self.inner.job_settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            if !self.lock().jobs.contains_key(&id) {
                let job = self
                    .load(id)
                    .await?
                    .ok_or(SchedulerError::NotFound { job_id: id })?;
                if job.state.is_terminal() {
                    return Ok(job);
                }
            }

            settled.await;
        }
    }

    /// Fetch attempts recorded for a job
    pub async fn tasks(&self, id: JobId) -> SchedulerResult<Vec<Task>> {
        self.inner
            .services
            .store
            .tasks(id)
            .await
            .map_err(|e| SchedulerError::store_error("tasks", e.to_string()))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn the worker pool and the proxy re-probe task
    pub fn start(&self) {
        let mut handles = lock(&self.inner.handles);
        if !handles.is_empty() {
            return;
        }

        let workers = self.inner.config.engine.workers;
        for worker_id in 0..workers {
            handles.push(tokio::spawn(worker::run(self.clone(), worker_id)));
        }

        // Endpoints may be registered after start, so the loop runs on an empty pool too
        let pool = Arc::clone(&self.inner.services.pool);
        let proxy = &self.inner.config.proxy;
        let prober: Arc<dyn ProxyProber> = Arc::new(TransportProber::new(
            Arc::clone(&self.inner.services.transport),
            proxy.probe_url.clone(),
            Duration::from_secs(self.inner.config.engine.fetch_timeout_secs),
        ));
        handles.push(tokio::spawn(pool.run_reprobe_loop(
            prober,
            proxy.reprobe_interval(),
            self.inner.shutdown.subscribe(),
        )));

        tracing::info!(workers, proxies = self.inner.services.pool.len(), "Engine started");
    }

    /// Stop accepting work and wait for workers to exit
    ///
    /// Single-shot jobs in flight run to completion. Iterative jobs are
    /// requeued at their next iteration boundary and stay queued.
    pub async fn shutdown(&self) {
        self.lock().stopping = true;
        self.inner.shutdown.send_replace(true);
        self.inner.work_available.notify_waiters();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.inner.handles));
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Engine task panicked");
            }
        }
        tracing::info!(queued = self.queue_depth(), "Engine stopped");
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    // ========================================================================
    // Worker side
    // ========================================================================

    /// Pop the oldest queued job and mark it running
    pub(crate) fn claim_next(&self) -> Option<Claimed> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.stopping {
            return None;
        }

        while let Some(queued) = state.queue.pop_front() {
            let Some(live) = state.jobs.get_mut(&queued.id) else {
                continue;
            };
            match state::apply(&mut live.job, Transition::Start) {
                Ok(event) => {
                    state.busy += 1;
                    metrics::set_queue_depth(state.queue.len());
                    metrics::set_busy_workers(state.busy);
                    return Some(Claimed {
                        job: live.job.clone(),
                        cancel: live.cancel.clone(),
                        resume: queued.resume,
                        event,
                    });
                }
                Err(e) => tracing::warn!(job_id = %queued.id, error = %e, "Skipping unclaimable job"),
            }
        }
        None
    }

    /// Persist and announce a job the worker just claimed
    pub(crate) async fn announce(&self, job: &Job, event: &JobEvent) {
        self.persist(job).await;
        self.inner.services.sink.publish(event).await;
    }

    /// Record which concrete strategy a job runs with
    pub(crate) async fn record_resolution(&self, id: JobId, kind: StrategyKind) {
        let snapshot = {
            let mut state = self.lock();
            let Some(live) = state.jobs.get_mut(&id) else {
                return;
            };
            if live.job.resolved_strategy == Some(kind) {
                return;
            }
            live.job.resolved_strategy = Some(kind);
            live.job.clone()
        };
        self.persist(&snapshot).await;
    }

    /// Release a worker's job with the transition its run produced
    pub(crate) async fn finish(&self, id: JobId, transition: Transition, resume: Option<JobRuntime>) {
        {
            let mut state = self.lock();
            state.busy = state.busy.saturating_sub(1);
            metrics::set_busy_workers(state.busy);
        }

        let requeue = matches!(transition, Transition::Requeue);
        if self.settle(id, transition).await.is_none() || !requeue {
            return;
        }

        let cancelled = {
            let mut state = self.lock();
            let state = &mut *state;
            match state.jobs.get(&id) {
                Some(live) if live.cancel.is_cancelled() => true,
                Some(_) => {
                    state.queue.push_front(QueuedJob { id, resume });
                    metrics::set_queue_depth(state.queue.len());
                    false
                }
                None => false,
            }
        };

        if cancelled {
            self.settle(id, Transition::Cancel).await;
        } else {
            self.inner.work_available.notify_one();
        }
    }

    /// Apply a transition, persist it, announce it, and retire terminal jobs
    async fn settle(&self, id: JobId, transition: Transition) -> Option<Job> {
        let (snapshot, event) = {
            let mut state = self.lock();
            let live = state.jobs.get_mut(&id)?;
            match state::apply(&mut live.job, transition) {
                Ok(event) => (live.job.clone(), event),
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Transition rejected");
                    return None;
                }
            }
        };

        self.persist(&snapshot).await;
        self.inner.services.sink.publish(&event).await;

        if snapshot.state.is_terminal() {
            metrics::record_job_finished(snapshot.state.as_str());
            match &snapshot.error {
                Some(error) => tracing::warn!(job_id = %id, state = %snapshot.state, error = %error, "Job finished"),
                None => tracing::info!(job_id = %id, state = %snapshot.state, "Job finished"),
            }
            self.lock().jobs.remove(&id);
            self.inner.job_settled.notify_waiters();
        }
        Some(snapshot)
    }

    async fn persist(&self, job: &Job) {
        if let Err(e) = self.inner.services.store.save_job_state(job).await {
            tracing::error!(job_id = %job.id, state = %job.state, error = %e, "Failed to persist job state");
        }
    }

    async fn load(&self, id: JobId) -> SchedulerResult<Option<Job>> {
        self.inner
            .services
            .store
            .load_job(id)
            .await
            .map_err(|e| SchedulerError::store_error("load_job", e.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        lock(&self.inner.state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Probes banned proxies with a plain GET through the transport
pub struct TransportProber {
    transport: Arc<dyn Transport>,
    url: String,
    timeout: Duration,
}

impl TransportProber {
    pub fn new(transport: Arc<dyn Transport>, url: String, timeout: Duration) -> Self {
        Self {
            transport,
            url,
            timeout,
        }
    }
}

#[async_trait]
impl ProxyProber for TransportProber {
    async fn probe(&self, endpoint: &ProxyEndpoint) -> bool {
        let request = FetchRequest::get(&self.url, self.timeout);
        match self
            .transport
            .fetch(&request, Some(endpoint.address()), &Session::default())
            .await
        {
            Ok(page) => page.error_for_status().is_ok(),
            Err(_) => false,
        }
    }
}
