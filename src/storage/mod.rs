//! Persistence and credential boundaries
//!
//! The engine treats persistence as an append/update-only ledger: job records
//! are inserted once and updated on every transition, tasks are appended, and
//! nothing is ever deleted. Raw secrets are resolved per job from a
//! [`CredentialStore`] and never written back.
//!
//! [`MemoryJobStore`] and [`StaticCredentialStore`] are in-process
//! implementations used by the CLI and the test suite.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::models::{Job, JobId, Task};
use crate::utils::error::CredentialError;

/// Persistence boundary failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A record with this id already exists
    #[error("Job already exists: {0}")]
    Conflict(JobId),

    /// Update for a job that was never inserted
    #[error("Job not found: {0}")]
    Missing(JobId),

    /// Backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Job and task persistence consumed by the engine
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create the record for a newly accepted job
    async fn insert_job(&self, job: &Job) -> StoreResult<()>;

    /// Load a job record
    async fn load_job(&self, id: JobId) -> StoreResult<Option<Job>>;

    /// Persist the job's current state, timestamps, result and error
    async fn save_job_state(&self, job: &Job) -> StoreResult<()>;

    /// Append one fetch attempt to the job's task ledger
    async fn append_task(&self, job_id: JobId, task: Task) -> StoreResult<()>;

    /// Tasks recorded for a job, in append order
    async fn tasks(&self, job_id: JobId) -> StoreResult<Vec<Task>>;
}

/// In-process job store
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    tasks: Mutex<HashMap<JobId, Vec<Task>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of job records
    pub fn job_count(&self) -> usize {
        lock(&self.jobs).len()
    }

    /// All job records
    pub fn jobs(&self) -> Vec<Job> {
        lock(&self.jobs).values().cloned().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: &Job) -> StoreResult<()> {
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_job(&self, id: JobId) -> StoreResult<Option<Job>> {
        Ok(lock(&self.jobs).get(&id).cloned())
    }

    async fn save_job_state(&self, job: &Job) -> StoreResult<()> {
        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(&job.id) {
            Some(record) => {
                *record = job.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(job.id)),
        }
    }

    async fn append_task(&self, job_id: JobId, task: Task) -> StoreResult<()> {
        lock(&self.tasks).entry(job_id).or_default().push(task);
        Ok(())
    }

    async fn tasks(&self, job_id: JobId) -> StoreResult<Vec<Task>> {
        Ok(lock(&self.tasks).get(&job_id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Secrets for the auth pre-step
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Cookies injected verbatim
    Cookies { cookies: BTreeMap<String, String> },
    /// Form login credentials
    UsernamePassword { username: String, password: String },
    /// Bearer token
    Token { token: String },
}

impl Credentials {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cookies { .. } => "cookies",
            Self::UsernamePassword { .. } => "username/password",
            Self::Token { .. } => "token",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cookies { cookies } => f
                .debug_struct("Cookies")
                .field("names", &cookies.keys().collect::<Vec<_>>())
                .finish(),
            Self::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Token { .. } => f.debug_struct("Token").field("token", &"<redacted>").finish(),
        }
    }
}

/// Credential boundary consumed by the auth strategy
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn resolve_credentials(&self, job_id: JobId) -> Result<Credentials, CredentialError>;
}

/// Credentials held in memory, with an optional fallback for all jobs
#[derive(Debug, Default)]
pub struct StaticCredentialStore {
    default: Option<Credentials>,
    per_job: Mutex<HashMap<JobId, Credentials>>,
}

impl StaticCredentialStore {
    /// Store with no credentials
    pub fn empty() -> Self {
        Self::default()
    }

    /// Store returning `credentials` for every job
    pub fn with_default(credentials: Credentials) -> Self {
        Self {
            default: Some(credentials),
            per_job: Mutex::new(HashMap::new()),
        }
    }

    /// Set credentials for one job
    pub fn insert(&self, job_id: JobId, credentials: Credentials) {
        lock(&self.per_job).insert(job_id, credentials);
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn resolve_credentials(&self, job_id: JobId) -> Result<Credentials, CredentialError> {
        if let Some(credentials) = lock(&self.per_job).get(&job_id) {
            return Ok(credentials.clone());
        }
        self.default.clone().ok_or(CredentialError::Missing)
    }
}
