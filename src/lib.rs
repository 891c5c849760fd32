//! siphon - Scraping job orchestration and multi-strategy extraction
//!
//! Clients submit extraction jobs; the engine queues them, resolves a
//! strategy, runs them on a worker pool through a health-managed proxy pool,
//! and publishes every lifecycle transition.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Jobs, tasks, strategy configuration and events
//! - [`scheduler`] - Job state machine, queue and worker pool
//! - [`strategy`] - Extraction strategies, dispatch and the HTTP transport
//! - [`crawler`] - Crawl frontier and URL scoping
//! - [`monitor`] - Change detection for streaming jobs
//! - [`proxy`] - Proxy pool with health tracking
//! - [`storage`] - Job/task persistence and credential boundaries
//! - [`notifications`] - Event sinks and webhook delivery
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use siphon::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> siphon::error::Result<()> {
//!     let engine = Engine::builder(Config::from_env()?).build()?;
//!     engine.start();
//!
//!     let spec = JobSpec::new("https://example.com", StrategyConfig::Auto);
//!     let id = engine.submit(spec).await?;
//!     let job = engine.wait_for(id).await?;
//!     println!("{} -> {}", job.id, job.state);
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod notifications;
pub mod proxy;
pub mod scheduler;
pub mod storage;
pub mod strategy;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{
        Job, JobEvent, JobId, JobSpec, JobState, StrategyConfig, StrategyKind, Task,
    };
    pub use crate::scheduler::{Engine, SchedulerError};
    pub use crate::storage::{Credentials, JobStore, MemoryJobStore};
}

// Direct re-exports for convenience
pub use models::{Job, JobId, JobSpec, JobState};
pub use scheduler::Engine;
