//! Job scheduling and execution
//!
//! This module owns the job lifecycle: admission, the bounded pending queue,
//! the worker pool, retries with backoff, cancellation and shutdown.
//!
//! # Architecture
//!
//! ```text
//!   submit ──▶ validate ──▶ ┌──────────────┐      ┌──────────┐
//!                           │ FIFO queue   │─────▶│ worker N │──▶ Strategy
//!   cancel ───────────────▶ │ (bounded)    │◀─────│          │    │
//!                           └──────────────┘ req. └────┬─────┘    ▼
//!                                                      │       ProxyPool
//!                                                      ▼
//!                                          JobStore ──▶ EventSink
//! ```
//!
//! # Modules
//!
//! - [`state`] - Job state machine; the only place job state changes
//! - [`engine`] - Queue, live job table, client operations and lifecycle
//! - [`worker`] - Per-job execution loop
//! - [`cancel`] - Cooperative cancellation flag
//! - [`error`] - Scheduler error types
//!
//! # Settings
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `engine.workers` | 4 | Concurrent jobs |
//! | `engine.max_pending_jobs` | 100 | Queue bound; submissions beyond it are rejected |
//! | `retry.max_retries` | 3 | Transient retries per step |
//! | `retry.base_delay_ms` | 1000 | First backoff delay, doubled per retry |

pub mod cancel;
pub mod engine;
pub mod error;
pub mod state;
mod worker;

pub use cancel::CancelFlag;
pub use engine::{Engine, EngineBuilder, TransportProber};
pub use error::{SchedulerError, SchedulerResult};
pub use state::{apply, can_transition, is_valid_path, Transition};
