//! Job state machine
//!
//! Governs a single job's lifecycle:
//!
//! ```text
//!            ┌──────────── cancel ────────────┐
//!            │                                ▼
//!   queued ──┴──▶ running ──┬──▶ completed   cancelled
//!      ▲             │      ├──▶ failed
//!      └── requeue ──┘      └──▶ cancelled
//! ```
//!
//! The machine owns no I/O. Applying a transition mutates the [`Job`] record
//! and returns the event the caller must publish.

use chrono::Utc;
use serde_json::Value;

use super::error::{SchedulerError, SchedulerResult};
use crate::models::{ErrorDescriptor, EventPayload, Job, JobEvent, JobState};

/// Check whether `from -> to` is a permitted transition
pub fn can_transition(from: JobState, to: JobState) -> bool {
    use JobState::*;
    matches!(
        (from, to),
        (Queued, Running)
            | (Queued, Cancelled)
            | (Running, Queued)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Cancelled)
    )
}

/// Requested transition with its terminal payload
#[derive(Debug, Clone)]
pub enum Transition {
    Start,
    Requeue,
    Complete(Value),
    Fail(ErrorDescriptor),
    Cancel,
}

impl Transition {
    /// Target state of the transition
    pub fn target(&self) -> JobState {
        match self {
            Self::Start => JobState::Running,
            Self::Requeue => JobState::Queued,
            Self::Complete(_) => JobState::Completed,
            Self::Fail(_) => JobState::Failed,
            Self::Cancel => JobState::Cancelled,
        }
    }
}

/// Apply a transition to a job, returning the event describing it
///
/// Terminal jobs are never mutated. A cancelled job keeps an empty result,
/// and only failed jobs carry an error descriptor.
pub fn apply(job: &mut Job, transition: Transition) -> SchedulerResult<JobEvent> {
    let from = job.state;
    let to = transition.target();

    if from.is_terminal() {
        return Err(SchedulerError::AlreadyTerminal {
            job_id: job.id,
            state: from,
        });
    }
    if !can_transition(from, to) {
        return Err(SchedulerError::InvalidTransition { from, to });
    }

    let now = Utc::now();
    let (result, error) = match transition {
        Transition::Start => {
            job.started_at.get_or_insert(now);
            (None, None)
        }
        Transition::Requeue => (None, None),
        Transition::Complete(payload) => {
            job.result = Some(payload.clone());
            job.finished_at = Some(now);
            (Some(payload), None)
        }
        Transition::Fail(descriptor) => {
            job.result = None;
            job.error = Some(descriptor.clone());
            job.finished_at = Some(now);
            (None, Some(descriptor))
        }
        Transition::Cancel => {
            job.result = None;
            job.finished_at = Some(now);
            (None, None)
        }
    };
    job.state = to;

    Ok(JobEvent::new(
        job.id,
        EventPayload::StateChanged {
            from: Some(from),
            to,
            result,
            error,
        },
    ))
}

/// Event announcing a newly queued job
pub fn submitted(job: &Job) -> JobEvent {
    JobEvent::new(
        job.id,
        EventPayload::StateChanged {
            from: None,
            to: job.state,
            result: None,
            error: None,
        },
    )
}

/// Check that a sequence of observed states forms a valid path
///
/// The path must start at `queued`, follow permitted transitions, and stop
/// at the first terminal state.
pub fn is_valid_path(states: &[JobState]) -> bool {
    let Some(first) = states.first() else {
        return true;
    };
    if *first != JobState::Queued {
        return false;
    }
    states.windows(2).all(|pair| {
        let (from, to) = (pair[0], pair[1]);
        !from.is_terminal() && can_transition(from, to)
    })
}
