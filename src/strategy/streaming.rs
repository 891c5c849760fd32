//! Continuous monitoring of a single URL
//!
//! Polls happen on a fixed grid: `start`, `start + interval`, ... up to the
//! deadline. Each poll extracts a record, diffs it against the previous
//! snapshot and raises a change alert when the changed fraction reaches the
//! threshold. Alerts go to the event sink and, when configured, a webhook.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::extract::record_from_page;
use super::{Continuation, Outcome, Progress, StopReason, Strategy, StrategyContext};
use crate::metrics;
use crate::models::{EventPayload, StrategyKind, StreamingConfig, TaskOutcome};
use crate::monitor::StreamSnapshot;
use crate::notifications::channels::webhook::WebhookChannel;
use crate::notifications::channels::Channel;
use crate::notifications::ChangeNotification;
use crate::utils::error::{FetchError, StrategyError};

/// Iteration state of one streaming job
#[derive(Debug)]
pub struct StreamState {
    url: String,
    interval: Duration,
    started: Instant,
    deadline: Instant,
    next_tick: Instant,
    threshold: f64,
    snapshot: StreamSnapshot,
    cycles: u32,
    alerts: u32,
    failed_polls: u32,
    last_fraction: Option<f64>,
}

impl StreamState {
    pub fn new(config: &StreamingConfig, url: String, now: Instant) -> Self {
        Self {
            url,
            interval: Duration::from_secs(config.poll_interval_seconds),
            started: now,
            deadline: now + Duration::from_secs(config.max_duration_minutes * 60),
            next_tick: now,
            threshold: config.change_threshold,
            snapshot: StreamSnapshot::empty(),
            cycles: 0,
            alerts: 0,
            failed_polls: 0,
            last_fraction: None,
        }
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn alerts(&self) -> u32 {
        self.alerts
    }

    pub fn stop_reason(&self, now: Instant) -> Option<StopReason> {
        (now >= self.deadline).then_some(StopReason::DurationElapsed)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn finish(self, reason: StopReason) -> Value {
        json!({
            "url": self.url,
            "cycles": self.cycles,
            "alerts": self.alerts,
            "failed_polls": self.failed_polls,
            "last_fraction": self.last_fraction,
            "last_snapshot": self.snapshot.record(),
            "elapsed_secs": self.deadline.min(Instant::now()).duration_since(self.started).as_secs(),
            "stop_reason": reason.as_str(),
        })
    }

    pub fn summary(&self) -> Value {
        json!({
            "cycles": self.cycles,
            "alerts": self.alerts,
            "failed_polls": self.failed_polls,
            "last_fraction": self.last_fraction,
        })
    }

    /// Move the next poll to the first grid point after `now`
    fn advance(&mut self, now: Instant) {
        while self.next_tick <= now {
            self.next_tick += self.interval;
        }
    }

    fn resume_at(&self) -> Option<Instant> {
        Some(self.next_tick.min(self.deadline))
    }
}

pub struct StreamingStrategy {
    config: StreamingConfig,
    webhook: Option<Arc<WebhookChannel>>,
}

impl StreamingStrategy {
    pub fn new(config: StreamingConfig, webhook: Option<Arc<WebhookChannel>>) -> Self {
        Self { config, webhook }
    }

    async fn poll(&self, ctx: &mut StrategyContext, state: &mut StreamState) -> Outcome {
        if Instant::now() < state.next_tick {
            return Outcome::Continue(Continuation {
                resume_at: state.resume_at(),
                progress: state.summary(),
            });
        }

        let url = state.url.clone();
        let fetched = match tokio::time::timeout_at(state.deadline, ctx.get(&url)).await {
            Ok(fetched) => fetched,
            Err(_) => {
                tracing::info!(job_id = %ctx.job_id, url = %url, "Poll abandoned at deadline");
                ctx.record_task(&url, TaskOutcome::Skip).await;
                return Outcome::Continue(Continuation::now(state.summary()));
            }
        };
        let record = match fetched {
            Ok(page) => {
                ctx.record_task(&url, TaskOutcome::Success).await;
                record_from_page(&page, ctx.schema.as_ref())
            }
            Err(FetchError::Cancelled) => return Outcome::Failed(FetchError::Cancelled.into()),
            Err(e) if e.is_transient() => {
                ctx.record_task(&url, TaskOutcome::Fail).await;
                return Outcome::Failed(e.into());
            }
            Err(e) => {
                ctx.record_task(&url, TaskOutcome::Fail).await;
                Err(StrategyError::from(e))
            }
        };

        match record {
            Ok(record) => {
                let report = state.snapshot.observe(record);
                state.cycles += 1;
                state.last_fraction = Some(report.fraction);

                if report.exceeds(state.threshold) {
                    state.alerts += 1;
                    metrics::record_change_alert();
                    tracing::info!(
                        job_id = %ctx.job_id,
                        url = %url,
                        cycle = state.cycles,
                        fraction = report.fraction,
                        "Change detected"
                    );

                    let snapshot = state.snapshot.record().clone();
                    ctx.publish(EventPayload::ChangeAlert {
                        cycle: state.cycles,
                        fraction: report.fraction,
                        changed_fields: report.changed_fields.clone(),
                        snapshot: snapshot.clone(),
                    })
                    .await;

                    if let Some(webhook) = &self.webhook {
                        let notification = ChangeNotification {
                            job_id: ctx.job_id,
                            url: url.clone(),
                            cycle: state.cycles,
                            fraction: report.fraction,
                            changed_fields: report.changed_fields,
                            snapshot,
                            detected_at: Utc::now(),
                        };
                        let webhook = Arc::clone(webhook);
                        tokio::spawn(async move {
                            let status = webhook.send(&notification).await;
                            if !status.success {
                                tracing::warn!(job_id = %notification.job_id, status = %status, "Webhook delivery failed");
                            }
                        });
                    }
                }
            }
            Err(e) => {
                state.failed_polls += 1;
                tracing::info!(job_id = %ctx.job_id, url = %url, error = %e, "Poll failed");
            }
        }

        state.advance(Instant::now());
        Outcome::Continue(Continuation {
            resume_at: state.resume_at(),
            progress: state.summary(),
        })
    }
}

#[async_trait]
impl Strategy for StreamingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Streaming
    }

    async fn execute(&self, ctx: &mut StrategyContext) -> Outcome {
        let mut state = match std::mem::take(&mut ctx.progress) {
            Progress::Stream(state) => state,
            _ => {
                let url = ctx.primary_url().unwrap_or_default().to_string();
                Box::new(StreamState::new(&self.config, url, Instant::now()))
            }
        };
        let outcome = self.poll(ctx, &mut state).await;
        ctx.progress = Progress::Stream(state);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(poll: u64, minutes: u64) -> StreamingConfig {
        StreamingConfig {
            poll_interval_seconds: poll,
            max_duration_minutes: minutes,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_and_grid() {
        let start = Instant::now();
        let mut state = StreamState::new(&config(10, 1), "https://example.com".into(), start);

        assert_eq!(state.stop_reason(start), None);
        assert_eq!(state.resume_at(), Some(start));

        state.advance(start);
        assert_eq!(state.next_tick, start + Duration::from_secs(10));

        // A slow poll skips missed grid points rather than bunching up
        state.advance(start + Duration::from_secs(35));
        assert_eq!(state.next_tick, start + Duration::from_secs(40));

        state.advance(start + Duration::from_secs(55));
        assert_eq!(state.resume_at(), Some(start + Duration::from_secs(60)));
        assert_eq!(
            state.stop_reason(start + Duration::from_secs(60)),
            Some(StopReason::DurationElapsed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_payload() {
        let start = Instant::now();
        let mut state = StreamState::new(&config(10, 1), "https://example.com".into(), start);
        state.snapshot.observe(json!({"price": "1"}));
        state.cycles = 1;

        let payload = state.finish(StopReason::DurationElapsed);
        assert_eq!(payload["cycles"], 1);
        assert_eq!(payload["last_snapshot"]["price"], "1");
        assert_eq!(payload["stop_reason"], "duration_elapsed");
    }
}
