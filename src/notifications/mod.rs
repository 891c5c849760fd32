//! Event sinks and outbound notifications
//!
//! The engine publishes every job event to an [`EventSink`]. Sinks fan events
//! out to whatever subscribes (realtime streams, logs, test recorders). Change
//! alerts from streaming monitors can additionally be pushed to external
//! [`channels`] such as webhooks.
//!
//! ```text
//!   worker ──publish──▶ FanoutSink ──┬──▶ BroadcastSink ──▶ subscribers
//!                                    ├──▶ LogSink
//!                                    └──▶ RecordingSink
//! ```

pub mod channels;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::models::{JobEvent, JobId, JobState};

/// Consumer of job events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one event; sinks handle their own delivery failures
    async fn publish(&self, event: &JobEvent);
}

/// Realtime fan-out to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<JobEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn publish(&self, event: &JobEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event.clone());
    }
}

/// Writes every event to the tracing pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn publish(&self, event: &JobEvent) {
        match event.transition() {
            Some((from, to)) => tracing::info!(
                job_id = %event.job_id,
                from = from.map(|s| s.as_str()).unwrap_or("none"),
                to = %to,
                "Job state changed"
            ),
            None => tracing::debug!(
                job_id = %event.job_id,
                event_type = event.event_type(),
                "Job event"
            ),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.lock().clone()
    }

    /// Events for one job, in publish order
    pub fn events_for(&self, job_id: JobId) -> Vec<JobEvent> {
        self.lock()
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }

    /// State sequence observed for one job, starting with the submission state
    pub fn states_for(&self, job_id: JobId) -> Vec<JobState> {
        self.events_for(job_id)
            .iter()
            .filter_map(|e| e.transition().map(|(_, to)| to))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JobEvent>> {
        self.events.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &JobEvent) {
        self.lock().push(event.clone());
    }
}

/// Publishes to several sinks in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn publish(&self, event: &JobEvent) {
        for sink in &self.sinks {
            sink.publish(event).await;
        }
    }
}

/// Payload delivered to external channels when a monitor detects change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub job_id: JobId,
    pub url: String,
    pub cycle: u32,
    pub fraction: f64,
    pub changed_fields: Vec<String>,
    pub snapshot: Value,
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventPayload;

    fn state_event(job_id: JobId, from: Option<JobState>, to: JobState) -> JobEvent {
        JobEvent::new(
            job_id,
            EventPayload::StateChanged {
                from,
                to,
                result: None,
                error: None,
            },
        )
    }

    #[tokio::test]
    async fn test_recording_sink_states() {
        let sink = RecordingSink::new();
        let id = JobId::new();
        sink.publish(&state_event(id, None, JobState::Queued)).await;
        sink.publish(&state_event(JobId::new(), None, JobState::Queued)).await;
        sink.publish(&state_event(id, Some(JobState::Queued), JobState::Running)).await;

        assert_eq!(sink.states_for(id), vec![JobState::Queued, JobState::Running]);
        assert_eq!(sink.events().len(), 3);
    }

    #[tokio::test]
    async fn test_broadcast_sink() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        let id = JobId::new();
        sink.publish(&state_event(id, None, JobState::Queued)).await;
        assert_eq!(rx.recv().await.unwrap().job_id, id);
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let a = Arc::new(RecordingSink::new());
        let b = Arc::new(RecordingSink::new());
        let fanout = FanoutSink::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(LogSink));
        fanout
            .publish(&state_event(JobId::new(), None, JobState::Queued))
            .await;
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }
}
