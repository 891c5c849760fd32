//! Sliding-window health tracking for a single proxy endpoint
//!
//! Status is recomputed after every reported outcome from the most recent
//! `window_size` attempts:
//!
//! | Success rate | Status |
//! |---|---|
//! | `>= active_threshold` | `active` |
//! | `>= warning_threshold` | `warning` |
//! | below | `banned` |
//!
//! A banned endpoint stays banned until it has collected a full fresh window
//! of probe outcomes whose rate reaches the warning threshold again.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::ProxyConfig;

/// Health-derived status of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    Active,
    Warning,
    Banned,
}

impl ProxyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Warning => "warning",
            Self::Banned => "banned",
        }
    }

    /// Check if the endpoint may serve job traffic
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Banned)
    }
}

impl std::fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported attempt through an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub success: bool,
    pub latency: Duration,
}

impl AttemptOutcome {
    pub fn success(latency: Duration) -> Self {
        Self {
            success: true,
            latency,
        }
    }

    pub fn failure(latency: Duration) -> Self {
        Self {
            success: false,
            latency,
        }
    }
}

/// Thresholds governing status transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthPolicy {
    pub window_size: usize,
    pub min_samples: usize,
    pub active_threshold: f64,
    pub warning_threshold: f64,
}

impl HealthPolicy {
    /// Status for a given success rate
    pub fn classify(&self, rate: f64) -> ProxyStatus {
        if rate >= self.active_threshold {
            ProxyStatus::Active
        } else if rate >= self.warning_threshold {
            ProxyStatus::Warning
        } else {
            ProxyStatus::Banned
        }
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for HealthPolicy {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            window_size: config.window_size.max(1),
            min_samples: config.min_samples.min(config.window_size).max(1),
            active_threshold: config.active_threshold,
            warning_threshold: config.warning_threshold,
        }
    }
}

/// Rolling health record for one endpoint
#[derive(Debug, Clone)]
pub struct HealthRecord {
    window: VecDeque<AttemptOutcome>,
    status: ProxyStatus,
    consecutive_failures: u32,
    attempts_since_ban: usize,
    total_attempts: u64,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            window: VecDeque::new(),
            status: ProxyStatus::Active,
            consecutive_failures: 0,
            attempts_since_ban: 0,
            total_attempts: 0,
        }
    }
}

impl HealthRecord {
    /// Replay an outcome sequence from a fresh record
    pub fn replay(policy: &HealthPolicy, outcomes: &[AttemptOutcome]) -> Self {
        let mut record = Self::default();
        for outcome in outcomes {
            record.record(policy, *outcome);
        }
        record
    }

    /// Add an outcome and recompute status
    pub fn record(&mut self, policy: &HealthPolicy, outcome: AttemptOutcome) -> ProxyStatus {
        self.window.push_back(outcome);
        while self.window.len() > policy.window_size {
            self.window.pop_front();
        }
        self.total_attempts += 1;
        self.consecutive_failures = if outcome.success {
            0
        } else {
            self.consecutive_failures + 1
        };

        if self.status == ProxyStatus::Banned {
            self.attempts_since_ban += 1;
            if self.attempts_since_ban >= policy.window_size {
                let recovered = policy.classify(self.success_rate());
                if recovered != ProxyStatus::Banned {
                    self.status = recovered;
                    self.attempts_since_ban = 0;
                }
            }
        } else if self.window.len() >= policy.min_samples {
            self.status = policy.classify(self.success_rate());
            if self.status == ProxyStatus::Banned {
                self.attempts_since_ban = 0;
            }
        }

        self.status
    }

    pub fn status(&self) -> ProxyStatus {
        self.status
    }

    /// Success rate over the current window (1.0 when empty)
    pub fn success_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 1.0;
        }
        let successes = self.window.iter().filter(|o| o.success).count();
        successes as f64 / self.window.len() as f64
    }

    /// Mean latency over the current window
    pub fn avg_response_time(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.window.iter().map(|o| o.latency).sum();
        total / self.window.len() as u32
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> AttemptOutcome {
        AttemptOutcome::success(Duration::from_millis(100))
    }

    fn fail() -> AttemptOutcome {
        AttemptOutcome::failure(Duration::from_millis(300))
    }

    fn policy(window_size: usize) -> HealthPolicy {
        HealthPolicy {
            window_size,
            min_samples: 3,
            active_threshold: 0.85,
            warning_threshold: 0.5,
        }
    }

    #[test]
    fn test_new_endpoint_is_active() {
        let record = HealthRecord::default();
        assert_eq!(record.status(), ProxyStatus::Active);
        assert_eq!(record.success_rate(), 1.0);
    }

    #[test]
    fn test_min_samples_guard() {
        let policy = policy(10);
        let record = HealthRecord::replay(&policy, &[fail(), fail()]);
        assert_eq!(record.status(), ProxyStatus::Active);
        assert_eq!(record.consecutive_failures(), 2);
    }

    #[test]
    fn test_classification_thresholds() {
        let policy = policy(10);
        // 9/10 success
        let mut outcomes = vec![ok(); 9];
        outcomes.push(fail());
        assert_eq!(HealthRecord::replay(&policy, &outcomes).status(), ProxyStatus::Active);

        // 6/10 success
        let outcomes: Vec<_> = (0..10).map(|i| if i < 6 { ok() } else { fail() }).collect();
        assert_eq!(HealthRecord::replay(&policy, &outcomes).status(), ProxyStatus::Warning);

        // 4/10 success
        let outcomes: Vec<_> = (0..10).map(|i| if i < 4 { ok() } else { fail() }).collect();
        assert_eq!(HealthRecord::replay(&policy, &outcomes).status(), ProxyStatus::Banned);
    }

    #[test]
    fn test_banned_requires_fresh_window() {
        let policy = policy(4);
        let mut record = HealthRecord::replay(&policy, &[fail(), fail(), fail()]);
        assert_eq!(record.status(), ProxyStatus::Banned);

        // Three successes fill most of the window but it is not yet fresh
        for _ in 0..3 {
            assert_eq!(record.record(&policy, ok()), ProxyStatus::Banned);
        }
        // Fourth probe completes a fresh window of 4/4
        assert_eq!(record.record(&policy, ok()), ProxyStatus::Active);
    }

    #[test]
    fn test_banned_stays_banned_on_poor_probes() {
        let policy = policy(4);
        let mut record = HealthRecord::replay(&policy, &[fail(), fail(), fail()]);
        for outcome in [ok(), fail(), fail(), fail()] {
            record.record(&policy, outcome);
        }
        assert_eq!(record.status(), ProxyStatus::Banned);
    }

    #[test]
    fn test_avg_response_time() {
        let policy = policy(10);
        let record = HealthRecord::replay(&policy, &[ok(), fail()]);
        assert_eq!(record.avg_response_time(), Duration::from_millis(200));
    }

    #[test]
    fn test_replay_is_deterministic() {
        let policy = policy(5);
        let outcomes = [ok(), fail(), fail(), ok(), fail(), fail(), ok(), ok(), ok()];
        let a = HealthRecord::replay(&policy, &outcomes);
        let b = HealthRecord::replay(&policy, &outcomes);
        assert_eq!(a.status(), b.status());
        assert_eq!(a.success_rate(), b.success_rate());
    }
}
