//! Retry policies for collaborator failures.
//!
//! A resource may ask for a retry budget (`retries`). Only
//! `UpstreamCollaborator` errors consume it; validation, render and
//! verification errors fail on the first attempt.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::config::{BackoffStrategy, RunSettings};
use crate::types::resource::{Action, ResourceId};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// How many times an action may be retried and how long to wait between
/// attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, strategy: BackoffStrategy, base_delay_ms: u64) -> Self {
        RetryPolicy {
            max_retries,
            strategy,
            base_delay_ms,
        }
    }

    pub fn from_settings(settings: &RunSettings) -> Self {
        RetryPolicy::new(
            settings.retries,
            settings.backoff_strategy.clone(),
            settings.retry_delay_ms,
        )
    }

    /// Same strategy, different budget. Used when a resource overrides the
    /// run-wide retry count.
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            ..self.clone()
        }
    }

    /// Whether the given retry number (0-indexed) is within the budget.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before the given retry. Retry 0 follows the initial failure.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay_ms,
            BackoffStrategy::Linear => self.base_delay_ms * (attempt as u64 + 1),
            BackoffStrategy::Exponential => self.base_delay_ms * 2u64.saturating_pow(attempt),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}

impl Default for RetryPolicy {
    /// No retries: a failed collaborator call fails the resource.
    fn default() -> Self {
        RetryPolicy {
            max_retries: 0,
            strategy: BackoffStrategy::Fixed,
            base_delay_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryTracker
// ---------------------------------------------------------------------------

/// Counts retries spent per `(resource, action)` over a run so the report
/// can show them.
#[derive(Debug, Clone, Default)]
pub struct RetryTracker {
    retries: HashMap<(ResourceId, Action), u32>,
}

impl RetryTracker {
    pub fn new() -> Self {
        RetryTracker::default()
    }

    pub fn record_retry(&mut self, id: &ResourceId, action: Action) {
        *self.retries.entry((id.clone(), action)).or_insert(0) += 1;
    }

    pub fn total(&self) -> u32 {
        self.retries.values().sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::resource::ResourceKind;

    #[test]
    fn default_policy_never_retries() {
        let p = RetryPolicy::default();
        assert!(!p.should_retry(0));
    }

    #[test]
    fn should_retry_within_budget() {
        let p = RetryPolicy::new(3, BackoffStrategy::Fixed, 100);
        assert!(p.should_retry(0));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
    }

    #[test]
    fn linear_delay() {
        let p = RetryPolicy::new(5, BackoffStrategy::Linear, 1000);
        assert_eq!(p.delay_ms(0), 1000);
        assert_eq!(p.delay_ms(2), 3000);
    }

    #[test]
    fn exponential_delay() {
        let p = RetryPolicy::new(5, BackoffStrategy::Exponential, 1000);
        assert_eq!(p.delay_ms(0), 1000);
        assert_eq!(p.delay_ms(3), 8000);
    }

    #[test]
    fn policy_from_settings() {
        let settings = RunSettings {
            retries: 4,
            retry_delay_ms: 250,
            ..RunSettings::default()
        };
        let p = RetryPolicy::from_settings(&settings);
        assert_eq!(p.max_retries, 4);
        assert_eq!(p.delay_ms(1), 250);
        assert_eq!(p.with_max_retries(1).max_retries, 1);
    }

    #[test]
    fn tracker_sums_every_action() {
        let id = ResourceId::new(ResourceKind::Package, "hbase");
        let mut tracker = RetryTracker::new();
        assert_eq!(tracker.total(), 0);
        tracker.record_retry(&id, Action::Install);
        tracker.record_retry(&id, Action::Install);
        tracker.record_retry(&id, Action::Remove);
        assert_eq!(tracker.total(), 3);
    }
}
