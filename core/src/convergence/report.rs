//! Per-resource results and the run summary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConvergeError, ErrorKind};
use crate::types::resource::{Action, ResourceId};

pub const SKIP_GUARD: &str = "guard";
pub const SKIP_ABORTED: &str = "run aborted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Unchanged,
    Updated,
    Failed,
    Skipped { reason: String },
}

impl Status {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Status::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Status::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unchanged => f.write_str("unchanged"),
            Status::Updated => f.write_str("updated"),
            Status::Failed => f.write_str("failed"),
            Status::Skipped { reason } => write!(f, "skipped ({})", reason),
        }
    }
}

/// Outcome of one action on one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResult {
    pub id: ResourceId,
    pub action: Action,
    #[serde(flatten)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Source of the notification that requested this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<ResourceId>,
    #[serde(default)]
    pub retries: u32,
}

impl ResourceResult {
    pub fn new(id: ResourceId, action: Action, status: Status) -> Self {
        ResourceResult {
            id,
            action,
            status,
            changes: Vec::new(),
            warnings: Vec::new(),
            error_kind: None,
            message: None,
            triggered_by: None,
            retries: 0,
        }
    }

    pub fn failed(id: ResourceId, action: Action, err: &ConvergeError) -> Self {
        ResourceResult {
            error_kind: Some(err.kind()),
            message: Some(err.to_string()),
            ..ResourceResult::new(id, action, Status::Failed)
        }
    }

    /// A notified action whose source failed.
    pub fn upstream_failed(id: ResourceId, action: Action, upstream: &ResourceId) -> Self {
        let err = ConvergeError::SkippedDueToUpstreamFailure {
            upstream: upstream.clone(),
        };
        ResourceResult {
            error_kind: Some(err.kind()),
            message: Some(err.to_string()),
            triggered_by: Some(upstream.clone()),
            ..ResourceResult::new(id, action, Status::skipped("upstream failure"))
        }
    }

    pub fn triggered_by(mut self, source: Option<&ResourceId>) -> Self {
        self.triggered_by = source.cloned();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub examined: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_results(results: &[ResourceResult]) -> Self {
        let mut s = RunSummary {
            examined: results.len(),
            ..RunSummary::default()
        };
        for r in results {
            match r.status {
                Status::Unchanged => s.unchanged += 1,
                Status::Updated => s.updated += 1,
                Status::Failed => s.failed += 1,
                Status::Skipped { .. } => s.skipped += 1,
            }
        }
        s
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} examined: {} updated, {} unchanged, {} failed, {} skipped",
            self.examined, self.updated, self.unchanged, self.failed, self.skipped
        )
    }
}

/// Everything a run did, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub why_run: bool,
    pub summary: RunSummary,
    pub results: Vec<ResourceResult>,
    pub retries: u32,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(why_run: bool, results: Vec<ResourceResult>, retries: u32, duration_ms: u64) -> Self {
        RunReport {
            why_run,
            summary: RunSummary::from_results(&results),
            results,
            retries,
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.summary.failed == 0
    }

    /// Results for one resource, in execution order.
    pub fn results_for(&self, id: &ResourceId) -> Vec<&ResourceResult> {
        self.results.iter().filter(|r| &r.id == id).collect()
    }

    /// The first result for `(id, action)`.
    pub fn result(&self, id: &ResourceId, action: Action) -> Option<&ResourceResult> {
        self.results
            .iter()
            .find(|r| &r.id == id && r.action == action)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResourceResult> {
        self.results.iter().filter(|r| r.status.is_failed())
    }

    pub fn to_json(&self) -> Result<String, ConvergeError> {
        serde_json::to_string_pretty(self).map_err(|e| ConvergeError::Settings(e.to_string()))
    }
}
