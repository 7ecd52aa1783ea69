// src/plan/summary.rs

use std::collections::BTreeSet;

use serde::Serialize;

use crate::plan::model::TaskPlan;
use crate::plan::status::{PhaseStatus, PlanStatus};

/// Caller-facing roll-up of a plan's execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub plan_id: String,
    pub status: PlanStatus,
    pub total_phases: usize,
    pub phases_completed: usize,
    pub phases_failed: usize,
    pub phases_skipped: usize,
    pub phases_pending: usize,
    pub tokens_used: u64,
    /// Distinct files touched by any phase, sorted.
    pub files_modified: Vec<String>,
    /// Wall time between plan start and completion, when both are known.
    pub duration_ms: Option<u64>,
    /// Error of the phase that failed the plan, if any.
    pub failure: Option<String>,
}

impl TaskPlan {
    pub fn summary(&self) -> PlanSummary {
        let files: BTreeSet<&str> = self
            .phases
            .iter()
            .flat_map(|p| p.files_modified.iter().map(String::as_str))
            .collect();

        let duration_ms = match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => end
                .signed_duration_since(start)
                .to_std()
                .ok()
                .map(|d| d.as_millis() as u64),
            _ => None,
        };

        PlanSummary {
            plan_id: self.id.clone(),
            status: self.status,
            total_phases: self.phases.len(),
            phases_completed: self.phases_completed,
            phases_failed: self.phases_failed,
            phases_skipped: self.phases_skipped,
            phases_pending: self
                .phases
                .iter()
                .filter(|p| p.status.is_waiting())
                .count(),
            tokens_used: self.phases.iter().map(|p| p.tokens_used).sum(),
            files_modified: files.into_iter().map(str::to_string).collect(),
            duration_ms,
            failure: self
                .phases
                .iter()
                .find(|p| p.status == PhaseStatus::Failed)
                .and_then(|p| p.error.clone()),
        }
    }
}
