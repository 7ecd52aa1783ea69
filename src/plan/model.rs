// src/plan/model.rs

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dag::TaskId;
use crate::errors::{PhasedagError, Result};
use crate::plan::dates;
use crate::plan::options::ExecutionOptions;
use crate::plan::phase::{PhaseReport, TaskPhase};
use crate::plan::status::{FallbackStrategy, PhaseStatus, PlanStatus};

/// What the fallback policy decided for a failed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The phase is back in `Queued` for another attempt.
    Retry { attempt: u32 },
    /// The phase was skipped, along with any downstream phases listed.
    Skipped { cascaded: Vec<TaskId> },
    /// The phase stays `Failed` and the plan has failed.
    Aborted { retries_exhausted: bool },
}

/// Aggregate root: a multi-phase plan and its lifecycle.
///
/// No internal locking; a plan must be mutated from one execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub phases: Vec<TaskPhase>,
    pub status: PlanStatus,
    #[serde(default)]
    pub current_phase_index: usize,
    #[serde(default)]
    pub phases_completed: usize,
    #[serde(default)]
    pub phases_failed: usize,
    #[serde(default)]
    pub phases_skipped: usize,
    #[serde(deserialize_with = "dates::datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "dates::datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "dates::opt_datetime", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "dates::opt_datetime", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Checkpoint taken before the first phase ran, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_checkpoint_id: Option<String>,
}

impl TaskPlan {
    pub fn new(id: impl Into<String>, title: impl Into<String>, phases: Vec<TaskPhase>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            phases,
            status: PlanStatus::Created,
            current_phase_index: 0,
            phases_completed: 0,
            phases_failed: 0,
            phases_skipped: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            initial_checkpoint_id: None,
        }
    }

    pub fn phase(&self, id: &str) -> Option<&TaskPhase> {
        self.phases.iter().find(|p| p.id == id)
    }

    fn phase_mut(&mut self, id: &str) -> Result<&mut TaskPhase> {
        self.phases
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| PhasedagError::PhaseNotFound(id.to_string()))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ----- plan transitions -------------------------------------------------

    fn transition(&mut self, expected: &[PlanStatus], next: PlanStatus) -> Result<()> {
        if !expected.contains(&self.status) || !self.status.can_transition_to(next) {
            return Err(PhasedagError::InvalidPlanTransition {
                plan_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        debug!(plan = %self.id, from = ?self.status, to = ?next, "plan transition");
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn approve(&mut self) -> Result<()> {
        self.transition(&[PlanStatus::Created], PlanStatus::Approved)
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(&[PlanStatus::Approved], PlanStatus::Executing)?;
        self.started_at.get_or_insert(self.updated_at);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.transition(&[PlanStatus::Executing], PlanStatus::Paused)
    }

    pub fn resume(&mut self) -> Result<()> {
        self.transition(&[PlanStatus::Paused], PlanStatus::Executing)
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(&[PlanStatus::Executing], PlanStatus::Completed)?;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self) -> Result<()> {
        self.transition(&[PlanStatus::Executing], PlanStatus::Failed)?;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Manual retry of a failed plan: failed phases go back to `Pending`
    /// with a fresh retry budget and the plan resumes executing.
    pub fn retry(&mut self) -> Result<()> {
        self.transition(&[PlanStatus::Failed], PlanStatus::Executing)?;
        let mut reset = 0;
        for phase in &mut self.phases {
            if phase.status == PhaseStatus::Failed {
                phase.status = PhaseStatus::Pending;
                phase.retry_count = 0;
                phase.error = None;
                reset += 1;
            }
        }
        self.phases_failed = self.phases_failed.saturating_sub(reset);
        self.completed_at = None;
        info!(plan = %self.id, reset, "retrying failed plan");
        Ok(())
    }

    pub fn abandon(&mut self) -> Result<()> {
        self.transition(
            &[
                PlanStatus::Created,
                PlanStatus::Approved,
                PlanStatus::Paused,
                PlanStatus::Failed,
            ],
            PlanStatus::Abandoned,
        )?;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Abandon the plan if it is idle and has not changed for `max_age`.
    ///
    /// Returns `true` if the plan was abandoned by this call.
    pub fn abandon_if_stale(&mut self, now: DateTime<Utc>, max_age: Duration) -> Result<bool> {
        if !self.status.can_transition_to(PlanStatus::Abandoned) {
            return Ok(false);
        }
        if now.signed_duration_since(self.updated_at) <= max_age {
            return Ok(false);
        }
        warn!(plan = %self.id, status = ?self.status, "abandoning stale plan");
        self.abandon()?;
        Ok(true)
    }

    // ----- phase transitions ------------------------------------------------

    fn set_phase_status(&mut self, id: &str, next: PhaseStatus) -> Result<()> {
        let phase = self.phase_mut(id)?;
        if !phase.status.can_transition_to(next) {
            return Err(PhasedagError::InvalidPhaseTransition {
                phase_id: phase.id.clone(),
                from: phase.status,
                to: next,
            });
        }
        debug!(phase = %id, from = ?phase.status, to = ?next, "phase transition");
        phase.status = next;
        self.touch();
        Ok(())
    }

    /// Record the external approval signal.
    pub fn approve_phase(&mut self, id: &str) -> Result<()> {
        self.set_phase_status(id, PhaseStatus::Approved)
    }

    /// Queue a phase. A phase that requires approval must be `Approved`
    /// first.
    pub fn queue_phase(&mut self, id: &str) -> Result<()> {
        let phase = self.phase_mut(id)?;
        if phase.requires_approval && phase.status == PhaseStatus::Pending {
            return Err(PhasedagError::ApprovalRequired(id.to_string()));
        }
        self.set_phase_status(id, PhaseStatus::Queued)
    }

    /// Phase attempts start and fail only inside an executing plan.
    fn ensure_executing(&self) -> Result<()> {
        if self.status != PlanStatus::Executing {
            return Err(PhasedagError::PlanNotExecuting {
                plan_id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    pub fn start_phase(&mut self, id: &str) -> Result<()> {
        self.ensure_executing()?;
        self.set_phase_status(id, PhaseStatus::Executing)?;
        let now = self.updated_at;
        let phase = self.phase_mut(id)?;
        phase.started_at = Some(now);
        let index = phase.index;
        self.current_phase_index = index;
        Ok(())
    }

    pub fn complete_phase(&mut self, id: &str, report: PhaseReport) -> Result<()> {
        self.set_phase_status(id, PhaseStatus::Completed)?;
        let now = self.updated_at;
        let phase = self.phase_mut(id)?;
        record_report(phase, report, now);
        self.phases_completed += 1;
        Ok(())
    }

    /// Route a failed attempt through the phase's fallback strategy.
    pub fn fail_phase(
        &mut self,
        id: &str,
        report: PhaseReport,
        options: &ExecutionOptions,
    ) -> Result<FailureOutcome> {
        self.ensure_executing()?;
        self.set_phase_status(id, PhaseStatus::Failed)?;
        let now = self.updated_at;
        let phase = self.phase_mut(id)?;
        record_report(phase, report, now);

        let strategy = phase.fallback_strategy;
        match strategy {
            FallbackStrategy::Retry => {
                phase.retry_count += 1;
                let attempt = phase.retry_count;
                if attempt < phase.max_retries {
                    warn!(phase = %id, attempt, max = phase.max_retries, "phase failed; retrying");
                    self.set_phase_status(id, PhaseStatus::Queued)?;
                    Ok(FailureOutcome::Retry { attempt })
                } else {
                    warn!(phase = %id, attempt, "phase failed; retries exhausted");
                    self.abort_on(id, true)
                }
            }
            FallbackStrategy::Skip => {
                warn!(phase = %id, "phase failed; skipping");
                self.set_phase_status(id, PhaseStatus::Skipped)?;
                self.phases_skipped += 1;
                let cascaded = self.cascade_skip(id, options);
                Ok(FailureOutcome::Skipped { cascaded })
            }
            FallbackStrategy::Abort => self.abort_on(id, false),
        }
    }

    /// Record a failed attempt that finished after the plan was already
    /// aborted. No fallback applies; the phase just stays `Failed`.
    pub fn record_failed_attempt(&mut self, id: &str, report: PhaseReport) -> Result<()> {
        self.set_phase_status(id, PhaseStatus::Failed)?;
        let now = self.updated_at;
        record_report(self.phase_mut(id)?, report, now);
        self.phases_failed += 1;
        Ok(())
    }

    fn abort_on(&mut self, id: &str, retries_exhausted: bool) -> Result<FailureOutcome> {
        self.phases_failed += 1;
        self.fail()?;
        warn!(plan = %self.id, phase = %id, "phase failure aborted the plan");
        Ok(FailureOutcome::Aborted { retries_exhausted })
    }

    /// Explicit user skip. Returns the downstream phases skipped with it.
    pub fn skip_phase(&mut self, id: &str, options: &ExecutionOptions) -> Result<Vec<TaskId>> {
        self.set_phase_status(id, PhaseStatus::Skipped)?;
        self.phases_skipped += 1;
        Ok(self.cascade_skip(id, options))
    }

    pub fn cancel_phase(&mut self, id: &str) -> Result<()> {
        self.set_phase_status(id, PhaseStatus::Cancelled)
    }

    /// Link the checkpoint taken before `id` ran.
    pub fn set_phase_checkpoint(&mut self, id: &str, checkpoint_id: impl Into<String>) -> Result<()> {
        self.phase_mut(id)?.checkpoint_id = Some(checkpoint_id.into());
        self.touch();
        Ok(())
    }

    /// Skip every waiting phase downstream of `id`, unless skipped phases
    /// count as satisfied dependencies.
    fn cascade_skip(&mut self, id: &str, options: &ExecutionOptions) -> Vec<TaskId> {
        if options.treat_skipped_as_satisfied {
            return Vec::new();
        }

        let mut cascaded = Vec::new();
        let mut seen: HashSet<TaskId> = HashSet::new();
        let mut queue: VecDeque<TaskId> = VecDeque::from([id.to_string()]);

        while let Some(current) = queue.pop_front() {
            for phase in &mut self.phases {
                if !phase.dependencies.contains(&current) || !seen.insert(phase.id.clone()) {
                    continue;
                }
                if phase.status.is_waiting() {
                    phase.status = PhaseStatus::Skipped;
                    self.phases_skipped += 1;
                    cascaded.push(phase.id.clone());
                    queue.push_back(phase.id.clone());
                }
            }
        }

        if !cascaded.is_empty() {
            info!(phase = %id, ?cascaded, "skipped dependent phases");
            self.touch();
        }
        cascaded
    }

    // ----- queries ----------------------------------------------------------

    /// Whether every dependency of `phase` has finished in a way that lets
    /// it run.
    pub fn dependencies_satisfied(&self, phase: &TaskPhase, options: &ExecutionOptions) -> bool {
        phase.dependencies.iter().all(|dep| match self.phase(dep) {
            Some(d) => match d.status {
                PhaseStatus::Completed => true,
                PhaseStatus::Skipped => options.treat_skipped_as_satisfied,
                _ => false,
            },
            None => false,
        })
    }

    /// Waiting phases whose dependencies are satisfied.
    pub fn eligible_phases(&self, options: &ExecutionOptions) -> Vec<&TaskPhase> {
        self.phases
            .iter()
            .filter(|p| p.status.is_waiting() && self.dependencies_satisfied(p, options))
            .collect()
    }

    pub fn current_phase(&self) -> Option<&TaskPhase> {
        self.phases.iter().find(|p| p.index == self.current_phase_index)
    }

    /// All phases settled without any failure left standing.
    pub fn all_phases_done(&self) -> bool {
        self.phases.iter().all(|p| {
            matches!(
                p.status,
                PhaseStatus::Completed | PhaseStatus::Skipped | PhaseStatus::Cancelled
            )
        })
    }
}

fn record_report(phase: &mut TaskPhase, report: PhaseReport, now: DateTime<Utc>) {
    phase.completed_at = Some(now);
    phase.duration_ms = phase
        .started_at
        .and_then(|s| now.signed_duration_since(s).to_std().ok())
        .map(|d| d.as_millis() as u64);
    phase.tokens_used += report.tokens_used;
    for file in report.files_modified {
        if !phase.files_modified.contains(&file) {
            phase.files_modified.push(file);
        }
    }
    phase.error = report.error;
    if report.output.is_some() {
        phase.output = report.output;
    }
}
