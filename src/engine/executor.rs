// src/engine/executor.rs

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::dag::{DependencyResolver, TaskId};
use crate::errors::{PhasedagError, Result};
use crate::plan::{
    ExecutionOptions, FailureOutcome, PhaseReport, PhaseStatus, PlanStatus, PlanSummary,
    RiskLevel, TaskPhase, TaskPlan,
};

use super::backend::{ApprovalGate, AutoApprove, PhaseRunner, SnapshotSource};

/// Cooperative pause request, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn request_pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives a [`TaskPlan`] batch by batch.
///
/// Batches come from the dependency resolver. Inside a batch, phases marked
/// `can_run_in_parallel` run together, never more than
/// `max_parallel_phases` at once; the rest run one at a time afterwards.
/// Failures are routed through each phase's fallback strategy.
pub struct PlanExecutor {
    runner: Arc<dyn PhaseRunner>,
    approvals: Arc<dyn ApprovalGate>,
    checkpoints: Option<(Arc<CheckpointStore>, Arc<dyn SnapshotSource>)>,
    options: ExecutionOptions,
    resolver: DependencyResolver,
    pause: PauseHandle,
}

impl fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("options", &self.options)
            .field("checkpoints", &self.checkpoints.is_some())
            .finish_non_exhaustive()
    }
}

/// How the current batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchEnd {
    Continue,
    Aborted,
}

impl PlanExecutor {
    pub fn new(runner: Arc<dyn PhaseRunner>, options: ExecutionOptions) -> Self {
        Self {
            runner,
            approvals: Arc::new(AutoApprove),
            checkpoints: None,
            options,
            resolver: DependencyResolver::new(),
            pause: PauseHandle::default(),
        }
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approvals = gate;
        self
    }

    pub fn with_checkpoints(
        mut self,
        store: Arc<CheckpointStore>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        self.checkpoints = Some((store, source));
        self
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Share a pause flag created elsewhere, e.g. by a signal handler.
    pub fn with_pause_handle(mut self, pause: PauseHandle) -> Self {
        self.pause = pause;
        self
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    /// Run `plan` until it completes, fails, or a pause is requested.
    ///
    /// Accepts a plan that is `Approved` (fresh start), `Paused` (resume),
    /// `Failed` (manual retry of the failed phases) or `Executing` (a run
    /// that was interrupted; phases caught mid-attempt count as failed
    /// attempts). Finished plans are returned as they are.
    pub async fn execute(&self, plan: &mut TaskPlan) -> Result<PlanSummary> {
        match plan.status {
            PlanStatus::Approved => plan.start()?,
            PlanStatus::Paused => plan.resume()?,
            PlanStatus::Failed => plan.retry()?,
            PlanStatus::Executing => self.recover_interrupted(plan)?,
            PlanStatus::Completed | PlanStatus::Abandoned => return Ok(plan.summary()),
            PlanStatus::Created => {
                return Err(PhasedagError::InvalidPlanTransition {
                    plan_id: plan.id.clone(),
                    from: plan.status,
                    to: PlanStatus::Executing,
                });
            }
        }
        self.pause.clear();
        info!(plan = %plan.id, phases = plan.phases.len(), "executing plan");

        if plan.status != PlanStatus::Executing {
            return Ok(plan.summary());
        }

        if plan.initial_checkpoint_id.is_none() {
            plan.initial_checkpoint_id = self.save_checkpoint(plan, None).await?;
        }

        let batches = self.resolver.resolve_dependencies(&plan.phases)?;
        for (level, batch) in batches.iter().enumerate() {
            if self.pause.is_requested() {
                plan.pause()?;
                info!(plan = %plan.id, level, "plan paused between batches");
                return Ok(plan.summary());
            }

            debug!(plan = %plan.id, level, ?batch, "starting batch");
            if self.run_batch(plan, batch).await? == BatchEnd::Aborted {
                return Ok(plan.summary());
            }
        }

        if plan.all_phases_done() {
            plan.complete()?;
            info!(plan = %plan.id, "plan completed");
        } else {
            warn!(plan = %plan.id, "batches exhausted with unsettled phases");
            plan.fail()?;
        }
        Ok(plan.summary())
    }

    /// Phases left in `Executing` by an interrupted run: their attempt is
    /// lost, so route them through the fallback policy.
    fn recover_interrupted(&self, plan: &mut TaskPlan) -> Result<()> {
        let stuck: Vec<TaskId> = plan
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Executing)
            .map(|p| p.id.clone())
            .collect();
        for id in stuck {
            warn!(plan = %plan.id, phase = %id, "phase was interrupted mid-attempt");
            plan.fail_phase(&id, PhaseReport::failure("interrupted"), &self.options)?;
        }
        Ok(())
    }

    async fn run_batch(&self, plan: &mut TaskPlan, batch: &[TaskId]) -> Result<BatchEnd> {
        let mut parallel = Vec::new();
        let mut serial = Vec::new();

        for id in batch {
            let Some(phase) = plan.phase(id) else {
                return Err(PhasedagError::PhaseNotFound(id.clone()));
            };
            if !phase.status.is_waiting() {
                continue;
            }
            if !plan.dependencies_satisfied(phase, &self.options) {
                debug!(phase = %id, "dependencies not satisfied; skipping");
                plan.skip_phase(id, &self.options)?;
                continue;
            }
            if !self.admit(plan, id).await? {
                continue;
            }

            let phase = plan.phase(id).map(|p| p.can_run_in_parallel);
            if phase == Some(true) {
                parallel.push(id.clone());
            } else {
                serial.push(id.clone());
            }
        }

        let limit = self.options.max_parallel_phases.max(1);
        if self.run_group(plan, parallel, limit).await? == BatchEnd::Aborted {
            return Ok(BatchEnd::Aborted);
        }
        self.run_group(plan, serial, 1).await
    }

    /// Approve and queue one phase. Returns false if approval was denied and
    /// the phase was skipped instead.
    async fn admit(&self, plan: &mut TaskPlan, id: &str) -> Result<bool> {
        let Some(phase) = plan.phase(id) else {
            return Err(PhasedagError::PhaseNotFound(id.to_string()));
        };
        if phase.status == PhaseStatus::Queued {
            return Ok(true);
        }

        if phase.status == PhaseStatus::Pending && phase.requires_approval {
            if phase.approval_required(&self.options) {
                let phase = phase.clone();
                if !self.approvals.request_approval(&phase).await {
                    warn!(plan = %plan.id, phase = %id, "approval denied; skipping phase");
                    plan.skip_phase(id, &self.options)?;
                    return Ok(false);
                }
                info!(phase = %id, "phase approved");
            } else {
                debug!(phase = %id, "low risk phase auto-approved");
            }
            plan.approve_phase(id)?;
        }

        plan.queue_phase(id)?;
        Ok(true)
    }

    /// Run `ids` with at most `limit` in flight, applying the fallback
    /// policy as attempts finish. After an abort, no new attempt starts
    /// but the ones in flight are allowed to finish and are recorded.
    async fn run_group(&self, plan: &mut TaskPlan, ids: Vec<TaskId>, limit: usize) -> Result<BatchEnd> {
        let mut waiting: VecDeque<TaskId> = ids.into();
        let mut in_flight: HashSet<TaskId> = HashSet::new();
        let mut set: JoinSet<(TaskId, PhaseReport)> = JoinSet::new();
        let mut aborted = false;

        loop {
            while !aborted && in_flight.len() < limit {
                let Some(id) = waiting.pop_front() else { break };
                self.checkpoint_high_risk(plan, &id).await?;
                self.spawn_attempt(plan, &mut set, &id)?;
                in_flight.insert(id);
            }

            let Some(joined) = set.join_next().await else { break };
            let (id, report) = joined
                .map_err(|e| PhasedagError::Internal(format!("phase attempt task failed: {e}")))?;
            in_flight.remove(&id);

            if report.success {
                info!(phase = %id, "phase completed");
                plan.complete_phase(&id, report)?;
                continue;
            }

            warn!(phase = %id, error = ?report.error, "phase attempt failed");
            if aborted {
                plan.record_failed_attempt(&id, report)?;
                continue;
            }
            match plan.fail_phase(&id, report, &self.options)? {
                FailureOutcome::Retry { attempt } => {
                    debug!(phase = %id, attempt, "re-queueing phase");
                    waiting.push_front(id);
                }
                FailureOutcome::Skipped { cascaded } => {
                    if !cascaded.is_empty() {
                        waiting.retain(|w| !cascaded.contains(w));
                    }
                }
                FailureOutcome::Aborted { retries_exhausted } => {
                    warn!(plan = %plan.id, phase = %id, retries_exhausted, "aborting plan");
                    aborted = true;
                }
            }
        }

        Ok(if aborted { BatchEnd::Aborted } else { BatchEnd::Continue })
    }

    /// Snapshot right before the first attempt of a `High` risk phase, so
    /// the checkpoint sees everything that ran earlier in the batch.
    async fn checkpoint_high_risk(&self, plan: &mut TaskPlan, id: &str) -> Result<()> {
        let Some(phase) = plan.phase(id) else {
            return Err(PhasedagError::PhaseNotFound(id.to_string()));
        };
        if phase.risk_level != RiskLevel::High || phase.checkpoint_id.is_some() {
            return Ok(());
        }
        let phase = phase.clone();
        if let Some(cp) = self.save_checkpoint(plan, Some(&phase)).await? {
            plan.set_phase_checkpoint(id, cp)?;
        }
        Ok(())
    }

    fn spawn_attempt(
        &self,
        plan: &mut TaskPlan,
        set: &mut JoinSet<(TaskId, PhaseReport)>,
        id: &str,
    ) -> Result<()> {
        plan.start_phase(id)?;
        let Some(phase) = plan.phase(id).cloned() else {
            return Err(PhasedagError::PhaseNotFound(id.to_string()));
        };
        debug!(phase = %id, attempt = phase.retry_count + 1, "starting phase attempt");

        let limit_ms = self.options.phase_timeout_ms;
        let fut = self.runner.run_phase(&plan.id, phase);
        let id = id.to_string();

        set.spawn(async move {
            let mut handle = tokio::spawn(fut);
            let report = match tokio::time::timeout(Duration::from_millis(limit_ms), &mut handle).await
            {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => PhaseReport::failure(format!("phase runner panicked: {e}")),
                Err(_) => {
                    handle.abort();
                    PhaseReport::failure(format!("phase timed out after {limit_ms} ms"))
                }
            };
            (id, report)
        });
        Ok(())
    }

    /// Snapshot state into the checkpoint store, if one is configured.
    async fn save_checkpoint(
        &self,
        plan: &TaskPlan,
        phase: Option<&TaskPhase>,
    ) -> Result<Option<String>> {
        let Some((store, source)) = &self.checkpoints else {
            return Ok(None);
        };
        if !self.options.create_checkpoints {
            return Ok(None);
        }

        let files = source.snapshot(plan, phase).await?;
        let description = match phase {
            Some(p) => format!("before phase '{}' of plan '{}'", p.name, plan.id),
            None => format!("start of plan '{}'", plan.id),
        };
        let mut checkpoint = Checkpoint::new(Checkpoint::generate_id(), description, files);
        checkpoint.metadata.insert("planId".into(), plan.id.clone());
        if let Some(p) = phase {
            checkpoint.metadata.insert("phaseId".into(), p.id.clone());
        }

        let info = store.save(&checkpoint).await?;
        info!(plan = %plan.id, checkpoint = %info.id, size = info.size, "checkpoint saved");
        Ok(Some(info.id))
    }
}
