// src/plan/status.rs

//! Lifecycle states and the transition tables that govern them.

use serde::{Deserialize, Serialize};

/// Lifecycle of a whole plan.
///
/// ```text
/// Created -> Approved -> Executing -> Completed | Failed | Paused
/// Paused -> Executing            (resume)
/// Failed -> Executing            (manual retry)
/// Created | Approved | Paused | Failed -> Abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Created,
    Approved,
    Executing,
    Paused,
    Completed,
    Failed,
    Abandoned,
}

impl PlanStatus {
    pub fn can_transition_to(self, next: PlanStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Approved)
                | (Self::Approved, Self::Executing)
                | (Self::Executing, Self::Completed)
                | (Self::Executing, Self::Failed)
                | (Self::Executing, Self::Paused)
                | (Self::Paused, Self::Executing)
                | (Self::Failed, Self::Executing)
                | (
                    Self::Created | Self::Approved | Self::Paused | Self::Failed,
                    Self::Abandoned
                )
        )
    }

    /// `Completed` and `Abandoned` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

/// Lifecycle of a single phase.
///
/// ```text
/// Pending -> Approved -> Queued -> Executing -> Completed | Failed | Cancelled
/// Pending -> Queued                      (no approval needed)
/// Pending | Approved | Queued -> Skipped | Cancelled
/// Failed -> Queued | Skipped             (retry / skip fallback)
/// Failed -> Pending                      (plan-level manual retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Approved,
    Queued,
    Executing,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl PhaseStatus {
    pub fn can_transition_to(self, next: PhaseStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Queued)
                | (Self::Approved, Self::Queued)
                | (Self::Queued, Self::Executing)
                | (
                    Self::Executing,
                    Self::Completed | Self::Failed | Self::Cancelled
                )
                | (
                    Self::Pending | Self::Approved | Self::Queued,
                    Self::Skipped | Self::Cancelled
                )
                | (Self::Failed, Self::Queued | Self::Skipped | Self::Pending)
        )
    }

    /// Not yet started and still able to run.
    pub fn is_waiting(self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::Queued)
    }

    /// Nothing more will happen to this phase in the current execution.
    ///
    /// `Failed` counts as settled even though a manual plan retry may
    /// reset it.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }
}

/// Potential for destructive side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// Policy applied when a phase fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategy {
    /// Re-queue the phase until `max_retries` is used up, then abort.
    Retry,
    /// Mark the phase skipped and carry on with the rest of the plan.
    Skip,
    /// Fail the phase and the plan.
    #[default]
    Abort,
}
