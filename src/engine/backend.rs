// src/engine/backend.rs

//! Pluggable collaborators of the plan executor.
//!
//! The executor never runs model calls, prompts or tools itself. It talks
//! to a [`PhaseRunner`] for the work, an [`ApprovalGate`] for approval
//! signals, and a [`SnapshotSource`] for the file contents it checkpoints.
//! Tests swap in fakes for all three.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tracing::debug;

use crate::checkpoint::FileSnapshot;
use crate::errors::Result;
use crate::plan::{PhaseReport, TaskPhase, TaskPlan};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes one attempt of a phase.
///
/// The returned future must not borrow from `self`: the executor runs it on
/// its own task so it can enforce the phase timeout.
pub trait PhaseRunner: Send + Sync {
    fn run_phase(&self, plan_id: &str, phase: TaskPhase) -> BoxFuture<'static, PhaseReport>;
}

/// Source of the external approval signal for gated phases.
pub trait ApprovalGate: Send + Sync {
    fn request_approval<'a>(&'a self, phase: &'a TaskPhase) -> BoxFuture<'a, bool>;
}

/// Approves everything. Suitable when the caller already vetted the plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    fn request_approval<'a>(&'a self, phase: &'a TaskPhase) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            debug!(phase = %phase.id, "auto-approving phase");
            true
        })
    }
}

/// Produces the file contents captured into a checkpoint.
pub trait SnapshotSource: Send + Sync {
    /// `phase` is `None` for the snapshot taken before a plan starts.
    fn snapshot<'a>(
        &'a self,
        plan: &'a TaskPlan,
        phase: Option<&'a TaskPhase>,
    ) -> BoxFuture<'a, Result<Vec<FileSnapshot>>>;
}

/// Snapshots a fixed list of paths, skipping ones that do not exist.
#[derive(Debug, Clone, Default)]
pub struct PathSnapshotSource {
    paths: Vec<PathBuf>,
}

impl PathSnapshotSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl SnapshotSource for PathSnapshotSource {
    fn snapshot<'a>(
        &'a self,
        _plan: &'a TaskPlan,
        _phase: Option<&'a TaskPhase>,
    ) -> BoxFuture<'a, Result<Vec<FileSnapshot>>> {
        Box::pin(async move {
            let mut files = Vec::with_capacity(self.paths.len());
            for path in &self.paths {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    debug!(path = %path.display(), "snapshot path missing; skipping");
                    continue;
                }
                files.push(FileSnapshot::capture(path).await?);
            }
            Ok(files)
        })
    }
}
