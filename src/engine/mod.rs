// src/engine/mod.rs

//! Reference driver for plans.
//!
//! The plan model in [`crate::plan`] is pure; this module is the async
//! shell around it. [`executor::PlanExecutor`] resolves phase batches,
//! talks to the collaborators declared in [`backend`], and applies each
//! result back onto the plan.

pub mod backend;
pub mod executor;

pub use backend::{
    ApprovalGate, AutoApprove, BoxFuture, PathSnapshotSource, PhaseRunner, SnapshotSource,
};
pub use executor::{PauseHandle, PlanExecutor};
