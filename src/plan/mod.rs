// src/plan/mod.rs

//! Plan and phase lifecycle.
//!
//! Pure value types plus transition helpers; no I/O and no locking. The
//! executor in [`crate::engine`] is the only intended mutator during a run.
//!
//! - [`status`] defines the state enums and their transition tables.
//! - [`phase`] defines [`TaskPhase`] and the [`PhaseReport`] runners return.
//! - [`model`] defines the [`TaskPlan`] aggregate and its transitions,
//!   including the fallback policy applied on phase failure.
//! - [`options`] holds [`ExecutionOptions`].
//! - [`summary`] and [`codec`] provide reporting and persistence helpers.

pub mod codec;
pub mod dates;
pub mod model;
pub mod options;
pub mod phase;
pub mod status;
pub mod summary;

pub use codec::{decode_plan, encode_plan};
pub use model::{FailureOutcome, TaskPlan};
pub use options::ExecutionOptions;
pub use phase::{PhaseReport, TaskPhase};
pub use status::{FallbackStrategy, PhaseStatus, PlanStatus, RiskLevel};
pub use summary::PlanSummary;
