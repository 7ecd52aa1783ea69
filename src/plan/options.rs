// src/plan/options.rs

use serde::Deserialize;

/// Knobs the executor and the transition helpers consult.
///
/// Also the `[execution]` section of `Phasedag.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Upper bound on phases in `Executing` at the same time.
    pub max_parallel_phases: usize,

    /// Per-attempt time limit enforced by the executor.
    pub phase_timeout_ms: u64,

    /// Treat approval as granted for `Low` risk phases.
    pub auto_approve_low_risk: bool,

    /// Whether a `Skipped` dependency lets dependents run.
    ///
    /// When false, skipping a phase also skips everything downstream of it
    /// that has not started yet.
    pub treat_skipped_as_satisfied: bool,

    /// Save a checkpoint before every `High` risk phase.
    pub create_checkpoints: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_parallel_phases: 3,
            phase_timeout_ms: 300_000,
            auto_approve_low_risk: false,
            treat_skipped_as_satisfied: false,
            create_checkpoints: true,
        }
    }
}
