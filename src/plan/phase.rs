// src/plan/phase.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dag::{Schedulable, TaskId};
use crate::plan::dates;
use crate::plan::options::ExecutionOptions;
use crate::plan::status::{FallbackStrategy, PhaseStatus, RiskLevel};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// One unit of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPhase {
    pub id: TaskId,
    pub index: usize,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub can_run_in_parallel: bool,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    pub status: PhaseStatus,
    #[serde(default)]
    pub retry_count: u32,
    /// Weak reference into the checkpoint store; the checkpoint may have
    /// been pruned since.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
    #[serde(default, deserialize_with = "dates::opt_datetime", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "dates::opt_datetime", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl TaskPhase {
    pub fn new(id: impl Into<TaskId>, index: usize, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index,
            name: name.into(),
            description: String::new(),
            dependencies: Vec::new(),
            can_run_in_parallel: false,
            risk_level: RiskLevel::Low,
            requires_approval: false,
            fallback_strategy: FallbackStrategy::Abort,
            max_retries: DEFAULT_MAX_RETRIES,
            status: PhaseStatus::Pending,
            retry_count: 0,
            checkpoint_id: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            tokens_used: 0,
            files_modified: Vec::new(),
            error: None,
            output: None,
        }
    }

    /// Set the risk level. `High` risk turns approval on; call
    /// [`TaskPhase::with_approval`] afterwards to override.
    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self.requires_approval = risk == RiskLevel::High;
        self
    }

    pub fn with_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    pub fn after(mut self, dep: impl Into<TaskId>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    pub fn parallel(mut self, can_run_in_parallel: bool) -> Self {
        self.can_run_in_parallel = can_run_in_parallel;
        self
    }

    pub fn with_fallback(mut self, strategy: FallbackStrategy, max_retries: u32) -> Self {
        self.fallback_strategy = strategy;
        self.max_retries = max_retries;
        self
    }

    /// Whether an external approval is still needed before queueing,
    /// taking `auto_approve_low_risk` into account.
    pub fn approval_required(&self, options: &ExecutionOptions) -> bool {
        if !self.requires_approval || self.status == PhaseStatus::Approved {
            return false;
        }
        !(options.auto_approve_low_risk && self.risk_level == RiskLevel::Low)
    }
}

impl Schedulable for TaskPhase {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }
}

/// What a phase runner reports back for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub success: bool,
    pub error: Option<String>,
    pub tokens_used: u64,
    pub files_modified: Vec<String>,
    pub output: Option<String>,
}

impl PhaseReport {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files_modified = files.into_iter().map(Into::into).collect();
        self
    }
}
