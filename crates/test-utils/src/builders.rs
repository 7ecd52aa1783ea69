#![allow(dead_code)]

use std::collections::BTreeMap;

use phasedag::config::{CheckpointSection, ConfigFile, RawConfigFile, TaskConfig};
use phasedag::dag::Task;
use phasedag::plan::{
    ExecutionOptions, FallbackStrategy, PhaseStatus, RiskLevel, TaskPhase, TaskPlan,
};

/// Builder for resolver `Task`s.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self { task: Task::new(id) }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.dependencies.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Shorthand for a task list given as `(id, deps)` pairs.
pub fn tasks(edges: &[(&str, &[&str])]) -> Vec<Task> {
    edges.iter()
        .map(|(id, deps)| {
            deps.iter()
                .fold(TaskBuilder::new(id), |b, d| b.after(d))
                .build()
        })
        .collect()
}

/// Builder for `TaskPhase`. The index is assigned by `PlanBuilder`.
pub struct PhaseBuilder {
    phase: TaskPhase,
}

impl PhaseBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            phase: TaskPhase::new(id, 0, format!("phase {id}")),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.phase.dependencies.push(dep.to_string());
        self
    }

    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.phase = self.phase.with_risk(risk);
        self
    }

    pub fn approval(mut self, requires_approval: bool) -> Self {
        self.phase.requires_approval = requires_approval;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.phase.can_run_in_parallel = true;
        self
    }

    pub fn fallback(mut self, strategy: FallbackStrategy, max_retries: u32) -> Self {
        self.phase = self.phase.with_fallback(strategy, max_retries);
        self
    }

    pub fn status(mut self, status: PhaseStatus) -> Self {
        self.phase.status = status;
        self
    }

    pub fn build(self) -> TaskPhase {
        self.phase
    }
}

/// Builder for `TaskPlan`.
pub struct PlanBuilder {
    id: String,
    phases: Vec<TaskPhase>,
    approved: bool,
}

impl PlanBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            phases: Vec::new(),
            approved: false,
        }
    }

    pub fn phase(mut self, phase: PhaseBuilder) -> Self {
        let mut phase = phase.build();
        phase.index = self.phases.len();
        self.phases.push(phase);
        self
    }

    /// Build the plan already in `Approved`.
    pub fn approved(mut self) -> Self {
        self.approved = true;
        self
    }

    pub fn build(self) -> TaskPlan {
        let mut plan = TaskPlan::new(self.id.clone(), format!("plan {}", self.id), self.phases);
        if self.approved {
            plan.approve().expect("fresh plan can be approved");
        }
        plan
    }
}

/// Builder for `ConfigFile`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                execution: ExecutionOptions::default(),
                checkpoints: CheckpointSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, id: &str, after: &[&str]) -> Self {
        self.config.task.insert(
            id.to_string(),
            TaskConfig {
                after: after.iter().map(|s| s.to_string()).collect(),
                priority: 0,
            },
        );
        self
    }

    pub fn with_execution(mut self, execution: ExecutionOptions) -> Self {
        self.config.execution = execution;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
