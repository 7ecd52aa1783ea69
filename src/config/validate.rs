// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, tasks_from};
use crate::dag::DependencyResolver;
use crate::errors::{PhasedagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PhasedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.execution, raw.checkpoints, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_execution(cfg)?;
    validate_checkpoints(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn validate_execution(cfg: &RawConfigFile) -> Result<()> {
    if cfg.execution.max_parallel_phases == 0 {
        return Err(PhasedagError::ConfigError(
            "[execution].max_parallel_phases must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.execution.phase_timeout_ms == 0 {
        return Err(PhasedagError::ConfigError(
            "[execution].phase_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_checkpoints(cfg: &RawConfigFile) -> Result<()> {
    if cfg.checkpoints.max_checkpoints == Some(0) {
        return Err(PhasedagError::ConfigError(
            "[checkpoints].max_checkpoints must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.checkpoints.root.as_os_str().is_empty() {
        return Err(PhasedagError::ConfigError(
            "[checkpoints].root must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(PhasedagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(PhasedagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

/// Cycles are reported by the same resolver that batches the tasks later.
fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    DependencyResolver::new().topological_sort(&tasks_from(&cfg.task))?;
    Ok(())
}
