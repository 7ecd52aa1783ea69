// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::checkpoint::RetentionPolicy;
use crate::checkpoint::store::DEFAULT_ROOT;
use crate::dag::Task;
use crate::plan::ExecutionOptions;

/// `[checkpoints]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    /// Storage root, relative to the working directory.
    pub root: PathBuf,
    /// Prune checkpoints older than this many days.
    pub retention_days: Option<u32>,
    /// Gzip checkpoints older than this many days.
    pub compress_after_days: Option<u32>,
    /// Keep at most this many checkpoints, newest first.
    pub max_checkpoints: Option<usize>,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            retention_days: None,
            compress_after_days: None,
            max_checkpoints: None,
        }
    }
}

impl CheckpointSection {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            retention_days: self.retention_days,
            compress_after_days: self.compress_after_days,
            max_checkpoints: self.max_checkpoints,
        }
    }
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub priority: i32,
}

/// Configuration exactly as deserialized, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub execution: ExecutionOptions,
    #[serde(default)]
    pub checkpoints: CheckpointSection,
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Obtain one through `TryFrom<RawConfigFile>`
/// or [`crate::config::load_and_validate`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub execution: ExecutionOptions,
    pub checkpoints: CheckpointSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        execution: ExecutionOptions,
        checkpoints: CheckpointSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            execution,
            checkpoints,
            task,
        }
    }

    /// Task descriptors for the resolver, in id order.
    pub fn to_tasks(&self) -> Vec<Task> {
        tasks_from(&self.task)
    }
}

pub(crate) fn tasks_from(task: &BTreeMap<String, TaskConfig>) -> Vec<Task> {
    task.iter()
        .map(|(id, cfg)| Task {
            id: id.clone(),
            dependencies: cfg.after.clone(),
            priority: cfg.priority,
        })
        .collect()
}
