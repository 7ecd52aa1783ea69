// src/dag/task.rs

//! Task descriptors consumed by the resolver.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical task identifier type used throughout the resolver.
pub type TaskId = String;

/// Minimal task descriptor: an id, the ids it waits for, and a priority
/// used only to order work that is already safe to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub priority: i32,
}

impl Task {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            priority: 0,
        }
    }

    pub fn after(mut self, dep: impl Into<TaskId>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Anything the resolver can place into batches.
///
/// Implemented for [`Task`] and for plan phases, so a plan's phases are
/// batched by exactly the same algorithm as free-standing tasks.
pub trait Schedulable {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[TaskId];

    /// Higher runs first among tasks that are ready at the same time.
    fn priority(&self) -> i32 {
        0
    }
}

impl Schedulable for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

impl<T: Schedulable + ?Sized> Schedulable for &T {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn dependencies(&self) -> &[TaskId] {
        (**self).dependencies()
    }

    fn priority(&self) -> i32 {
        (**self).priority()
    }
}

/// Lookup of a task by id.
///
/// Slices scan linearly; maps give O(1) lookups for hot paths that call
/// [`crate::dag::DependencyResolver::can_execute_task`] repeatedly.
pub trait TaskLookup<T: Schedulable> {
    fn find(&self, id: &str) -> Option<&T>;
}

impl<T: Schedulable> TaskLookup<T> for [T] {
    fn find(&self, id: &str) -> Option<&T> {
        self.iter().find(|t| t.id() == id)
    }
}

impl<T: Schedulable> TaskLookup<T> for Vec<T> {
    fn find(&self, id: &str) -> Option<&T> {
        self.as_slice().find(id)
    }
}

impl<T: Schedulable> TaskLookup<T> for HashMap<TaskId, T> {
    fn find(&self, id: &str) -> Option<&T> {
        self.get(id)
    }
}

/// Build an id → task map for repeated [`TaskLookup`] queries.
pub fn index_tasks<T: Schedulable>(tasks: &[T]) -> HashMap<TaskId, &T> {
    tasks.iter().map(|t| (t.id().to_string(), t)).collect()
}
