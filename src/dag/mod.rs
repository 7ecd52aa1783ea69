// src/dag/mod.rs

//! Dependency resolution.
//!
//! - [`task`] defines task descriptors and the [`Schedulable`] seam.
//! - [`graph`] holds the dependency graph and the cycle search.
//! - [`resolver`] sorts the graph and groups it into parallel batches.

pub mod graph;
pub mod resolver;
pub mod task;

pub use graph::{DependencyGraph, DependencyNode};
pub use resolver::{DependencyResolver, GraphReport, Resolution};
pub use task::{Schedulable, Task, TaskId, TaskLookup, index_tasks};
