// src/dag/resolver.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use tracing::{debug, warn};

use crate::dag::graph::{DependencyGraph, DependencyNode};
use crate::dag::task::{Schedulable, TaskId, TaskLookup};
use crate::errors::{PhasedagError, Result};

/// Result of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Parallel-safe batches, level 0 first; each batch sorted by
    /// descending priority.
    pub batches: Vec<Vec<TaskId>>,
    /// Priority-ordered topological order the levels were derived from.
    pub order: Vec<TaskId>,
    graph: DependencyGraph,
}

impl Resolution {
    pub fn task_level(&self, task_id: &str) -> Option<usize> {
        self.graph.level_of(task_id)
    }

    pub fn max_level(&self) -> Option<usize> {
        self.batches.len().checked_sub(1)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}

/// Diagnostic view of a task set, produced even when it contains cycles.
#[derive(Debug, Clone)]
pub struct GraphReport {
    /// Nodes in input order. Levels are filled in only for acyclic input.
    pub nodes: Vec<DependencyNode>,
    pub cycles: Vec<Vec<TaskId>>,
}

impl GraphReport {
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

/// Turns a task set into parallel execution batches.
///
/// Stateless: every call builds its own graph, so one resolver can be
/// shared freely between threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `tasks` into batches. Rejects cycles before sorting.
    pub fn resolve_dependencies<T: Schedulable>(&self, tasks: &[T]) -> Result<Vec<Vec<TaskId>>> {
        Ok(self.resolve(tasks)?.batches)
    }

    /// Full resolution including the level map and topological order.
    pub fn resolve<T: Schedulable>(&self, tasks: &[T]) -> Result<Resolution> {
        let mut graph = checked_graph(tasks)?;
        let order = priority_topological_order(&graph)?;
        graph.assign_levels(&order)?;

        let mut batches: Vec<Vec<usize>> = Vec::new();
        for &idx in &order {
            let level = graph.node_at(idx).level.ok_or_else(|| {
                PhasedagError::Internal(format!(
                    "task '{}' has no level after assignment",
                    graph.node_at(idx).task_id
                ))
            })?;
            if batches.len() <= level {
                batches.resize_with(level + 1, Vec::new);
            }
            batches[level].push(idx);
        }

        // Stable: equal priorities keep their topological order.
        for batch in &mut batches {
            batch.sort_by_key(|&idx| Reverse(graph.node_at(idx).priority));
        }

        let batches: Vec<Vec<TaskId>> = batches
            .into_iter()
            .map(|batch| {
                batch
                    .into_iter()
                    .map(|idx| graph.node_at(idx).task_id.clone())
                    .collect()
            })
            .collect();
        let order = order
            .into_iter()
            .map(|idx| graph.node_at(idx).task_id.clone())
            .collect();

        debug!(
            tasks = graph.len(),
            batches = batches.len(),
            "resolved dependencies into batches"
        );

        Ok(Resolution {
            batches,
            order,
            graph,
        })
    }

    /// Priority-ordered topological sort (Kahn's algorithm).
    pub fn topological_sort<T: Schedulable>(&self, tasks: &[T]) -> Result<Vec<TaskId>> {
        let graph = checked_graph(tasks)?;
        let order = priority_topological_order(&graph)?;
        Ok(order
            .into_iter()
            .map(|idx| graph.node_at(idx).task_id.clone())
            .collect())
    }

    /// Build the graph and report every cycle instead of failing on them.
    ///
    /// Unknown dependency ids still fail, since no graph can be built.
    pub fn dependency_graph<T: Schedulable>(&self, tasks: &[T]) -> Result<GraphReport> {
        let mut graph = DependencyGraph::build(tasks)?;
        let cycles = graph.find_cycles();
        if cycles.is_empty() {
            let order = priority_topological_order(&graph)?;
            graph.assign_levels(&order)?;
        }
        Ok(GraphReport {
            nodes: graph.into_nodes(),
            cycles,
        })
    }

    /// Level of a single task, resolving the whole set.
    pub fn task_level<T: Schedulable>(&self, tasks: &[T], task_id: &str) -> Result<usize> {
        let resolution = self.resolve(tasks)?;
        resolution
            .task_level(task_id)
            .ok_or_else(|| PhasedagError::TaskNotFound(task_id.to_string()))
    }

    /// Tasks not yet completed whose dependencies are all completed.
    pub fn ready_tasks<'a, T: Schedulable>(
        &self,
        tasks: &'a [T],
        completed: &HashSet<TaskId>,
    ) -> Vec<&'a T> {
        tasks
            .iter()
            .filter(|t| !completed.contains(t.id()))
            .filter(|t| t.dependencies().iter().all(|d| completed.contains(d)))
            .collect()
    }

    /// Whether `task_id` may start given the completed set.
    ///
    /// `tasks` may be a slice or an id-keyed map; unknown ids are never
    /// executable.
    pub fn can_execute_task<T, L>(
        &self,
        task_id: &str,
        completed: &HashSet<TaskId>,
        tasks: &L,
    ) -> bool
    where
        T: Schedulable,
        L: TaskLookup<T> + ?Sized,
    {
        match tasks.find(task_id) {
            Some(task) => {
                !completed.contains(task_id)
                    && task.dependencies().iter().all(|d| completed.contains(d))
            }
            None => {
                warn!(task = %task_id, "can_execute_task called for unknown task");
                false
            }
        }
    }
}

fn checked_graph<T: Schedulable>(tasks: &[T]) -> Result<DependencyGraph> {
    let graph = DependencyGraph::build(tasks)?;
    if let Some(cycle) = graph.first_cycle() {
        return Err(PhasedagError::DagCycle(format!(
            "cycle detected between tasks: {}",
            cycle.join(" -> ")
        )));
    }
    Ok(graph)
}

/// Kahn's algorithm with a max-heap ready set keyed by priority, ties
/// going to the task supplied first.
fn priority_topological_order(graph: &DependencyGraph) -> Result<Vec<usize>> {
    let mut in_degree: Vec<usize> = graph
        .nodes()
        .iter()
        .map(|n| n.dependencies.len())
        .collect();

    let mut ready: BinaryHeap<(i32, Reverse<usize>)> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(idx, _)| (graph.node_at(idx).priority, Reverse(idx)))
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some((_, Reverse(idx))) = ready.pop() {
        order.push(idx);
        for dependent in &graph.node_at(idx).dependents {
            let Some(dep_idx) = graph.index_of(dependent) else {
                return Err(PhasedagError::Internal(format!(
                    "dependent '{dependent}' missing from graph"
                )));
            };
            in_degree[dep_idx] -= 1;
            if in_degree[dep_idx] == 0 {
                ready.push((graph.node_at(dep_idx).priority, Reverse(dep_idx)));
            }
        }
    }

    if order.len() != graph.len() {
        return Err(PhasedagError::Internal(format!(
            "topological sort placed {} of {} tasks; graph has an undetected cycle",
            order.len(),
            graph.len()
        )));
    }

    Ok(order)
}
