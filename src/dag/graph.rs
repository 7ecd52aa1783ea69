// src/dag/graph.rs

use std::collections::HashMap;

use tracing::debug;

use crate::dag::task::{Schedulable, TaskId};
use crate::errors::{PhasedagError, Result};

/// A task in the dependency graph, with both edge directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub task_id: TaskId,
    /// Direct dependencies: tasks that must finish before this one can run.
    pub dependencies: Vec<TaskId>,
    /// Direct dependents: tasks that list this one as a dependency.
    pub dependents: Vec<TaskId>,
    pub priority: i32,
    /// Batch level; `None` until levels have been assigned.
    pub level: Option<usize>,
}

/// In-memory dependency graph keyed by task id.
///
/// Nodes keep the order in which tasks were supplied, which is what makes
/// priority ties resolve deterministically.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    index: HashMap<TaskId, usize>,
}

impl DependencyGraph {
    /// Build the graph, failing fast on duplicate ids and on dependencies
    /// that name a task which is not in `tasks`.
    pub fn build<T: Schedulable>(tasks: &[T]) -> Result<Self> {
        let mut nodes = Vec::with_capacity(tasks.len());
        let mut index = HashMap::with_capacity(tasks.len());

        for task in tasks {
            let id = task.id().to_string();
            if index.insert(id.clone(), nodes.len()).is_some() {
                return Err(PhasedagError::DuplicateTask(id));
            }
            nodes.push(DependencyNode {
                task_id: id,
                dependencies: task.dependencies().to_vec(),
                dependents: Vec::new(),
                priority: task.priority(),
                level: None,
            });
        }

        for i in 0..nodes.len() {
            let deps = nodes[i].dependencies.clone();
            for dep in deps {
                let Some(&dep_idx) = index.get(&dep) else {
                    return Err(PhasedagError::UnknownDependency {
                        task: nodes[i].task_id.clone(),
                        dependency: dep,
                    });
                };
                let dependent = nodes[i].task_id.clone();
                nodes[dep_idx].dependents.push(dependent);
            }
        }

        debug!(nodes = nodes.len(), "built dependency graph");
        Ok(Self { nodes, index })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&DependencyNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes in the order the tasks were supplied.
    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<DependencyNode> {
        self.nodes
    }

    pub(crate) fn node_at(&self, idx: usize) -> &DependencyNode {
        &self.nodes[idx]
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.node(id)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.node(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.node(id).and_then(|n| n.level)
    }

    /// `true` if any cycle exists. Stops at the first one found.
    pub fn has_cycle(&self) -> bool {
        !self.search_cycles(true).is_empty()
    }

    /// First cycle found, as a path that ends on the node it started from.
    pub fn first_cycle(&self) -> Option<Vec<TaskId>> {
        self.search_cycles(true).into_iter().next()
    }

    /// Every cycle reachable by the search, for diagnostics.
    pub fn find_cycles(&self) -> Vec<Vec<TaskId>> {
        self.search_cycles(false)
    }

    /// Assign levels following `order`, which must be a topological order
    /// of this graph.
    pub(crate) fn assign_levels(&mut self, order: &[usize]) -> Result<()> {
        for &idx in order {
            let mut level = 0;
            for dep in &self.nodes[idx].dependencies {
                let dep_idx = self.index[dep.as_str()];
                let Some(dep_level) = self.nodes[dep_idx].level else {
                    return Err(PhasedagError::Internal(format!(
                        "dependency '{}' of '{}' has no level yet",
                        dep, self.nodes[idx].task_id
                    )));
                };
                level = level.max(dep_level + 1);
            }
            self.nodes[idx].level = Some(level);
        }
        Ok(())
    }

    /// Depth-first search over dependency edges. `on_stack` marks the
    /// current path; a node met again while on it closes a cycle.
    fn search_cycles(&self, stop_at_first: bool) -> Vec<Vec<TaskId>> {
        let mut search = CycleSearch {
            graph: self,
            visited: vec![false; self.nodes.len()],
            on_stack: vec![false; self.nodes.len()],
            path: Vec::new(),
            cycles: Vec::new(),
            stop_at_first,
        };

        for start in 0..self.nodes.len() {
            if !search.visited[start] && search.visit(start) {
                break;
            }
        }

        search.cycles
    }
}

struct CycleSearch<'a> {
    graph: &'a DependencyGraph,
    visited: Vec<bool>,
    on_stack: Vec<bool>,
    path: Vec<usize>,
    cycles: Vec<Vec<TaskId>>,
    stop_at_first: bool,
}

impl CycleSearch<'_> {
    /// Returns `true` when the search should stop.
    ///
    /// Iterative: each frame is a node plus the index of the next
    /// dependency to look at, so chain depth never touches the call stack.
    fn visit(&mut self, start: usize) -> bool {
        let graph = self.graph;
        let mut frames: Vec<(usize, usize)> = vec![(start, 0)];
        self.enter(start);

        while let Some(frame) = frames.last_mut() {
            let (idx, next) = *frame;
            let Some(dep) = graph.nodes[idx].dependencies.get(next) else {
                frames.pop();
                self.path.pop();
                self.on_stack[idx] = false;
                continue;
            };
            frame.1 += 1;

            let dep_idx = graph.index[dep.as_str()];
            if self.on_stack[dep_idx] {
                self.record_cycle(dep_idx);
                if self.stop_at_first {
                    return true;
                }
            } else if !self.visited[dep_idx] {
                self.enter(dep_idx);
                frames.push((dep_idx, 0));
            }
        }
        false
    }

    fn enter(&mut self, idx: usize) {
        self.visited[idx] = true;
        self.on_stack[idx] = true;
        self.path.push(idx);
    }

    fn record_cycle(&mut self, closing: usize) {
        let start = self
            .path
            .iter()
            .position(|&p| p == closing)
            .unwrap_or(0);
        let mut cycle: Vec<TaskId> = self.path[start..]
            .iter()
            .map(|&i| self.graph.nodes[i].task_id.clone())
            .collect();
        cycle.push(self.graph.nodes[closing].task_id.clone());
        self.cycles.push(cycle);
    }
}
