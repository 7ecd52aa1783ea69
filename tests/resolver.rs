// tests/resolver.rs

use std::collections::{HashMap, HashSet};

use phasedag::dag::{DependencyGraph, DependencyResolver, Task, TaskId, index_tasks};
use phasedag::errors::PhasedagError;
use phasedag_test_utils::builders::{TaskBuilder, tasks};

fn diamond() -> Vec<Task> {
    vec![
        TaskBuilder::new("A").priority(1).build(),
        TaskBuilder::new("B").after("A").priority(1).build(),
        TaskBuilder::new("C").after("A").priority(5).build(),
        TaskBuilder::new("D").after("B").after("C").priority(1).build(),
    ]
}

fn completed(ids: &[&str]) -> HashSet<TaskId> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn diamond_batches_follow_levels_then_priority() {
    let batches = DependencyResolver::new()
        .resolve_dependencies(&diamond())
        .unwrap();

    assert_eq!(
        batches,
        vec![
            vec!["A".to_string()],
            vec!["C".to_string(), "B".to_string()],
            vec!["D".to_string()],
        ]
    );
}

#[test]
fn resolution_exposes_levels_and_order() {
    let resolution = DependencyResolver::new().resolve(&diamond()).unwrap();

    assert_eq!(resolution.task_level("A"), Some(0));
    assert_eq!(resolution.task_level("B"), Some(1));
    assert_eq!(resolution.task_level("C"), Some(1));
    assert_eq!(resolution.task_level("D"), Some(2));
    assert_eq!(resolution.task_level("nope"), None);
    assert_eq!(resolution.max_level(), Some(2));
    assert_eq!(resolution.order, vec!["A", "C", "B", "D"]);
    assert_eq!(resolution.graph().dependents_of("A"), ["B", "C"]);
}

#[test]
fn equal_priorities_keep_input_order() {
    let input = tasks(&[("x", &[]), ("y", &[]), ("z", &[])]);
    let batches = DependencyResolver::new().resolve_dependencies(&input).unwrap();
    assert_eq!(batches, vec![vec!["x", "y", "z"]]);
}

#[test]
fn level_is_longest_path_not_shortest() {
    // C depends on A directly and through B.
    let input = tasks(&[("A", &[]), ("B", &["A"]), ("C", &["A", "B"])]);
    let resolver = DependencyResolver::new();

    assert_eq!(resolver.task_level(&input, "C").unwrap(), 2);
    assert!(matches!(
        resolver.task_level(&input, "missing"),
        Err(PhasedagError::TaskNotFound(id)) if id == "missing"
    ));
}

#[test]
fn empty_input_yields_no_batches() {
    let batches = DependencyResolver::new()
        .resolve_dependencies::<Task>(&[])
        .unwrap();
    assert!(batches.is_empty());
}

#[test]
fn two_node_cycle_is_rejected_naming_both_tasks() {
    let input = tasks(&[("A", &["B"]), ("B", &["A"])]);

    match DependencyResolver::new().resolve_dependencies(&input) {
        Err(PhasedagError::DagCycle(msg)) => {
            assert!(msg.contains('A'), "message should name A: {msg}");
            assert!(msg.contains('B'), "message should name B: {msg}");
        }
        Err(e) => panic!("Expected DagCycle error, got: {:?}", e),
        Ok(b) => panic!("Expected error, got batches {:?}", b),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let input = tasks(&[("A", &["A"])]);
    let err = DependencyResolver::new().topological_sort(&input).unwrap_err();
    assert!(matches!(err, PhasedagError::DagCycle(_)));
}

#[test]
fn unknown_dependency_fails_graph_construction() {
    let input = tasks(&[("A", &[]), ("B", &["Z"])]);

    match DependencyGraph::build(&input) {
        Err(PhasedagError::UnknownDependency { task, dependency }) => {
            assert_eq!(task, "B");
            assert_eq!(dependency, "Z");
        }
        other => panic!("Expected UnknownDependency, got: {:?}", other),
    }
    assert!(DependencyResolver::new().resolve_dependencies(&input).is_err());
}

#[test]
fn duplicate_ids_are_rejected() {
    let input = tasks(&[("A", &[]), ("A", &[])]);
    assert!(matches!(
        DependencyGraph::build(&input),
        Err(PhasedagError::DuplicateTask(id)) if id == "A"
    ));
}

#[test]
fn dependency_graph_reports_cycles_instead_of_failing() {
    let input = tasks(&[("A", &["C"]), ("B", &["A"]), ("C", &["B"]), ("D", &[])]);
    let report = DependencyResolver::new().dependency_graph(&input).unwrap();

    assert!(report.has_cycles());
    assert_eq!(report.nodes.len(), 4);
    let cycle = &report.cycles[0];
    assert_eq!(cycle.first(), cycle.last(), "cycle path closes on its start");
    for id in ["A", "B", "C"] {
        assert!(cycle.iter().any(|c| c == id), "{id} missing from {cycle:?}");
    }
    assert!(report.nodes.iter().all(|n| n.level.is_none()));
}

#[test]
fn dependency_graph_of_acyclic_input_carries_levels() {
    let report = DependencyResolver::new().dependency_graph(&diamond()).unwrap();
    assert!(!report.has_cycles());

    let levels: HashMap<&str, Option<usize>> = report
        .nodes
        .iter()
        .map(|n| (n.task_id.as_str(), n.level))
        .collect();
    assert_eq!(levels["D"], Some(2));

    let a = report.nodes.iter().find(|n| n.task_id == "A").unwrap();
    assert_eq!(a.dependents, vec!["B", "C"]);
}

#[test]
fn graph_cycle_queries_agree() {
    let acyclic = DependencyGraph::build(&diamond()).unwrap();
    assert!(!acyclic.has_cycle());
    assert!(acyclic.first_cycle().is_none());
    assert!(acyclic.find_cycles().is_empty());

    let cyclic = DependencyGraph::build(&tasks(&[("A", &["B"]), ("B", &["A"])])).unwrap();
    assert!(cyclic.has_cycle());
    assert_eq!(cyclic.first_cycle(), cyclic.find_cycles().into_iter().next());
}

#[test]
fn ready_tasks_excludes_completed_and_blocked() {
    let input = diamond();
    let resolver = DependencyResolver::new();

    let ready: Vec<&str> = resolver
        .ready_tasks(&input, &completed(&[]))
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ready, vec!["A"]);

    let ready: Vec<&str> = resolver
        .ready_tasks(&input, &completed(&["A", "B"]))
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ready, vec!["C"]);
}

#[test]
fn can_execute_task_accepts_slices_and_maps() {
    let input = diamond();
    let resolver = DependencyResolver::new();
    let done = completed(&["A", "B"]);

    assert!(resolver.can_execute_task("C", &done, input.as_slice()));
    assert!(!resolver.can_execute_task("D", &done, input.as_slice()));
    assert!(!resolver.can_execute_task("A", &done, input.as_slice()), "already completed");
    assert!(!resolver.can_execute_task("ghost", &done, input.as_slice()));

    let by_id = index_tasks(&input);
    assert!(resolver.can_execute_task("C", &done, &by_id));
    assert!(!resolver.can_execute_task("D", &done, &by_id));
}

#[test]
fn deep_chain_listed_dependents_first_resolves() {
    const DEPTH: usize = 20_000;
    let chain: Vec<Task> = (0..DEPTH)
        .rev()
        .map(|i| {
            let task = TaskBuilder::new(&format!("t{i}"));
            let task = if i == 0 { task } else { task.after(&format!("t{}", i - 1)) };
            task.build()
        })
        .collect();

    let batches = DependencyResolver::new().resolve_dependencies(&chain).unwrap();
    assert_eq!(batches.len(), DEPTH);
    assert_eq!(batches[0], vec!["t0"]);
    assert_eq!(batches[DEPTH - 1], vec![format!("t{}", DEPTH - 1)]);

    // Closing the chain into a ring must still be reported, not overflow.
    let mut ring = chain;
    ring.last_mut().unwrap().dependencies.push(format!("t{}", DEPTH - 1));
    assert!(matches!(
        DependencyResolver::new().resolve_dependencies(&ring),
        Err(PhasedagError::DagCycle(_))
    ));
}
