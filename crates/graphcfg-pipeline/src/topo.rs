//! Topological ordering and cycle detection over the dependency graph:
//! computes a dependency order, rejecting cycles with `CycleDetected`.
//!
//! DFS with an explicit recursion stack: a child already on the stack means
//! the walk has looped back on itself.

use crate::PipelineError;
use graphcfg_core::graph::Graph;
use graphcfg_core::vertex::VertexId;
use std::collections::HashSet;

/// A dependency-respecting order: for every edge `v -> child`, `child`
/// precedes `v`. Vertices are visited in sorted-id order for a
/// deterministic result across runs.
pub fn topological_order<V>(graph: &Graph<V>) -> Result<Vec<VertexId>, PipelineError> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<VertexId> = Vec::new();

    let mut ids: Vec<&VertexId> = graph.vertices().collect();
    ids.sort();

    for id in ids {
        if !visited.contains(id) {
            visit(graph, id, &mut visited, &mut stack, &mut order)?;
        }
    }
    Ok(order)
}

fn visit<V>(
    graph: &Graph<V>,
    id: &VertexId,
    visited: &mut HashSet<VertexId>,
    stack: &mut Vec<VertexId>,
    order: &mut Vec<VertexId>,
) -> Result<(), PipelineError> {
    if let Some(start) = stack.iter().position(|v| v == id) {
        let mut cycle = stack[start..].to_vec();
        cycle.push(id.clone());
        return Err(PipelineError::CycleDetected(cycle));
    }
    if visited.contains(id) {
        return Ok(());
    }

    stack.push(id.clone());
    for child in graph.children(id) {
        visit(graph, child, visited, stack, order)?;
    }
    stack.pop();

    visited.insert(id.clone());
    order.push(id.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphcfg_core::record::Record;
    use graphcfg_core::kinds::{Module, TaskExec};
    use std::sync::Arc;

    type TestGraph = Graph<Arc<dyn Record>>;

    fn id(s: &str) -> VertexId {
        VertexId::parse(s).unwrap()
    }

    fn rec(r: impl Record + 'static) -> Arc<dyn Record> {
        Arc::new(r)
    }

    #[test]
    fn dependencies_precede_dependents() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root"), rec(Module::default())).unwrap();
        g.add(id("root.a"), rec(TaskExec::default())).unwrap();
        g.add(id("root.b"), rec(TaskExec::default())).unwrap();
        g.connect(&id("root.a"), id("root.b")).unwrap();

        let order = topological_order(&g).unwrap();
        let pos_a = order.iter().position(|v| v == &id("root.a")).unwrap();
        let pos_b = order.iter().position(|v| v == &id("root.b")).unwrap();
        assert!(pos_b < pos_a, "root.b (dependency) must render before root.a");
    }

    #[test]
    fn self_reinforcing_cycle_is_rejected() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.a"), rec(TaskExec::default())).unwrap();
        g.add(id("root.b"), rec(TaskExec::default())).unwrap();
        g.connect(&id("root.a"), id("root.b")).unwrap();
        g.connect(&id("root.b"), id("root.a")).unwrap();

        let err = topological_order(&g).unwrap_err();
        match err {
            PipelineError::CycleDetected(ids) => {
                assert!(ids.contains(&id("root.a")));
                assert!(ids.contains(&id("root.b")));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn disconnected_components_all_appear() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.a"), rec(TaskExec::default())).unwrap();
        g.add(id("root.b"), rec(TaskExec::default())).unwrap();
        let order = topological_order(&g).unwrap();
        assert_eq!(order.len(), 2);
    }
}
