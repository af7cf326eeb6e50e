// src/dag/resolver.rs

//! Execution order for a requested subset of stages.

use std::collections::HashSet;

use tracing::debug;

use crate::dag::graph::StageGraph;
use crate::errors::{Result, StagehandError};

impl StageGraph {
    /// Expand `requested` with all transitive dependencies and order the
    /// result so every stage comes after the stages it depends on.
    ///
    /// Requested names are visited in the order given; each is walked
    /// depth-first in postorder, following `deps` in declaration order.
    /// Stages already placed by an earlier name are not added twice, so the
    /// output is deterministic for a given graph and input.
    ///
    /// Fails with [`StagehandError::UnknownStage`] before doing any work if a
    /// requested name is not defined, and with [`StagehandError::DagCycle`]
    /// when a dependency is reached again while still on the active path.
    pub fn resolve_order<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<String>> {
        let mut roots = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.as_ref();
            match self.index.get(name) {
                Some(&idx) => roots.push(idx),
                None => return Err(StagehandError::UnknownStage(name.to_string())),
            }
        }

        let mut walk = Walk::new(self);
        for idx in roots {
            if !walk.finalized.contains(&idx) {
                walk.visit(idx)?;
            }
        }

        let order: Vec<String> = walk
            .order
            .into_iter()
            .map(|i| self.stages[i].name().to_string())
            .collect();
        debug!(?order, "resolved stage execution order");
        Ok(order)
    }
}

struct Walk<'a> {
    graph: &'a StageGraph,
    active: HashSet<usize>,
    finalized: HashSet<usize>,
    order: Vec<usize>,
}

impl<'a> Walk<'a> {
    fn new(graph: &'a StageGraph) -> Self {
        Self {
            graph,
            active: HashSet::new(),
            finalized: HashSet::new(),
            order: Vec::new(),
        }
    }

    fn visit(&mut self, idx: usize) -> Result<()> {
        let graph = self.graph;
        self.active.insert(idx);

        for &dep in graph.dependency_indices(idx) {
            if self.finalized.contains(&dep) {
                continue;
            }
            if self.active.contains(&dep) {
                return Err(StagehandError::DagCycle {
                    stage: graph.stages[idx].name().to_string(),
                    dependency: graph.stages[dep].name().to_string(),
                });
            }
            self.visit(dep)?;
        }

        self.active.remove(&idx);
        self.finalized.insert(idx);
        self.order.push(idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::StageDefinition;

    fn def(name: &str, deps: &[&str]) -> StageDefinition {
        StageDefinition {
            name: name.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            resources: vec![],
            config: vec![],
        }
    }

    fn default_graph() -> StageGraph {
        StageGraph::build(vec![
            def("style", &["validate"]),
            def("validate", &[]),
            def("build", &["validate", "style"]),
        ])
        .unwrap()
    }

    #[test]
    fn returns_requested_order_when_already_sorted() {
        let order = default_graph()
            .resolve_order(&["validate", "style", "build"])
            .unwrap();
        assert_eq!(order, vec!["validate", "style", "build"]);
    }

    #[test]
    fn expands_and_sorts_unordered_request() {
        let order = default_graph().resolve_order(&["build", "validate"]).unwrap();
        assert_eq!(order, vec!["validate", "style", "build"]);
    }

    #[test]
    fn empty_request_gives_empty_order() {
        let empty: [&str; 0] = [];
        assert!(default_graph().resolve_order(&empty).unwrap().is_empty());
    }

    #[test]
    fn all_stages_in_definition_order() {
        let graph = default_graph();
        let names: Vec<&str> = graph.stage_names().collect();
        let order = graph.resolve_order(&names).unwrap();
        assert_eq!(order, vec!["validate", "style", "build"]);
    }

    #[test]
    fn unknown_stage_is_reported_by_name() {
        match default_graph().resolve_order(&["validate", "does-not-exist"]) {
            Err(StagehandError::UnknownStage(name)) => assert_eq!(name, "does-not-exist"),
            other => panic!("expected UnknownStage, got {other:?}"),
        }
    }

    #[test]
    fn two_stage_cycle_names_both_stages() {
        let graph = StageGraph::build(vec![def("A", &["B"]), def("B", &["A"])]).unwrap();
        let err = graph.resolve_order(&["A"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'A'"), "{msg}");
        assert!(msg.contains("'B'"), "{msg}");
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = StageGraph::build(vec![def("style", &["style"])]).unwrap();
        assert!(matches!(
            graph.resolve_order(&["style"]),
            Err(StagehandError::DagCycle { .. })
        ));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let graph = StageGraph::build(vec![
            def("root", &[]),
            def("left", &["root"]),
            def("right", &["root"]),
            def("join", &["left", "right"]),
        ])
        .unwrap();
        let order = graph.resolve_order(&["join"]).unwrap();
        assert_eq!(order, vec!["root", "left", "right", "join"]);
    }
}
