// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::dot::{Config, Dot};
use petgraph::graph::DiGraph;

use crate::config::model::StageDefinition;
use crate::errors::{Result, StagehandError};

/// Runtime node for one stage.
///
/// Dependencies are stored as indices into the owning [`StageGraph`], so a
/// stage never owns the stages it depends on.
#[derive(Debug, Clone)]
pub struct Stage {
    definition: StageDefinition,
    dependencies: Vec<usize>,
}

impl Stage {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &StageDefinition {
        &self.definition
    }
}

/// In-memory stage graph keyed by stage name.
///
/// Built once per run. Construction only checks that every `deps` entry
/// names a known stage; cycles are reported by
/// [`StageGraph::resolve_order`](crate::dag::StageGraph::resolve_order).
#[derive(Debug, Clone)]
pub struct StageGraph {
    pub(crate) stages: Vec<Stage>,
    pub(crate) index: HashMap<String, usize>,
}

impl StageGraph {
    /// Wire stage dependencies by name lookup.
    pub fn build(definitions: Vec<StageDefinition>) -> Result<Self> {
        let mut index = HashMap::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            if index.insert(def.name.clone(), i).is_some() {
                return Err(StagehandError::ConfigError(format!(
                    "stage '{}' is defined more than once",
                    def.name
                )));
            }
        }

        let mut stages = Vec::with_capacity(definitions.len());
        for def in definitions {
            let dependencies = def
                .deps
                .iter()
                .map(|dep| {
                    index.get(dep).copied().ok_or_else(|| {
                        StagehandError::ConfigError(format!(
                            "stage '{}' has unknown dependency '{}' in `deps`",
                            def.name, dep
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            stages.push(Stage {
                definition: def,
                dependencies,
            });
        }

        Ok(Self { stages, index })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    /// All stage names, in definition order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name())
    }

    /// Immediate dependencies of a stage, in declaration order.
    pub fn dependencies_of(&self, name: &str) -> Vec<&Stage> {
        self.index
            .get(name)
            .map(|&i| {
                self.stages[i]
                    .dependencies
                    .iter()
                    .map(|&d| &self.stages[d])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn dependency_indices(&self, idx: usize) -> &[usize] {
        &self.stages[idx].dependencies
    }

    /// Render the graph in Graphviz DOT format.
    ///
    /// Edge direction: dependency -> dependent.
    pub fn to_dot(&self) -> String {
        let mut graph: DiGraph<&str, &str> = DiGraph::new();
        let nodes: Vec<_> = self
            .stages
            .iter()
            .map(|s| graph.add_node(s.name()))
            .collect();

        for (i, stage) in self.stages.iter().enumerate() {
            for &dep in &stage.dependencies {
                graph.add_edge(nodes[dep], nodes[i], "");
            }
        }

        format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, deps: &[&str]) -> StageDefinition {
        StageDefinition {
            name: name.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            resources: vec![],
            config: vec![],
        }
    }

    #[test]
    fn build_wires_dependencies_by_name() {
        let graph = StageGraph::build(vec![
            def("validate", &[]),
            def("style", &["validate"]),
            def("build", &["validate", "style"]),
        ])
        .unwrap();

        let deps: Vec<&str> = graph.dependencies_of("build").iter().map(|s| s.name()).collect();
        assert_eq!(deps, vec!["validate", "style"]);
        assert!(graph.dependencies_of("validate").is_empty());
    }

    #[test]
    fn build_fails_on_unresolved_dependency() {
        let err = StageGraph::build(vec![def("style", &["ghost"])]).unwrap_err();
        match err {
            StagehandError::ConfigError(msg) => assert!(msg.contains("ghost")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn dot_output_contains_edges() {
        let graph = StageGraph::build(vec![def("a", &[]), def("b", &["a"])]).unwrap();
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("0 -> 1"));
    }
}
