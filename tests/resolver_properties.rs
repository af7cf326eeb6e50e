// tests/resolver_properties.rs

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use stagehand::config::StageDefinition;
use stagehand::dag::StageGraph;
use stagehand::errors::StagehandError;
use stagehand_test_utils::StageBuilder;

// Strategy to generate an acyclic stage set.
// Acyclicity is guaranteed by only letting stage N depend on stages 0..N-1.
fn acyclic_stages(max_stages: usize) -> impl Strategy<Value = Vec<StageDefinition>> {
    (1..=max_stages).prop_flat_map(|num_stages| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_stages),
            num_stages,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let mut builder = StageBuilder::new(&format!("stage_{i}"));
                    let mut seen = HashSet::new();
                    for dep in potential {
                        if i > 0 && seen.insert(dep % i) {
                            builder = builder.dep(&format!("stage_{}", dep % i));
                        }
                    }
                    builder.build()
                })
                .collect()
        })
    })
}

fn requested_strategy() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(0..12usize, 0..6)
}

proptest! {
    #[test]
    fn dependencies_precede_dependents(
        stages in acyclic_stages(12),
        picks in requested_strategy(),
    ) {
        let n = stages.len();
        let requested: Vec<String> = picks.iter().map(|i| format!("stage_{}", i % n)).collect();
        let deps: HashMap<String, Vec<String>> = stages
            .iter()
            .map(|s| (s.name.clone(), s.deps.clone()))
            .collect();
        let graph = StageGraph::build(stages).unwrap();

        let order = graph.resolve_order(&requested).unwrap();

        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();
        prop_assert_eq!(position.len(), order.len(), "no stage appears twice");

        for stage in &order {
            for dep in &deps[stage] {
                let dep_pos = position.get(dep.as_str());
                prop_assert!(dep_pos.is_some(), "{} missing dependency {}", stage, dep);
                prop_assert!(dep_pos.unwrap() < &position[stage.as_str()]);
            }
        }
        for name in &requested {
            prop_assert!(position.contains_key(name.as_str()));
        }
    }

    #[test]
    fn resolution_is_deterministic(
        stages in acyclic_stages(12),
        picks in requested_strategy(),
    ) {
        let n = stages.len();
        let requested: Vec<String> = picks.iter().map(|i| format!("stage_{}", i % n)).collect();
        let graph = StageGraph::build(stages.clone()).unwrap();
        let rebuilt = StageGraph::build(stages).unwrap();

        prop_assert_eq!(
            graph.resolve_order(&requested).unwrap(),
            rebuilt.resolve_order(&requested).unwrap()
        );
    }
}

#[test]
fn two_stage_cycle_names_both_stages() {
    let graph = StageGraph::build(vec![
        StageBuilder::new("A").dep("B").build(),
        StageBuilder::new("B").dep("A").build(),
    ])
    .unwrap();

    match graph.resolve_order(&["A"]) {
        Err(StagehandError::DagCycle { stage, dependency }) => {
            let named: HashSet<String> = [stage, dependency].into_iter().collect();
            assert_eq!(named, HashSet::from(["A".to_string(), "B".to_string()]));
        }
        other => panic!("Expected DagCycle, got: {:?}", other),
    }
}

#[test]
fn validate_style_build_order() {
    let graph = StageGraph::build(vec![
        StageBuilder::new("validate").build(),
        StageBuilder::new("style").dep("validate").build(),
        StageBuilder::new("build").dep("validate").dep("style").build(),
    ])
    .unwrap();

    assert_eq!(
        graph.resolve_order(&["build"]).unwrap(),
        vec!["validate", "style", "build"]
    );
    assert_eq!(
        graph.resolve_order(&["style", "validate"]).unwrap(),
        vec!["validate", "style"]
    );
}
