//! The step graph — construction checks, validation, and topological order.
//!
//! Rules enforced:
//! 1. Step names are non-empty and unique within the graph.
//! 2. A step never depends on itself, and every dependency names a step in the graph.
//! 3. Read, update and delete steps carry an `id` param.
//! 4. Every value reference points at a step listed in the referencing step's `depends_on`.
//! 5. The dependency relation is acyclic.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::IndexMap;
use resources::ID_PARAM;
use serde::{Deserialize, Serialize, Serializer};

use crate::{models::Step, EngineError};

/// Insertion-ordered set of steps, unique by name.
///
/// Serialises as a JSON array of steps; deserialising goes through
/// [`Graph::from_steps`], so forward references load and are caught by
/// [`Graph::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Vec<Step>")]
pub struct Graph {
    steps: IndexMap<String, Step>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from loaded descriptors whose order is not guaranteed.
    ///
    /// Per-step checks run immediately; dependencies on steps that appear later
    /// in `steps` are allowed and only checked by [`Graph::validate`].
    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Result<Self, EngineError> {
        let mut graph = Self::new();
        for step in steps {
            check_step(&step)?;
            graph.insert(step)?;
        }
        Ok(graph)
    }

    /// Add a step whose dependencies are already in the graph.
    ///
    /// # Errors
    /// - [`EngineError::DuplicateStep`] if the name is taken.
    /// - [`EngineError::UnknownDependency`] if a dependency has not been added yet.
    /// - [`EngineError::SelfDependency`], [`EngineError::EmptyStepName`] and
    ///   [`EngineError::MissingResourceId`] for malformed steps.
    pub fn add_step(&mut self, step: Step) -> Result<&mut Self, EngineError> {
        check_step(&step)?;
        if self.steps.contains_key(&step.name) {
            return Err(EngineError::DuplicateStep(step.name));
        }
        if let Some(dependency) = step.depends_on.iter().find(|d| !self.steps.contains_key(*d)) {
            return Err(EngineError::UnknownDependency {
                step: step.name.clone(),
                dependency: dependency.clone(),
            });
        }
        self.insert(step)?;
        Ok(self)
    }

    fn insert(&mut self, step: Step) -> Result<(), EngineError> {
        if self.steps.contains_key(&step.name) {
            return Err(EngineError::DuplicateStep(step.name));
        }
        self.steps.insert(step.name.clone(), step);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    /// Steps in insertion order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check the whole graph. Run this before executing it.
    ///
    /// # Errors
    /// - [`EngineError::UnknownDependency`] if a dependency names no step.
    /// - [`EngineError::CyclicDependency`] if the graph is not acyclic.
    /// - [`EngineError::DanglingReference`] if a value reference's source step
    ///   is not a declared dependency.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.topological_order()?;

        for step in self.steps.values() {
            for (param, value_ref) in step.value_refs() {
                if !step.depends_on.contains(&value_ref.source_step) {
                    return Err(EngineError::DanglingReference {
                        step: step.name.clone(),
                        param: param.to_owned(),
                        source_step: value_ref.source_step.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Step names with every dependency before its dependents.
    ///
    /// Kahn's algorithm; among steps that are ready at the same time the one
    /// inserted first comes first, so the order is deterministic.
    pub fn topological_order(&self) -> Result<Vec<String>, EngineError> {
        let n = self.steps.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (idx, step) in self.steps.values().enumerate() {
            for dependency in &step.depends_on {
                let dep_idx = self.steps.get_index_of(dependency).ok_or_else(|| {
                    EngineError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                dependents[dep_idx].push(idx);
                in_degree[idx] += 1;
            }
        }

        // Min-heap on insertion index.
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut sorted: Vec<usize> = Vec::with_capacity(n);

        while let Some(Reverse(idx)) = ready.pop() {
            sorted.push(idx);
            for &next in &dependents[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        // Anything left over sits on or behind a cycle.
        if sorted.len() != n {
            let steps = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &d)| d > 0)
                .map(|(idx, _)| self.name_at(idx))
                .collect();
            return Err(EngineError::CyclicDependency { steps });
        }

        Ok(sorted.into_iter().map(|idx| self.name_at(idx)).collect())
    }

    fn name_at(&self, idx: usize) -> String {
        self.steps
            .get_index(idx)
            .map(|(name, _)| name.clone())
            .unwrap_or_default()
    }
}

impl Serialize for Graph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.steps.values())
    }
}

impl TryFrom<Vec<Step>> for Graph {
    type Error = EngineError;

    fn try_from(steps: Vec<Step>) -> Result<Self, Self::Error> {
        Self::from_steps(steps)
    }
}

fn check_step(step: &Step) -> Result<(), EngineError> {
    if step.name.is_empty() {
        return Err(EngineError::EmptyStepName);
    }
    if step.depends_on.contains(&step.name) {
        return Err(EngineError::SelfDependency(step.name.clone()));
    }
    if step.operation.requires_id() && !step.params.contains_key(ID_PARAM) {
        return Err(EngineError::MissingResourceId {
            step: step.name.clone(),
            operation: step.operation,
        });
    }
    Ok(())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValueRef;
    use resources::Operation;

    fn make_step(name: &str, deps: &[&str]) -> Step {
        deps.iter().fold(Step::create(name, "mock"), |s, d| s.after(*d))
    }

    #[test]
    fn linear_graph_returns_sorted_order() {
        // A → B → C
        let mut graph = Graph::new();
        graph
            .add_step(make_step("a", &[]))
            .and_then(|g| g.add_step(make_step("b", &["a"])))
            .and_then(|g| g.add_step(make_step("c", &["b"])))
            .expect("should be valid");

        graph.validate().expect("should be valid");
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_graph() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let graph = Graph::from_steps(vec![
            make_step("d", &["b", "c"]),
            make_step("a", &[]),
            make_step("c", &["a"]),
            make_step("b", &["a"]),
        ])
        .unwrap();

        let sorted = graph.topological_order().expect("should be valid");
        // Ties go to insertion order: 'c' was added before 'b'.
        assert_eq!(sorted, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn independent_steps_keep_insertion_order() {
        let graph = Graph::from_steps(vec![
            make_step("z", &[]),
            make_step("y", &["x"]),
            make_step("x", &[]),
            make_step("w", &[]),
        ])
        .unwrap();

        assert_eq!(graph.topological_order().unwrap(), vec!["z", "x", "y", "w"]);
    }

    #[test]
    fn duplicate_step_is_rejected() {
        let mut graph = Graph::new();
        graph.add_step(make_step("a", &[])).unwrap();
        assert!(matches!(
            graph.add_step(make_step("a", &[])),
            Err(EngineError::DuplicateStep(name)) if name == "a"
        ));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn duplicate_is_reported_before_unknown_dependency() {
        let mut graph = Graph::new();
        graph.add_step(make_step("a", &[])).unwrap();
        assert_eq!(
            graph.add_step(make_step("a", &["ghost"])).unwrap_err(),
            EngineError::DuplicateStep("a".into())
        );
    }

    #[test]
    fn add_step_rejects_dependency_not_yet_added() {
        let mut graph = Graph::new();
        assert!(matches!(
            graph.add_step(make_step("a", &["ghost"])),
            Err(EngineError::UnknownDependency { dependency, .. }) if dependency == "ghost"
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn from_steps_defers_unknown_dependency_to_validate() {
        let graph = Graph::from_steps(vec![make_step("a", &["ghost"])]).expect("deferred");
        assert!(matches!(
            graph.validate(),
            Err(EngineError::UnknownDependency { step, dependency })
                if step == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn self_dependency_is_rejected() {
        assert_eq!(
            Graph::from_steps(vec![make_step("a", &["a"])]).unwrap_err(),
            EngineError::SelfDependency("a".into())
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(
            Graph::new().add_step(make_step("", &[])).unwrap_err(),
            EngineError::EmptyStepName
        );
    }

    #[test]
    fn delete_without_id_is_rejected() {
        let step = Step::new("drop", Operation::Delete, "inspect_template");
        assert!(matches!(
            Graph::new().add_step(step),
            Err(EngineError::MissingResourceId { operation: Operation::Delete, .. })
        ));
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → A, with D hanging off C.
        let graph = Graph::from_steps(vec![
            make_step("a", &["c"]),
            make_step("b", &["a"]),
            make_step("c", &["b"]),
            make_step("d", &["c"]),
            make_step("free", &[]),
        ])
        .unwrap();

        match graph.validate() {
            Err(EngineError::CyclicDependency { steps }) => {
                assert!(steps.contains(&"a".to_string()));
                assert!(steps.contains(&"c".to_string()));
                assert!(!steps.contains(&"free".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn reference_outside_depends_on_is_dangling() {
        let graph = Graph::from_steps(vec![
            make_step("a", &[]),
            make_step("b", &[]),
            make_step("c", &["a"]).param("x", ValueRef::new("b", "name")),
        ])
        .unwrap();

        assert_eq!(
            graph.validate(),
            Err(EngineError::DanglingReference {
                step: "c".into(),
                param: "x".into(),
                source_step: "b".into(),
            })
        );
    }

    #[test]
    fn single_step_no_dependencies_is_valid() {
        let graph = Graph::from_steps(vec![make_step("solo", &[])]).unwrap();
        graph.validate().expect("single step should be valid");
        assert_eq!(graph.topological_order().unwrap(), vec!["solo"]);
    }

    #[test]
    fn graph_loads_from_json_descriptors() {
        let json = r#"[
            { "name": "create", "operation": "create", "resource_kind": "tpl",
              "params": { "id": { "literal": "t1" } } },
            { "name": "drop", "operation": "delete", "resource_kind": "tpl",
              "params": { "id": { "ref": { "source_step": "create", "field_path": "id" } } },
              "depends_on": ["create"] }
        ]"#;
        let steps: Vec<Step> = serde_json::from_str(json).unwrap();
        let graph = Graph::from_steps(steps).unwrap();

        graph.validate().unwrap();
        let drop = graph.get("drop").unwrap();
        assert_eq!(drop.value_refs().count(), 1);
    }

    #[test]
    fn graph_serialises_as_ordered_step_array() {
        let graph = Graph::from_steps(vec![
            make_step("b", &["a"]),
            make_step("a", &[]).param("id", ValueRef::new("b", "id")),
        ])
        .unwrap();

        let value = serde_json::to_value(&graph).unwrap();
        assert_eq!(value[0]["name"], "b");
        assert_eq!(value[1]["params"]["id"]["ref"]["source_step"], "b");

        let reloaded: Graph = serde_json::from_value(value).unwrap();
        let names: Vec<&str> = reloaded.steps().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(reloaded.get("a"), graph.get("a"));
    }

    #[test]
    fn deserialising_rejects_duplicate_steps() {
        let json = r#"[
            { "name": "a", "operation": "create", "resource_kind": "k" },
            { "name": "a", "operation": "create", "resource_kind": "k" }
        ]"#;
        let err = serde_json::from_str::<Graph>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate step name: 'a'"));
    }
}
