// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Job graph
//!
//! The validated DAG of stages a run walks. Construction rejects duplicate
//! names, unknown dependencies, ambiguous artifact producers and cycles, so a
//! `JobGraph` value always has a topological order.

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use crate::errors::{ShiplineError, ShiplineResult};
use crate::pipeline::Stage;
use crate::trigger::TriggerContext;

/// Validated stage DAG
#[derive(Debug, Clone)]
pub struct JobGraph {
    stages: Vec<Stage>,
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    order: Vec<usize>,
}

/// Static prediction of whether a stage runs for a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub name: String,
    pub runs: bool,
    pub reason: Option<String>,
}

impl JobGraph {
    /// Build and validate a graph
    ///
    /// Consuming an artifact adds an implicit edge from its producer.
    pub fn new(stages: Vec<Stage>) -> ShiplineResult<Self> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for (idx, stage) in stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(ShiplineError::InvalidStage {
                    stage: stage.name.clone(),
                    reason: "stage name is empty".into(),
                });
            }
            let node = graph.add_node(idx);
            if name_to_index.insert(stage.name.clone(), node).is_some() {
                return Err(ShiplineError::DuplicateStage {
                    stage: stage.name.clone(),
                });
            }
        }

        // Each artifact key has exactly one producer
        let mut producers: HashMap<&str, &str> = HashMap::new();
        for stage in &stages {
            for output in &stage.produces {
                if let Some(existing) = producers.insert(&output.key, &stage.name) {
                    return Err(ShiplineError::DuplicateArtifact {
                        key: output.key.clone(),
                        existing: existing.to_string(),
                    });
                }
            }
        }

        for stage in &stages {
            let stage_node = name_to_index[&stage.name];

            for dep_name in &stage.depends_on {
                let dep_node = name_to_index.get(dep_name).ok_or_else(|| {
                    ShiplineError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dep_name.clone(),
                    }
                })?;
                if !graph.contains_edge(*dep_node, stage_node) {
                    graph.add_edge(*dep_node, stage_node, ());
                }
            }

            for key in &stage.consumes {
                let producer = producers.get(key.as_str()).ok_or_else(|| {
                    ShiplineError::InvalidStage {
                        stage: stage.name.clone(),
                        reason: format!("consumes artifact '{}' that no stage produces", key),
                    }
                })?;
                let dep_node = name_to_index[*producer];
                if !graph.contains_edge(dep_node, stage_node) {
                    graph.add_edge(dep_node, stage_node, ());
                }
            }
        }

        let order = match toposort(&graph, None) {
            Ok(nodes) => nodes.into_iter().map(|n| graph[n]).collect(),
            Err(_) => {
                return Err(ShiplineError::CyclicGraph {
                    stages: Self::cycle_members(&graph, &stages),
                })
            }
        };

        Ok(Self {
            stages,
            graph,
            name_to_index,
            order,
        })
    }

    /// Names along one cycle, first name repeated at the end
    fn cycle_members(graph: &DiGraph<usize, ()>, stages: &[Stage]) -> Vec<String> {
        let component = tarjan_scc(graph)
            .into_iter()
            .find(|c| c.len() > 1 || graph.contains_edge(c[0], c[0]))
            .unwrap_or_default();

        let mut members: Vec<usize> = component.iter().map(|n| graph[*n]).collect();
        members.sort_unstable();

        let mut names: Vec<String> = members.iter().map(|i| stages[*i].name.clone()).collect();
        if let Some(first) = names.first().cloned() {
            names.push(first);
        }
        names
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.index_of(name).map(|i| &self.stages[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).map(|n| self.graph[*n])
    }

    /// Stage indices in a topological order
    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }

    pub fn topological_order_names(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|i| self.stages[*i].name.clone())
            .collect()
    }

    /// Direct dependencies (declared and implicit) of a stage
    pub fn dependencies(&self, stage_name: &str) -> Option<Vec<String>> {
        self.neighbors(stage_name, Direction::Incoming)
    }

    /// Stages that depend directly on a stage
    pub fn dependents(&self, stage_name: &str) -> Option<Vec<String>> {
        self.neighbors(stage_name, Direction::Outgoing)
    }

    /// Direct dependencies of the stage at `idx`, as indices
    pub fn dependency_indices(&self, idx: usize) -> Vec<usize> {
        let Some(node) = self
            .stages
            .get(idx)
            .and_then(|s| self.name_to_index.get(&s.name))
        else {
            return Vec::new();
        };
        let mut indices: Vec<usize> = self
            .graph
            .neighbors_directed(*node, Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        indices.sort_unstable();
        indices
    }

    fn neighbors(&self, stage_name: &str, direction: Direction) -> Option<Vec<String>> {
        let node = self.name_to_index.get(stage_name)?;
        let mut indices: Vec<usize> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.graph[n])
            .collect();
        indices.sort_unstable();
        Some(indices.into_iter().map(|i| self.stages[i].name.clone()).collect())
    }

    /// Every stage reachable from `stage_name`, as indices
    pub fn transitive_dependents(&self, stage_name: &str) -> Vec<usize> {
        let Some(start) = self.name_to_index.get(stage_name) else {
            return Vec::new();
        };

        let mut dfs = Dfs::new(&self.graph, *start);
        let mut reached = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            if node != *start {
                reached.push(self.graph[node]);
            }
        }
        reached.sort_unstable();
        reached
    }

    /// Check if stage A depends (directly or transitively) on stage B
    pub fn depends_on(&self, stage_a: &str, stage_b: &str) -> bool {
        let (Some(node_a), Some(node_b)) = (
            self.name_to_index.get(stage_a),
            self.name_to_index.get(stage_b),
        ) else {
            return false;
        };
        node_a != node_b && has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    /// Stages grouped by longest-path depth; each level only needs earlier ones
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut depth = vec![0usize; self.stages.len()];
        for &idx in &self.order {
            let node = self.name_to_index[&self.stages[idx].name];
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let next_idx = self.graph[next];
                depth[next_idx] = depth[next_idx].max(depth[idx] + 1);
            }
        }

        let max = depth.iter().copied().max().unwrap_or(0);
        let mut levels = vec![Vec::new(); if self.stages.is_empty() { 0 } else { max + 1 }];
        for (idx, stage) in self.stages.iter().enumerate() {
            levels[depth[idx]].push(stage.name.clone());
        }
        levels
    }

    /// Predict which stages run for `ctx` when every collaborator succeeds
    pub fn plan(&self, ctx: &TriggerContext) -> Vec<PlannedStage> {
        let mut produced: HashSet<&str> = HashSet::new();
        let mut planned = Vec::with_capacity(self.stages.len());

        for &idx in &self.order {
            let stage = &self.stages[idx];

            let reason = if !stage.condition.holds(ctx) {
                Some(format!("condition: {}", stage.condition))
            } else {
                stage
                    .consumes
                    .iter()
                    .find(|k| !produced.contains(k.as_str()))
                    .map(|k| format!("artifact '{}' will not be produced", k))
            };

            if reason.is_none() {
                produced.extend(stage.produces.iter().map(|o| o.key.as_str()));
            }

            planned.push(PlannedStage {
                name: stage.name.clone(),
                runs: reason.is_none(),
                reason,
            });
        }

        planned
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for stage in &self.stages {
            out.push_str(&format!("    {}[{}]\n", stage.name, stage.name));
        }

        for edge in self.graph.raw_edges() {
            let from = &self.stages[self.graph[edge.source()]].name;
            let to = &self.stages[self.graph[edge.target()]].name;
            out.push_str(&format!("    {} --> {}\n", from, to));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for edge in self.graph.raw_edges() {
            let from = &self.stages[self.graph[edge.source()]].name;
            let to = &self.stages[self.graph[edge.target()]].name;
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
        }

        for stage in &self.stages {
            let node = self.name_to_index[&stage.name];
            if self.graph.neighbors_undirected(node).count() == 0 {
                out.push_str(&format!("    \"{}\";\n", stage.name));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        for (i, &idx) in self.order.iter().enumerate() {
            let stage = &self.stages[idx];
            let deps = self.dependencies(&stage.name).unwrap_or_default();

            out.push_str(&format!("{}. {} ({})", i + 1, stage.name, stage.tool_name()));

            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }
            if stage.condition != crate::conditions::RunCondition::Always {
                out.push_str(&format!(" [runs: {}]", stage.condition));
            }

            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::RunCondition;

    fn graph(stages: Vec<(&str, Vec<&str>)>) -> ShiplineResult<JobGraph> {
        JobGraph::new(
            stages
                .into_iter()
                .map(|(name, deps)| Stage::shell(name, "true").depends_on(&deps))
                .collect(),
        )
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_linear_dag() {
        let dag = graph(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]).unwrap();
        assert_eq!(dag.topological_order_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond_dag() {
        let dag = graph(vec![
            ("lint", vec![]),
            ("build", vec!["lint"]),
            ("test", vec!["lint"]),
            ("containerize", vec!["build", "test"]),
        ])
        .unwrap();
        let order = dag.topological_order_names();

        assert_eq!(order[0], "lint");
        assert_eq!(order[3], "containerize");
        assert_eq!(
            dag.levels(),
            vec![
                vec!["lint".to_string()],
                vec!["build".to_string(), "test".to_string()],
                vec!["containerize".to_string()],
            ]
        );
    }

    #[test]
    fn test_cycle_detection() {
        let result = graph(vec![("a", vec!["c"]), ("b", vec!["a"]), ("c", vec!["b"])]);
        match result {
            Err(ShiplineError::CyclicGraph { stages }) => {
                assert_eq!(stages, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        assert!(matches!(
            graph(vec![("a", vec!["a"])]),
            Err(ShiplineError::CyclicGraph { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        assert!(matches!(
            graph(vec![("a", vec!["nonexistent"])]),
            Err(ShiplineError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_stage_name() {
        assert!(matches!(
            graph(vec![("a", vec![]), ("a", vec![])]),
            Err(ShiplineError::DuplicateStage { .. })
        ));
    }

    #[test]
    fn test_duplicate_producer_rejected() {
        let result = JobGraph::new(vec![
            Stage::shell("a", "true").produces("image", "a.tar"),
            Stage::shell("b", "true").produces("image", "b.tar"),
        ]);
        assert!(matches!(result, Err(ShiplineError::DuplicateArtifact { .. })));
    }

    #[test]
    fn test_consumer_without_producer_rejected() {
        let result = JobGraph::new(vec![Stage::shell("scan", "true").consumes("image")]);
        assert!(matches!(result, Err(ShiplineError::InvalidStage { .. })));
    }

    #[test]
    fn test_consumes_adds_implicit_edge() {
        let dag = JobGraph::new(vec![
            Stage::shell("scan", "true").consumes("image"),
            Stage::shell("containerize", "true").produces("image", "image.tar"),
        ])
        .unwrap();

        let order = dag.topological_order_names();
        assert!(position(&order, "containerize") < position(&order, "scan"));
        assert_eq!(dag.dependencies("scan").unwrap(), vec!["containerize"]);
    }

    #[test]
    fn test_depends_on_check() {
        let dag = graph(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]).unwrap();

        assert!(dag.depends_on("c", "a"));
        assert!(dag.depends_on("c", "b"));
        assert!(!dag.depends_on("a", "c"));
        assert!(!dag.depends_on("a", "a"));
    }

    #[test]
    fn test_transitive_dependents() {
        let dag = graph(vec![
            ("lint", vec![]),
            ("build", vec!["lint"]),
            ("test", vec!["lint"]),
            ("containerize", vec!["build", "test"]),
            ("docs", vec![]),
        ])
        .unwrap();

        let names: Vec<&str> = dag
            .transitive_dependents("build")
            .into_iter()
            .map(|i| dag.stages()[i].name.as_str())
            .collect();
        assert_eq!(names, vec!["containerize"]);
        assert_eq!(dag.transitive_dependents("lint").len(), 3);
        assert!(dag.transitive_dependents("docs").is_empty());
    }

    #[test]
    fn test_plan_skips_conditional_chain() {
        let dag = JobGraph::new(vec![
            Stage::shell("containerize", "true").produces("image", "image.tar"),
            Stage::shell("publish", "true")
                .consumes("image")
                .with_condition(RunCondition::NotProposedChange),
            Stage::shell("notify", "true").depends_on(&["publish"]),
        ])
        .unwrap();

        let ctx = TriggerContext::proposed_change("1", "main", "abc1234").unwrap();
        let plan = dag.plan(&ctx);
        let publish = plan.iter().find(|p| p.name == "publish").unwrap();
        let notify = plan.iter().find(|p| p.name == "notify").unwrap();

        assert!(!publish.runs);
        assert!(notify.runs);
    }

    #[test]
    fn test_mermaid_output() {
        let dag = graph(vec![("a", vec![]), ("b", vec!["a"])]).unwrap();
        let mermaid = dag.to_mermaid();

        assert!(mermaid.contains("graph TD"));
        assert!(mermaid.contains("a --> b"));
    }

    #[test]
    fn test_text_output() {
        let dag = graph(vec![("a", vec![]), ("b", vec!["a"])]).unwrap();
        assert_eq!(dag.to_text(), "1. a (shell)\n2. b (shell) [depends: a]\n");
    }
}
