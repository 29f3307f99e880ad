// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DAG planning: graph construction, validation, and level scheduling.
//!
//! The graph maps each step id to the set of step ids it depends on.
//! Dependencies come from `inputs[].step`; an optional input pointing at a
//! step that is not part of the pipeline contributes no edge (it resolves to
//! "absent" at run time).

use kiln_core::Step;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

/// Planner errors.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("step {step} references unknown step {reference}")]
    UnknownReference { step: String, reference: String },

    #[error("cyclic dependency involving step {0}")]
    Cycle(String),

    #[error("unknown target step: {0}")]
    UnknownTarget(String),
}

impl PlanError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::Cycle(_) => "CYCLIC_DEPENDENCY",
            _ => "VALIDATION_ERROR",
        }
    }
}

/// Dependency graph: step id -> set of step ids it depends on.
///
/// BTree containers keep iteration deterministic, so plans and error
/// messages are stable across runs.
pub type Graph = BTreeMap<String, BTreeSet<String>>;

/// Build the dependency graph from resolved steps.
///
/// Duplicate ids fail immediately. Optional inputs referencing steps outside
/// the pipeline are dropped; required ones are kept and flagged by
/// [`validate_graph`].
pub fn build_graph(steps: &[Step]) -> Result<Graph, PlanError> {
    let ids: HashSet<&str> = {
        let mut ids = HashSet::new();
        for step in steps {
            if !ids.insert(step.id.as_str()) {
                return Err(PlanError::DuplicateStep(step.id.clone()));
            }
        }
        ids
    };

    let mut graph = Graph::new();
    for step in steps {
        let deps = graph.entry(step.id.clone()).or_default();
        for input in &step.inputs {
            if input.optional && !ids.contains(input.step.as_str()) {
                continue;
            }
            deps.insert(input.step.clone());
        }
    }
    Ok(graph)
}

/// Validate the graph: every referenced step exists and no cycles.
pub fn validate_graph(graph: &Graph) -> Result<(), PlanError> {
    for (step, deps) in graph {
        for dep in deps {
            if !graph.contains_key(dep) {
                return Err(PlanError::UnknownReference {
                    step: step.clone(),
                    reference: dep.clone(),
                });
            }
        }
    }

    // Tri-color DFS: white = unvisited, gray = on the current path,
    // black = fully explored.
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    fn visit(
        node: &str,
        graph: &Graph,
        colors: &mut BTreeMap<String, Color>,
    ) -> Result<(), PlanError> {
        match colors.get(node).copied().unwrap_or(Color::White) {
            Color::Black => return Ok(()),
            Color::Gray => return Err(PlanError::Cycle(node.to_string())),
            Color::White => {}
        }
        colors.insert(node.to_string(), Color::Gray);
        if let Some(deps) = graph.get(node) {
            for dep in deps {
                visit(dep, graph, colors)?;
            }
        }
        colors.insert(node.to_string(), Color::Black);
        Ok(())
    }

    let mut colors = BTreeMap::new();
    for node in graph.keys() {
        visit(node, graph, &mut colors)?;
    }
    Ok(())
}

/// Order the graph into execution levels.
///
/// Each level holds the nodes whose remaining in-degree is zero after
/// removing earlier levels; steps within a level may execute in parallel.
/// An empty graph produces zero levels.
pub fn topological_levels(graph: &Graph) -> Vec<Vec<String>> {
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = graph
        .iter()
        .map(|(node, deps)| {
            (
                node.as_str(),
                deps.iter().map(String::as_str).collect::<BTreeSet<&str>>(),
            )
        })
        .collect();

    let mut levels = Vec::new();
    while !remaining.is_empty() {
        let ready: Vec<String> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(node, _)| node.to_string())
            .collect();
        if ready.is_empty() {
            // Cycle: validate_graph reports it with a better message; stop
            // rather than loop forever.
            break;
        }
        for node in &ready {
            remaining.remove(node.as_str());
        }
        for deps in remaining.values_mut() {
            for node in &ready {
                deps.remove(node.as_str());
            }
        }
        levels.push(ready);
    }
    levels
}

/// Restrict the graph to the targets and all of their ancestors.
pub fn subgraph(graph: &Graph, targets: &[String]) -> Result<Graph, PlanError> {
    for target in targets {
        if !graph.contains_key(target) {
            return Err(PlanError::UnknownTarget(target.clone()));
        }
    }

    let mut keep: BTreeSet<String> = BTreeSet::new();
    let mut stack: Vec<String> = targets.to_vec();
    while let Some(node) = stack.pop() {
        if !keep.insert(node.clone()) {
            continue;
        }
        if let Some(deps) = graph.get(&node) {
            stack.extend(deps.iter().cloned());
        }
    }

    Ok(graph
        .iter()
        .filter(|(node, _)| keep.contains(node.as_str()))
        .map(|(node, deps)| (node.clone(), deps.clone()))
        .collect())
}

/// Nodes no other step depends on.
pub fn leaf_nodes(graph: &Graph) -> Vec<String> {
    let depended_on: BTreeSet<&String> = graph.values().flatten().collect();
    graph
        .keys()
        .filter(|node| !depended_on.contains(node))
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
