//! Scheduler - orders a resource graph into execution levels
//!
//! Apply order is topological levelling: level 0 holds resources with no
//! dependencies, level k those whose dependencies all sit in levels < k.
//! Destroy order is the same levels reversed, so dependents go first.
//! Within a level resources keep declaration order.

use crate::error::StructuralError;
use crate::graph::ResourceGraph;
use crate::resource::ResourceId;
use crate::types::{Intent, ResourceKind};

/// Ordered execution levels for one intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    intent: Intent,
    /// Graph indices per level, in execution order
    levels: Vec<Vec<usize>>,
    /// Execution level of each graph index, `None` if not selected
    level_of: Vec<Option<usize>>,
}

impl ExecutionPlan {
    /// Schedule every resource of the graph
    pub fn new(graph: &ResourceGraph, intent: Intent) -> Result<Self, StructuralError> {
        Self::schedule(graph, intent, &vec![true; graph.len()])
    }

    /// Schedule only the resources matched by `targets` plus what they need.
    ///
    /// Target format: `kind` or `kind/name`. Apply pulls in transitive
    /// dependencies, destroy pulls in transitive dependents. An empty target
    /// list selects everything.
    pub fn for_targets(
        graph: &ResourceGraph,
        intent: Intent,
        targets: &[String],
    ) -> Result<Self, StructuralError> {
        if targets.is_empty() {
            return Self::new(graph, intent);
        }

        let mut roots = Vec::new();
        for target in targets {
            let (kind, name) = parse_target(target)?;
            let before = roots.len();
            roots.extend(
                graph
                    .resources()
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| matches_target(r.id(), kind, name.as_deref()))
                    .map(|(idx, _)| idx),
            );
            if roots.len() == before {
                return Err(StructuralError::UnknownTarget {
                    target: target.clone(),
                });
            }
        }

        let selected = match intent {
            Intent::Apply => graph.dependency_closure(&roots),
            Intent::Destroy => graph.dependent_closure(&roots),
        };
        Self::schedule(graph, intent, &selected)
    }

    fn schedule(
        graph: &ResourceGraph,
        intent: Intent,
        selected: &[bool],
    ) -> Result<Self, StructuralError> {
        // Kahn's algorithm, one wave at a time; each wave is a level.
        let mut remaining: Vec<usize> = (0..graph.len())
            .map(|idx| {
                graph
                    .dependencies(idx)
                    .iter()
                    .filter(|&&dep| selected[dep])
                    .count()
            })
            .collect();

        let mut level_of = vec![None; graph.len()];
        let mut levels: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = (0..graph.len())
            .filter(|&idx| selected[idx] && remaining[idx] == 0)
            .collect();
        let mut scheduled = 0;

        while !current.is_empty() {
            let mut next = Vec::new();
            for &idx in &current {
                level_of[idx] = Some(levels.len());
                for &dependent in graph.dependents(idx) {
                    if !selected[dependent] {
                        continue;
                    }
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            // Indices are declaration ordinals, so sorting restores declaration order.
            next.sort_unstable();
            scheduled += current.len();
            levels.push(std::mem::replace(&mut current, next));
        }

        let wanted = selected.iter().filter(|&&s| s).count();
        if scheduled != wanted {
            let stuck: Vec<ResourceId> = (0..graph.len())
                .filter(|&idx| selected[idx] && level_of[idx].is_none())
                .map(|idx| graph.resource(idx).id().clone())
                .collect();
            log::error!("scheduler found a cycle the graph builder should have rejected");
            return Err(StructuralError::CyclicDependency { cycle: stuck });
        }

        if intent == Intent::Destroy {
            levels.reverse();
            let depth = levels.len();
            for level in level_of.iter_mut().flatten() {
                *level = depth - 1 - *level;
            }
        }

        Ok(Self {
            intent,
            levels,
            level_of,
        })
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Graph indices per level, in execution order
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    /// Execution level of a graph index, if it is part of this plan
    pub fn level_of(&self, idx: usize) -> Option<usize> {
        self.level_of.get(idx).copied().flatten()
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.level_of(idx).is_some()
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels expressed as resource ids
    pub fn level_ids(&self, graph: &ResourceGraph) -> Vec<Vec<ResourceId>> {
        self.levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(|&idx| graph.resource(idx).id().clone())
                    .collect()
            })
            .collect()
    }
}

/// Parse a target string like "kind/name" into (kind, name)
fn parse_target(target: &str) -> Result<(ResourceKind, Option<String>), StructuralError> {
    let invalid = |reason: String| StructuralError::InvalidTarget {
        target: target.to_string(),
        reason,
    };

    let (kind, name) = match target.split_once('/') {
        Some((kind, name)) if !name.is_empty() => (kind, Some(name.to_string())),
        Some(_) => return Err(invalid("empty name".to_string())),
        None => (target, None),
    };
    Ok((kind.parse().map_err(invalid)?, name))
}

/// Check if a resource matches the filter criteria
fn matches_target(id: &ResourceId, kind: ResourceKind, name: Option<&str>) -> bool {
    id.kind == kind && name.is_none_or(|n| id.name == n)
}
