//! Graph builder - turns declarations into a validated dependency DAG
//!
//! Resources live in an arena (`Vec<Resource>`) and edges are stored as
//! index lists in both directions, so traversal never chases pointers and
//! iteration order always matches declaration order.

use crate::error::StructuralError;
use crate::resource::{Resource, ResourceDecl, ResourceGroup, ResourceId};
use std::collections::HashMap;

/// All resources of one run plus the derived adjacency
///
/// Structure is immutable once built; only per-resource status fields change
/// during execution.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
    /// `dependencies[i]`: resources `i` depends on
    dependencies: Vec<Vec<usize>>,
    /// `dependents[i]`: resources that depend on `i`
    dependents: Vec<Vec<usize>>,
}

impl ResourceGraph {
    /// Build a graph from a flat list of declarations
    pub fn build(decls: impl IntoIterator<Item = ResourceDecl>) -> Result<Self, StructuralError> {
        let mut builder = GraphBuilder::new();
        builder.extend(decls);
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, idx: usize) -> &Resource {
        &self.resources[idx]
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index_of(id).map(|idx| &self.resources[idx])
    }

    pub fn index_of(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn dependencies(&self, idx: usize) -> &[usize] {
        &self.dependencies[idx]
    }

    pub fn dependents(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    pub(crate) fn resource_mut(&mut self, idx: usize) -> &mut Resource {
        &mut self.resources[idx]
    }

    /// Disjoint mutable borrows of the given resources, in the order given.
    ///
    /// Each index must appear at most once.
    pub(crate) fn resources_mut(&mut self, indices: &[usize]) -> Vec<&mut Resource> {
        let mut slots: Vec<Option<&mut Resource>> = self.resources.iter_mut().map(Some).collect();
        indices
            .iter()
            .filter_map(|&idx| slots.get_mut(idx).and_then(Option::take))
            .collect()
    }

    /// Mark `roots` and everything reachable by following `edges`
    fn closure(&self, roots: &[usize], edges: &[Vec<usize>]) -> Vec<bool> {
        let mut seen = vec![false; self.len()];
        let mut stack: Vec<usize> = roots.to_vec();
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            stack.extend(edges[idx].iter().copied().filter(|&n| !seen[n]));
        }
        seen
    }

    /// `roots` plus all of their transitive dependencies
    pub fn dependency_closure(&self, roots: &[usize]) -> Vec<bool> {
        self.closure(roots, &self.dependencies)
    }

    /// `roots` plus all of their transitive dependents
    pub fn dependent_closure(&self, roots: &[usize]) -> Vec<bool> {
        self.closure(roots, &self.dependents)
    }
}

/// Collects declarations (flat or grouped) and validates them into a graph
#[derive(Debug, Default)]
pub struct GraphBuilder {
    entries: Vec<(ResourceDecl, Option<String>)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, decl: ResourceDecl) -> &mut Self {
        self.entries.push((decl, None));
        self
    }

    pub fn add_group(&mut self, group: ResourceGroup) -> &mut Self {
        let ResourceGroup { name, resources } = group;
        self.entries
            .extend(resources.into_iter().map(|decl| (decl, Some(name.clone()))));
        self
    }

    pub fn extend(&mut self, decls: impl IntoIterator<Item = ResourceDecl>) -> &mut Self {
        self.entries
            .extend(decls.into_iter().map(|decl| (decl, None)));
        self
    }

    /// Validate and build.
    ///
    /// Checks, in order: unique ids, resolvable dependencies, no cycles.
    pub fn build(self) -> Result<ResourceGraph, StructuralError> {
        let mut index = HashMap::with_capacity(self.entries.len());
        for (ordinal, (decl, _)) in self.entries.iter().enumerate() {
            if index.insert(decl.id.clone(), ordinal).is_some() {
                return Err(StructuralError::DuplicateResource {
                    id: decl.id.clone(),
                });
            }
        }

        let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(self.entries.len());
        for (decl, _) in &self.entries {
            let mut deps = Vec::with_capacity(decl.depends_on.len());
            for dep in &decl.depends_on {
                let Some(&dep_idx) = index.get(dep) else {
                    return Err(StructuralError::UnknownDependency {
                        resource: decl.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                if !deps.contains(&dep_idx) {
                    deps.push(dep_idx);
                }
            }
            dependencies.push(deps);
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.entries.len()];
        for (idx, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(idx);
            }
        }

        let resources: Vec<Resource> = self
            .entries
            .into_iter()
            .enumerate()
            .map(|(ordinal, (decl, group))| Resource::new(decl, group, ordinal))
            .collect();

        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(StructuralError::CyclicDependency {
                cycle: cycle
                    .into_iter()
                    .map(|idx| resources[idx].id().clone())
                    .collect(),
            });
        }

        log::debug!("built resource graph with {} resources", resources.len());

        Ok(ResourceGraph {
            resources,
            index,
            dependencies,
            dependents,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search tracking in-progress nodes.
///
/// Returns the members of the first cycle found (in declaration-order DFS),
/// listed so that each member depends on the next and the last depends on
/// the first.
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; dependencies.len()];
    // (node, index of the next dependency to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..dependencies.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        marks[start] = Mark::InProgress;
        stack.push((start, 0));

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if let Some(&dep) = dependencies[node].get(top.1) {
                top.1 += 1;
                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::InProgress;
                        stack.push((dep, 0));
                    }
                    Mark::InProgress => {
                        let from = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                        return Some(stack[from..].iter().map(|&(n, _)| n).collect());
                    }
                    Mark::Done => {}
                }
            } else {
                marks[node] = Mark::Done;
                stack.pop();
            }
        }
    }

    None
}
