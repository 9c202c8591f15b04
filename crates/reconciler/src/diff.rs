//! Diff computation for previews

use crate::resource::ResourceId;
use crate::types::{ResourceKind, Spec, Verb};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A pending change between observed and desired state of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub id: ResourceId,
    /// Group the resource was declared in
    pub group: Option<String>,
    /// Execution level the change would run in
    pub level: usize,
    pub verb: Verb,
    /// Desired spec as declared
    pub desired: Spec,
    /// Observed spec, `None` when the resource does not exist
    pub observed: Option<Spec>,
}

impl ResourceDiff {
    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.verb {
                Verb::Create => summary.creates += 1,
                Verb::Update => summary.updates += 1,
                Verb::Delete => summary.deletes += 1,
                Verb::NoOp => {}
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource kind
pub fn group_by_kind(diffs: &[ResourceDiff]) -> BTreeMap<ResourceKind, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<ResourceKind, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.kind()).or_default().push(diff);
    }
    groups
}
