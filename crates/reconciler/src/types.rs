//! Core types for dependency-graph reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::resource::ResourceId;

/// Desired or observed configuration payload of a resource.
///
/// Opaque to the engine; only adapters and the family normalizer look inside.
pub type Spec = serde_json::Value;

/// Closed set of resource families the engine can manage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Container image
    Image,
    /// Running container
    Container,
    /// Orchestration manifest object
    ClusterObject,
    /// Managed cloud resource
    CloudObject,
}

impl ResourceKind {
    /// All families, in a stable order
    pub const ALL: [ResourceKind; 4] = [
        Self::Image,
        Self::Container,
        Self::ClusterObject,
        Self::CloudObject,
    ];

    /// Canonical text form (`image`, `container`, `cluster-object`, `cloud-object`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Container => "container",
            Self::ClusterObject => "cluster-object",
            Self::CloudObject => "cloud-object",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind '{s}'"))
    }
}

/// What a run is trying to achieve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Converge every resource to its desired spec
    Apply,
    /// Remove every resource, dependents first
    Destroy,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => f.write_str("apply"),
            Self::Destroy => f.write_str("destroy"),
        }
    }
}

/// Action classified by the reconciler for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    Update,
    Delete,
    NoOp,
}

impl Verb {
    /// Whether this verb calls into the adapter
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }

    /// Single-character marker used in plan and diff listings
    pub fn symbol(&self) -> char {
        match self {
            Self::Create => '+',
            Self::Update => '~',
            Self::Delete => '-',
            Self::NoOp => '=',
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
            Self::NoOp => f.write_str("no-op"),
        }
    }
}

/// Lifecycle status of a resource within one run
///
/// `Pending -> Evaluating -> {NoOp | Creating | Updating | Deleting} -> {Applied | Failed | Skipped}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Pending,
    Evaluating,
    NoOp,
    Creating,
    Updating,
    Deleting,
    Applied,
    Failed,
    Skipped,
}

impl ResourceStatus {
    /// In-flight status for a classified verb
    pub fn for_verb(verb: Verb) -> Self {
        match verb {
            Verb::Create => Self::Creating,
            Verb::Update => Self::Updating,
            Verb::Delete => Self::Deleting,
            Verb::NoOp => Self::NoOp,
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Evaluating => "evaluating",
            Self::NoOp => "no-op",
            Self::Creating => "creating",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Why a resource ended up `Skipped`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A resource this one is ordered after did not succeed.
    ///
    /// `cause` is the resource that actually failed, `via` the direct
    /// neighbour through which the skip reached this resource.
    UpstreamFailed { cause: ResourceId, via: ResourceId },
    /// The run was cancelled before this resource started
    Cancelled,
    /// Dry run: classified, never executed
    DryRun,
}

impl SkipReason {
    /// Whether this skip must also skip resources ordered after it
    pub fn propagates(&self) -> bool {
        matches!(self, Self::UpstreamFailed { .. })
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpstreamFailed { cause, via } if cause == via => {
                write!(f, "upstream {cause} failed")
            }
            Self::UpstreamFailed { cause, via } => {
                write!(f, "upstream {cause} failed (via {via})")
            }
            Self::Cancelled => f.write_str("run cancelled"),
            Self::DryRun => f.write_str("dry run"),
        }
    }
}

/// State of a resource as reported by its provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    /// Provider-assigned identifier, if the provider has one
    pub provider_id: Option<String>,
    /// Observed configuration
    pub spec: Spec,
}

impl ObservedState {
    pub fn new(spec: Spec) -> Self {
        Self {
            provider_id: None,
            spec,
        }
    }

    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }
}
