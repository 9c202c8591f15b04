//! Resource model: identity, declaration, and per-run state
//!
//! A [`ResourceDecl`] is what the caller hands over. The graph builder turns
//! each declaration into a [`Resource`], which additionally carries the
//! mutable per-run fields (`status`, `last_error`, ...).

use crate::error::AdapterError;
use crate::types::{ResourceKind, ResourceStatus, SkipReason, Spec, Verb};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Stable identifier of a resource within a run: family plus caller-supplied name.
///
/// Displayed and parsed as `kind/name`, e.g. `container/web`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('/')
            .ok_or_else(|| format!("resource id '{s}' is not of the form kind/name"))?;
        if name.is_empty() {
            return Err(format!("resource id '{s}' has an empty name"));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

impl TryFrom<String> for ResourceId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

/// A resource as declared by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub id: ResourceId,
    /// Desired configuration, treated as an immutable value for diffing
    pub spec: Spec,
    /// Resources that must be realised before this one
    #[serde(default)]
    pub depends_on: Vec<ResourceId>,
}

impl ResourceDecl {
    pub fn new(kind: ResourceKind, name: impl Into<String>, spec: Spec) -> Self {
        Self {
            id: ResourceId::new(kind, name),
            spec,
            depends_on: Vec::new(),
        }
    }

    /// Add a dependency (builder style)
    pub fn depends_on(mut self, dependency: ResourceId) -> Self {
        self.depends_on.push(dependency);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }
}

/// A named batch of declarations, e.g. one manifest file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub resources: Vec<ResourceDecl>,
}

impl ResourceGroup {
    pub fn new(name: impl Into<String>, resources: Vec<ResourceDecl>) -> Self {
        Self {
            name: name.into(),
            resources,
        }
    }
}

/// A resource owned by a [`ResourceGraph`](crate::graph::ResourceGraph) for one run
#[derive(Debug, Clone)]
pub struct Resource {
    pub decl: ResourceDecl,
    /// Group the declaration arrived in, if any
    pub group: Option<String>,
    /// Position in declaration order; used for deterministic tie-breaks
    pub ordinal: usize,
    status: ResourceStatus,
    verb: Option<Verb>,
    last_error: Option<AdapterError>,
    skip_reason: Option<SkipReason>,
    provider_id: Option<String>,
    attempts: u32,
    elapsed: Duration,
}

impl Resource {
    pub(crate) fn new(decl: ResourceDecl, group: Option<String>, ordinal: usize) -> Self {
        Self {
            decl,
            group,
            ordinal,
            status: ResourceStatus::Pending,
            verb: None,
            last_error: None,
            skip_reason: None,
            provider_id: None,
            attempts: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.decl.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.decl.id.kind
    }

    pub fn spec(&self) -> &Spec {
        &self.decl.spec
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    pub fn verb(&self) -> Option<Verb> {
        self.verb
    }

    /// Only present while the status is `Failed`
    pub fn last_error(&self) -> Option<&AdapterError> {
        self.last_error.as_ref()
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        self.skip_reason.as_ref()
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(crate) fn begin_evaluation(&mut self) {
        self.status = ResourceStatus::Evaluating;
    }

    /// Record the classified verb and move to its in-flight status
    pub(crate) fn classify(&mut self, verb: Verb) {
        self.verb = Some(verb);
        self.status = ResourceStatus::for_verb(verb);
    }

    pub(crate) fn set_provider_id(&mut self, provider_id: Option<String>) {
        if provider_id.is_some() {
            self.provider_id = provider_id;
        }
    }

    pub(crate) fn record_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }

    pub(crate) fn record_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    pub(crate) fn mark_applied(&mut self) {
        self.status = ResourceStatus::Applied;
        self.last_error = None;
        self.skip_reason = None;
    }

    pub(crate) fn mark_failed(&mut self, error: AdapterError) {
        self.status = ResourceStatus::Failed;
        self.last_error = Some(error);
        self.skip_reason = None;
    }

    pub(crate) fn mark_skipped(&mut self, reason: SkipReason) {
        self.status = ResourceStatus::Skipped;
        self.last_error = None;
        self.skip_reason = Some(reason);
    }

    /// The resource that ultimately caused this one to be unusable, if any.
    ///
    /// A failed resource is its own cause; a resource skipped because of an
    /// upstream failure points at that failure.
    pub(crate) fn failure_cause(&self) -> Option<&ResourceId> {
        match (&self.status, &self.skip_reason) {
            (ResourceStatus::Failed, _) => Some(self.id()),
            (ResourceStatus::Skipped, Some(SkipReason::UpstreamFailed { cause, .. })) => {
                Some(cause)
            }
            _ => None,
        }
    }
}
