//! Reconciler - decides the action for one resource
//!
//! Reads observed state through the adapter (the only adapter call made
//! here), compares it with the desired spec, and classifies a [`Verb`]. It
//! also owns the containment rule: a resource whose neighbours on the
//! "must happen first" side did not succeed is skipped without touching its
//! adapter.

use crate::cancel::CancelHandle;
use crate::context::ProgressCallback;
use crate::graph::ResourceGraph;
use crate::provider::{ProviderAdapter, SharedAdapter};
use crate::resource::{Resource, ResourceId};
use crate::retry::{GaveUp, RetryPolicy, call_with_timeout, with_retry};
use crate::types::{Intent, ObservedState, SkipReason, Spec, Verb};
use std::sync::Arc;
use std::time::Duration;

/// Classified action plus the state it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub verb: Verb,
    pub observed: Option<ObservedState>,
}

/// Pure diff rule
///
/// | intent  | observed  | verb                        |
/// |---------|-----------|-----------------------------|
/// | apply   | not found | Create                      |
/// | apply   | found     | NoOp if equal, else Update  |
/// | destroy | found     | Delete                      |
/// | destroy | not found | NoOp                        |
pub fn classify(
    intent: Intent,
    adapter: &dyn ProviderAdapter,
    id: &ResourceId,
    desired: &Spec,
    observed: Option<&ObservedState>,
) -> Verb {
    match (intent, observed) {
        (Intent::Apply, None) => Verb::Create,
        (Intent::Apply, Some(state)) if adapter.diff(id, desired, state).equal => Verb::NoOp,
        (Intent::Apply, Some(_)) => Verb::Update,
        (Intent::Destroy, Some(_)) => Verb::Delete,
        (Intent::Destroy, None) => Verb::NoOp,
    }
}

/// Containment rule: should `idx` be skipped because of its neighbours?
///
/// Apply looks at dependencies, destroy at dependents (they are deleted
/// first, and deleting what a surviving dependent still uses would break
/// it). Returns the skip reason naming the root failure.
pub fn blocked_by(graph: &ResourceGraph, idx: usize, intent: Intent) -> Option<SkipReason> {
    let upstream = match intent {
        Intent::Apply => graph.dependencies(idx),
        Intent::Destroy => graph.dependents(idx),
    };

    upstream.iter().find_map(|&n| {
        let neighbour = graph.resource(n);
        neighbour
            .failure_cause()
            .map(|cause| SkipReason::UpstreamFailed {
                cause: cause.clone(),
                via: neighbour.id().clone(),
            })
    })
}

/// Evaluates resources: one logical read each, classified into a verb
pub struct Reconciler<'a> {
    pub intent: Intent,
    pub retry: &'a RetryPolicy,
    pub timeout: Option<Duration>,
    pub cancel: &'a CancelHandle,
    pub progress: &'a dyn ProgressCallback,
}

impl Reconciler<'_> {
    /// Read observed state and classify.
    ///
    /// Transient read failures are retried under the run's retry policy;
    /// on give-up the error and the number of read attempts are returned.
    pub fn evaluate(
        &self,
        adapter: &SharedAdapter,
        resource: &Resource,
    ) -> Result<Decision, (GaveUp, u32)> {
        let id = resource.id();
        let outcome = with_retry(
            self.retry,
            self.cancel,
            |attempt, err, delay| {
                self.progress
                    .on_retry(id, attempt, self.retry.max_attempts, err, delay);
            },
            |_| {
                let adapter = Arc::clone(adapter);
                let target = id.clone();
                call_with_timeout(self.timeout, &format!("read {id}"), move || {
                    adapter.read(&target)
                })
            },
        );

        let observed = outcome.result.map_err(|gave_up| (gave_up, outcome.attempts))?;
        let verb = classify(self.intent, adapter.as_ref(), id, resource.spec(), observed.as_ref());
        log::debug!(
            "{id}: {} -> {verb}",
            if observed.is_some() { "found" } else { "not found" }
        );
        Ok(Decision { verb, observed })
    }
}
