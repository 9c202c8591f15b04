//! Action executor - performs a classified action against its adapter
//!
//! Create/update/delete go through [`with_retry`] and the per-action
//! timeout; `NoOp` is recorded without any adapter call.

use crate::cancel::CancelHandle;
use crate::context::ProgressCallback;
use crate::error::AdapterError;
use crate::provider::SharedAdapter;
use crate::resource::{Resource, ResourceId};
use crate::retry::{GaveUp, RetryPolicy, call_with_timeout, with_retry};
use crate::types::Verb;
use std::sync::Arc;
use std::time::Duration;

/// How an action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Adapter call succeeded (or nothing to do)
    Succeeded {
        /// Identifier returned by `create`
        provider_id: Option<String>,
    },
    /// Permanent error, or transient errors past the retry ceiling
    Failed(AdapterError),
    /// Cancelled while backing off; carries the last transient error
    Cancelled(AdapterError),
}

/// One executed action; transient, only its facts reach the run report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub resource: ResourceId,
    pub verb: Verb,
    /// Adapter calls made, 0 for `NoOp`
    pub attempts: u32,
    pub outcome: ActionOutcome,
}

/// Performs actions with bounded retries and timeouts
pub struct ActionExecutor<'a> {
    pub retry: &'a RetryPolicy,
    pub timeout: Option<Duration>,
    pub cancel: &'a CancelHandle,
    pub progress: &'a dyn ProgressCallback,
}

impl ActionExecutor<'_> {
    pub fn execute(&self, adapter: &SharedAdapter, resource: &Resource, verb: Verb) -> Action {
        let id = resource.id();

        if verb == Verb::NoOp {
            return Action {
                resource: id.clone(),
                verb,
                attempts: 0,
                outcome: ActionOutcome::Succeeded { provider_id: None },
            };
        }

        let label = format!("{verb} {id}");
        let outcome = with_retry(
            self.retry,
            self.cancel,
            |attempt, err, delay| {
                self.progress
                    .on_retry(id, attempt, self.retry.max_attempts, err, delay);
            },
            |attempt| {
                log::debug!("{label}: attempt {attempt}");
                let adapter = Arc::clone(adapter);
                let target = id.clone();
                let spec = resource.spec().clone();
                call_with_timeout(self.timeout, &label, move || match verb {
                    Verb::Create => adapter.create(&target, &spec).map(Some),
                    Verb::Update => adapter.update(&target, &spec).map(|()| None),
                    Verb::Delete => adapter.delete(&target).map(|()| None),
                    Verb::NoOp => Ok(None),
                })
            },
        );

        let outcome_kind = match outcome.result {
            Ok(provider_id) => ActionOutcome::Succeeded { provider_id },
            Err(GaveUp::Cancelled(err)) => ActionOutcome::Cancelled(err),
            Err(gave_up) => {
                if let GaveUp::Exhausted(err) = &gave_up {
                    log::warn!("{label}: giving up after {} attempts: {err}", outcome.attempts);
                }
                ActionOutcome::Failed(gave_up.into_error())
            }
        };

        Action {
            resource: id.clone(),
            verb,
            attempts: outcome.attempts,
            outcome: outcome_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::error::ErrorCategory;
    use crate::graph::ResourceGraph;
    use crate::provider::ProviderAdapter;
    use crate::resource::ResourceDecl;
    use crate::types::{ObservedState, ResourceKind, Spec};
    use serde_json::json;
    use std::sync::Mutex;

    /// Adapter that replays scripted create results and counts calls
    struct Scripted {
        create_results: Mutex<Vec<Result<String, AdapterError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(mut results: Vec<Result<String, AdapterError>>) -> Self {
            results.reverse();
            Self {
                create_results: Mutex::new(results),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProviderAdapter for Scripted {
        fn read(&self, _id: &ResourceId) -> Result<Option<ObservedState>, AdapterError> {
            Ok(None)
        }
        fn create(&self, id: &ResourceId, _spec: &Spec) -> Result<String, AdapterError> {
            self.calls.lock().unwrap().push(format!("create {id}"));
            self.create_results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("default".into()))
        }
        fn update(&self, id: &ResourceId, _spec: &Spec) -> Result<(), AdapterError> {
            self.calls.lock().unwrap().push(format!("update {id}"));
            Ok(())
        }
        fn delete(&self, id: &ResourceId) -> Result<(), AdapterError> {
            self.calls.lock().unwrap().push(format!("delete {id}"));
            Ok(())
        }
    }

    fn resource() -> Resource {
        let graph = ResourceGraph::build(vec![ResourceDecl::new(
            ResourceKind::Container,
            "web",
            json!({"image": "app:1"}),
        )])
        .unwrap();
        graph.resource(0).clone()
    }

    fn run(adapter: &Arc<Scripted>, verb: Verb, max_attempts: u32) -> Action {
        let retry = RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5));
        let cancel = CancelHandle::new();
        let executor = ActionExecutor {
            retry: &retry,
            timeout: None,
            cancel: &cancel,
            progress: &NoProgress,
        };
        let shared: SharedAdapter = adapter.clone();
        executor.execute(&shared, &resource(), verb)
    }

    #[test]
    fn test_noop_makes_no_call() {
        let adapter = Arc::new(Scripted::new(vec![]));
        let action = run(&adapter, Verb::NoOp, 3);
        assert!(matches!(action.outcome, ActionOutcome::Succeeded { .. }));
        assert_eq!(action.attempts, 0);
        assert!(adapter.calls().is_empty());
    }

    #[test]
    fn test_create_returns_provider_id() {
        let adapter = Arc::new(Scripted::new(vec![Ok("c-123".into())]));
        let action = run(&adapter, Verb::Create, 3);
        assert_eq!(
            action.outcome,
            ActionOutcome::Succeeded {
                provider_id: Some("c-123".into())
            }
        );
        assert_eq!(action.attempts, 1);
    }

    #[test]
    fn test_transient_failures_retried_until_success() {
        let adapter = Arc::new(Scripted::new(vec![
            Err(AdapterError::new(ErrorCategory::RateLimited, "429")),
            Err(AdapterError::new(ErrorCategory::Conflict, "409")),
            Ok("c-1".into()),
        ]));
        let action = run(&adapter, Verb::Create, 3);
        assert!(matches!(action.outcome, ActionOutcome::Succeeded { .. }));
        assert_eq!(action.attempts, 3);
        assert_eq!(adapter.calls().len(), 3);
    }

    #[test]
    fn test_permanent_failure_fails_immediately() {
        let adapter = Arc::new(Scripted::new(vec![Err(AdapterError::new(
            ErrorCategory::Unauthorized,
            "403",
        ))]));
        let action = run(&adapter, Verb::Create, 5);
        assert!(matches!(action.outcome, ActionOutcome::Failed(ref e) if e.category == ErrorCategory::Unauthorized));
        assert_eq!(action.attempts, 1);
    }

    #[test]
    fn test_update_and_delete_dispatch() {
        let adapter = Arc::new(Scripted::new(vec![]));
        assert!(matches!(run(&adapter, Verb::Update, 1).outcome, ActionOutcome::Succeeded { .. }));
        assert!(matches!(run(&adapter, Verb::Delete, 1).outcome, ActionOutcome::Succeeded { .. }));
        assert_eq!(
            adapter.calls(),
            vec!["update container/web".to_string(), "delete container/web".to_string()]
        );
    }
}
