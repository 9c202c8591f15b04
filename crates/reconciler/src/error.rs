//! Error types for reconciliation runs.
//!
//! Structural errors are fatal and surface before any adapter call. Adapter
//! errors are contained per resource; their category decides whether the
//! action executor retries them.

use crate::resource::ResourceId;
use crate::types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Categories of provider failures for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Provider throttled the request
    RateLimited,
    /// Concurrent modification or resource busy
    Conflict,
    /// Call did not complete in time
    Timeout,
    /// Provider endpoint unreachable or temporarily failing
    Unavailable,
    /// Spec rejected by the provider
    Validation,
    /// Credentials missing or insufficient
    Unauthorized,
    /// Anything else
    Other,
}

impl ErrorCategory {
    /// Whether this category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Conflict | Self::Timeout | Self::Unavailable
        )
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RateLimited => "Rate limited by provider",
            Self::Conflict => "Conflicting change in progress",
            Self::Timeout => "Provider call timed out",
            Self::Unavailable => "Provider unavailable",
            Self::Validation => "Specification rejected",
            Self::Unauthorized => "Not authorized",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::RateLimited => "Lower --jobs or raise the backoff settings",
            Self::Conflict => "Wait for the other change to settle and apply again",
            Self::Timeout => "Raise the action timeout or check provider health",
            Self::Unavailable => "Check connectivity to the provider and apply again",
            Self::Validation => "Fix the resource specification",
            Self::Unauthorized => "Check the provider credentials and permissions",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Failure reported by a provider adapter.
///
/// `transient` defaults to the category's retryability but adapters can
/// classify explicitly with [`AdapterError::transient`] /
/// [`AdapterError::permanent`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AdapterError {
    pub category: ErrorCategory,
    pub message: String,
    pub transient: bool,
}

impl AdapterError {
    /// Error whose retryability follows its category
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            transient: category.is_retryable(),
        }
    }

    /// Error the adapter explicitly marks as worth retrying
    pub fn transient(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            transient: true,
            ..Self::new(category, message)
        }
    }

    /// Error the adapter explicitly marks as not worth retrying
    pub fn permanent(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            transient: false,
            ..Self::new(category, message)
        }
    }

    /// An action that did not finish within the per-action timeout
    pub fn timed_out(after: Duration) -> Self {
        Self::transient(
            ErrorCategory::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.transient
    }
}

impl From<anyhow::Error> for AdapterError {
    fn from(err: anyhow::Error) -> Self {
        Self::permanent(ErrorCategory::Other, format!("{err:#}"))
    }
}

/// Problems with the declarations themselves. Always raised before execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("duplicate resource {id}")]
    DuplicateResource { id: ResourceId },

    #[error("{resource} depends on {dependency}, which is not declared in this run")]
    UnknownDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },

    #[error("dependency cycle: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<ResourceId> },

    #[error("target '{target}' matches no declared resource")]
    UnknownTarget { target: String },

    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
}

fn format_cycle(cycle: &[ResourceId]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

/// Errors that prevent a run from starting.
///
/// Once execution begins, every failure is recorded in the
/// [`RunReport`](crate::report::RunReport) instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("no adapter registered for {kind} (needed by {resource})")]
    MissingAdapter {
        kind: ResourceKind,
        resource: ResourceId,
    },

    #[error("failed to create worker pool: {0}")]
    WorkerPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_retryability() {
        assert!(ErrorCategory::RateLimited.is_retryable());
        assert!(ErrorCategory::Conflict.is_retryable());
        assert!(ErrorCategory::Timeout.is_retryable());
        assert!(ErrorCategory::Unavailable.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::Unauthorized.is_retryable());
        assert!(!ErrorCategory::Other.is_retryable());
    }

    #[test]
    fn test_explicit_classification_overrides_category() {
        let err = AdapterError::transient(ErrorCategory::Other, "flaky");
        assert!(err.is_retryable());

        let err = AdapterError::permanent(ErrorCategory::Conflict, "immutable field");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = AdapterError::timed_out(Duration::from_millis(250));
        assert_eq!(err.category, ErrorCategory::Timeout);
        assert!(err.is_retryable());
        assert!(err.message.contains("250ms"));
    }

    #[test]
    fn test_cycle_message_closes_the_loop() {
        let a = ResourceId::new(ResourceKind::Image, "a");
        let b = ResourceId::new(ResourceKind::Image, "b");
        let err = StructuralError::CyclicDependency {
            cycle: vec![a, b],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle: image/a -> image/b -> image/a"
        );
    }

    #[test]
    fn test_anyhow_errors_are_permanent() {
        let err: AdapterError = anyhow::anyhow!("boom").into();
        assert!(!err.is_retryable());
        assert_eq!(err.category, ErrorCategory::Other);
    }
}
