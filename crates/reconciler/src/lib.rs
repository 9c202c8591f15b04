//! # Reconciler
//!
//! Converges declared infrastructure resources to their desired state.
//!
//! Given a set of resource declarations and an intent (apply or destroy),
//! the crate validates the dependency graph, orders it into levels, and for
//! every resource reads observed state through a provider adapter, decides
//! the minimal action, and performs it with bounded retries.
//!
//! ## Core Concepts
//!
//! - **ResourceDecl**: a desired resource (kind, name, spec, dependencies)
//! - **ProviderAdapter**: read/create/update/delete for one resource family
//! - **ResourceGraph**: validated DAG in an index-addressed arena
//! - **ExecutionPlan**: levels; a level starts only after the previous one
//!   has fully finished
//! - **RunReport**: per-resource outcome plus the overall verdict
//!
//! ## Example
//!
//! ```ignore
//! use reconciler::{
//!     AdapterRegistry, Intent, ResourceDecl, ResourceKind, RunOptions, run_simple,
//! };
//! use std::sync::Arc;
//!
//! let net = ResourceDecl::new(ResourceKind::CloudObject, "net", json!({"cidr": "10.0.0.0/16"}));
//! let db = ResourceDecl::new(ResourceKind::CloudObject, "db", json!({"engine": "postgres"}))
//!     .depends_on(net.id.clone());
//!
//! let adapters = AdapterRegistry::new().with(ResourceKind::CloudObject, Arc::new(MyCloud::new()));
//! let report = run_simple(vec![net, db], Intent::Apply, &adapters, &RunOptions::default())?;
//! assert!(report.overall_success);
//! ```
//!
//! ## Injection Points
//!
//! - [`ProviderAdapter`]: one implementation per resource family, passed in
//!   through an [`AdapterRegistry`]; there is no global lookup
//! - [`ProgressCallback`]: receives level and resource events
//! - [`CancelHandle`]: stops the run between levels and wakes retry sleeps

pub mod cancel;
pub mod context;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod report;
pub mod resource;
pub mod retry;
pub mod scheduler;
pub mod types;

// Re-export main types at crate root
pub use cancel::CancelHandle;
pub use context::{NoProgress, ProgressCallback};
pub use diff::{DiffSummary, ResourceDiff, group_by_kind};
pub use engine::{Plan, Preview, RunOptions, plan, preview, run, run_plan, run_simple};
pub use error::{AdapterError, ErrorCategory, RunError, StructuralError};
pub use executor::{Action, ActionExecutor, ActionOutcome};
pub use graph::{GraphBuilder, ResourceGraph};
pub use provider::{AdapterRegistry, ProviderAdapter, SharedAdapter, SpecDiff};
pub use reconcile::{Decision, Reconciler, classify};
pub use report::{ResourceReport, RunReport, RunSummary};
pub use resource::{Resource, ResourceDecl, ResourceGroup, ResourceId};
pub use retry::{GaveUp, RetryPolicy};
pub use scheduler::ExecutionPlan;
pub use types::{
    Intent, ObservedState, ResourceKind, ResourceStatus, SkipReason, Spec, Verb,
};
