//! Progress reporting hooks for runs
//!
//! Runs report progress through [`ProgressCallback`] so the crate stays free
//! of any particular terminal UI. Workers in the same level call it
//! concurrently, hence `Sync` and `&self`.

use crate::error::AdapterError;
use crate::report::ResourceReport;
use crate::resource::ResourceId;
use crate::types::Verb;
use std::time::Duration;

/// Progress callback for run operations
///
/// Every method has an empty default; implement only what you render.
pub trait ProgressCallback: Send + Sync {
    /// Called before the resources of a level start
    fn on_level_start(&self, _level: usize, _count: usize) {}

    /// Called when a worker picks up a resource
    fn on_resource_start(&self, _id: &ResourceId) {}

    /// Called once the reconciler has classified a resource
    fn on_action(&self, _id: &ResourceId, _verb: Verb) {}

    /// Called before sleeping ahead of a retry
    ///
    /// # Arguments
    /// * `attempt` - The attempt that just failed (1-indexed)
    /// * `max_attempts` - Attempt ceiling
    /// * `error` - The transient error that triggered the retry
    /// * `delay` - Backoff before the next attempt
    fn on_retry(
        &self,
        _id: &ResourceId,
        _attempt: u32,
        _max_attempts: u32,
        _error: &AdapterError,
        _delay: Duration,
    ) {
    }

    /// Called when a resource reaches its terminal status
    fn on_resource_complete(&self, _entry: &ResourceReport) {}

    /// Called after the level barrier
    fn on_level_complete(&self, _level: usize) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {}
