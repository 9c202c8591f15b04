//! Provider adapter contract and the explicit kind -> adapter mapping
//!
//! Concrete adapters (container runtime, cluster API, cloud APIs) live
//! outside this crate. The engine only sees [`ProviderAdapter`] and picks the
//! implementation by [`ResourceKind`] through an [`AdapterRegistry`] handed to
//! each run.

use crate::error::AdapterError;
use crate::normalize;
use crate::resource::ResourceId;
use crate::types::{ObservedState, ResourceKind, Spec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Result of comparing a desired spec with observed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecDiff {
    pub equal: bool,
}

/// Uniform CRUD capability for one resource family
///
/// Implementations must be safe to call from several worker threads at
/// once; the engine never calls them for the same resource concurrently
/// except when a timed-out call is still running in the background.
///
/// # Example
///
/// ```ignore
/// use reconciler::{AdapterError, ObservedState, ProviderAdapter, ResourceId, Spec};
///
/// struct ImageAdapter { /* registry client */ }
///
/// impl ProviderAdapter for ImageAdapter {
///     fn read(&self, id: &ResourceId) -> Result<Option<ObservedState>, AdapterError> {
///         Ok(self.lookup(&id.name)?.map(|img| ObservedState::new(img.spec())))
///     }
///     fn create(&self, id: &ResourceId, spec: &Spec) -> Result<String, AdapterError> {
///         self.pull(&id.name, spec)
///     }
///     fn update(&self, id: &ResourceId, spec: &Spec) -> Result<(), AdapterError> {
///         self.pull(&id.name, spec).map(|_| ())
///     }
///     fn delete(&self, id: &ResourceId) -> Result<(), AdapterError> {
///         self.remove_if_present(&id.name)
///     }
/// }
/// ```
pub trait ProviderAdapter: Send + Sync {
    /// Fetch observed state; `Ok(None)` means the resource does not exist
    fn read(&self, id: &ResourceId) -> Result<Option<ObservedState>, AdapterError>;

    /// Create the resource, returning the provider-assigned identifier
    fn create(&self, id: &ResourceId, spec: &Spec) -> Result<String, AdapterError>;

    /// Bring an existing resource to the desired spec
    fn update(&self, id: &ResourceId, spec: &Spec) -> Result<(), AdapterError>;

    /// Remove the resource. Must return `Ok(())` if it is already absent.
    fn delete(&self, id: &ResourceId) -> Result<(), AdapterError>;

    /// Compare desired and observed configuration.
    ///
    /// The default normalizes both sides with the family rules in
    /// [`normalize`] before comparing.
    fn diff(&self, id: &ResourceId, desired: &Spec, observed: &ObservedState) -> SpecDiff {
        SpecDiff {
            equal: normalize::specs_equal(id.kind, desired, &observed.spec),
        }
    }
}

/// A shared adapter handle
pub type SharedAdapter = Arc<dyn ProviderAdapter>;

/// Explicit mapping from resource family to adapter instance
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ResourceKind, SharedAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for a family
    pub fn register(&mut self, kind: ResourceKind, adapter: SharedAdapter) -> &mut Self {
        self.adapters.insert(kind, adapter);
        self
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, kind: ResourceKind, adapter: SharedAdapter) -> Self {
        self.register(kind, adapter);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&SharedAdapter> {
        self.adapters.get(&kind)
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Registered families in stable order
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
