//! File-backed sandbox provider
//!
//! Stands in for live provider APIs: every resource family is served from
//! one JSON file, and every mutation is written through before the call
//! returns. Reads echo back server-assigned fields (`_created_at`,
//! `_updated_at`) the way a real API would, which the drift normalizer
//! ignores.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconciler::{
    AdapterError, AdapterRegistry, ErrorCategory, ObservedState, ProviderAdapter, ResourceId,
    ResourceKind, Spec,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const PROVIDER_ID_LEN: usize = 12;

/// One object held by the sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: ResourceId,
    pub provider_id: String,
    pub spec: Spec,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    objects: BTreeMap<String, StoredObject>,
}

/// Shared store behind every sandbox adapter
#[derive(Debug)]
pub struct SandboxStore {
    path: PathBuf,
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl SandboxStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: &Path) -> Result<Self> {
        let objects = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Could not read sandbox state: {}", path.display()))?;
            let file: StoreFile = serde_json::from_str(&content)
                .with_context(|| format!("Invalid sandbox state: {}", path.display()))?;
            log::debug!("Loaded {} sandbox object(s) from {}", file.objects.len(), path.display());
            file.objects
        } else {
            log::debug!("No sandbox state at {}, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            objects: Mutex::new(objects),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored object, ordered by `kind/name`
    pub fn list(&self) -> Vec<StoredObject> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &ResourceId) -> Option<StoredObject> {
        self.lock().get(&id.to_string()).cloned()
    }

    /// Insert or replace; returns the provider id, which is kept across updates
    fn upsert(&self, id: &ResourceId, spec: &Spec) -> Result<String, AdapterError> {
        let mut guard = self.lock();
        let key = id.to_string();
        let now = Utc::now();

        let object = match guard.get(&key) {
            Some(existing) => StoredObject {
                spec: spec.clone(),
                updated_at: now,
                ..existing.clone()
            },
            None => StoredObject {
                id: id.clone(),
                provider_id: provider_id(id, spec),
                spec: spec.clone(),
                created_at: now,
                updated_at: now,
            },
        };
        let provider_id = object.provider_id.clone();

        let mut next = guard.clone();
        next.insert(key, object);
        self.persist(&next)?;
        *guard = next;
        Ok(provider_id)
    }

    /// Remove; absent objects are not an error
    fn remove(&self, id: &ResourceId) -> Result<(), AdapterError> {
        let mut guard = self.lock();
        let key = id.to_string();
        if !guard.contains_key(&key) {
            log::debug!("sandbox: {id} already absent");
            return Ok(());
        }

        let mut next = guard.clone();
        next.remove(&key);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn persist(&self, objects: &BTreeMap<String, StoredObject>) -> Result<(), AdapterError> {
        self.write_file(objects).map_err(|e| {
            AdapterError::transient(ErrorCategory::Unavailable, format!("{e:#}"))
        })
    }

    fn write_file(&self, objects: &BTreeMap<String, StoredObject>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create directory: {}", parent.display()))?;
        }

        let file = StoreFile {
            objects: objects.clone(),
        };
        let content = serde_json::to_string_pretty(&file).context("Could not serialize sandbox state")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Could not write sandbox state: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Could not replace sandbox state: {}", self.path.display()))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        match self.objects.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn provider_id(id: &ResourceId, spec: &Spec) -> String {
    let hash = blake3::hash(format!("{id}\n{spec}").as_bytes());
    hash.to_hex().as_str()[..PROVIDER_ID_LEN].to_string()
}

/// Sandbox adapter for one resource family
pub struct SandboxAdapter {
    kind: ResourceKind,
    store: Arc<SandboxStore>,
}

impl SandboxAdapter {
    pub fn new(kind: ResourceKind, store: Arc<SandboxStore>) -> Self {
        Self { kind, store }
    }

    fn check_kind(&self, id: &ResourceId) -> Result<(), AdapterError> {
        if id.kind == self.kind {
            Ok(())
        } else {
            Err(AdapterError::permanent(
                ErrorCategory::Other,
                format!("{} adapter cannot manage {id}", self.kind),
            ))
        }
    }
}

fn check_spec(id: &ResourceId, spec: &Spec) -> Result<(), AdapterError> {
    if spec.is_object() {
        Ok(())
    } else {
        Err(AdapterError::permanent(
            ErrorCategory::Validation,
            format!("spec of {id} must be a table"),
        ))
    }
}

impl ProviderAdapter for SandboxAdapter {
    fn read(&self, id: &ResourceId) -> Result<Option<ObservedState>, AdapterError> {
        self.check_kind(id)?;
        Ok(self.store.get(id).map(|object| {
            let mut spec = object.spec;
            if let Value::Object(map) = &mut spec {
                map.insert("_created_at".into(), Value::String(object.created_at.to_rfc3339()));
                map.insert("_updated_at".into(), Value::String(object.updated_at.to_rfc3339()));
            }
            ObservedState::new(spec).with_provider_id(object.provider_id)
        }))
    }

    fn create(&self, id: &ResourceId, spec: &Spec) -> Result<String, AdapterError> {
        self.check_kind(id)?;
        check_spec(id, spec)?;
        let provider_id = self.store.upsert(id, spec)?;
        log::debug!("sandbox: created {id} as {provider_id}");
        Ok(provider_id)
    }

    fn update(&self, id: &ResourceId, spec: &Spec) -> Result<(), AdapterError> {
        self.check_kind(id)?;
        check_spec(id, spec)?;
        self.store.upsert(id, spec)?;
        log::debug!("sandbox: updated {id}");
        Ok(())
    }

    fn delete(&self, id: &ResourceId) -> Result<(), AdapterError> {
        self.check_kind(id)?;
        self.store.remove(id)?;
        log::debug!("sandbox: deleted {id}");
        Ok(())
    }
}

/// Registry serving every family from `store`
pub fn registry(store: &Arc<SandboxStore>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for kind in ResourceKind::ALL {
        registry.register(kind, Arc::new(SandboxAdapter::new(kind, Arc::clone(store))));
    }
    registry
}

// ============================================================================
// Tests
// ============================================================================
