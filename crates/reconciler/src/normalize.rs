//! Family-specific spec normalization for drift detection
//!
//! Providers echo back more than the user declared: server-assigned ids,
//! timestamps, status blocks. Comparing raw JSON would report drift on every
//! read, so both sides are normalized per [`ResourceKind`] before comparing.
//!
//! Rules shared by every family:
//! - object keys starting with `_` are server-assigned and dropped
//! - `null` values are treated as absent

use crate::types::{ResourceKind, Spec};
use serde_json::{Map, Value};

const CONTAINER_SERVER_FIELDS: &[&str] = &["id", "created", "state", "status"];
const CLUSTER_METADATA_SERVER_FIELDS: &[&str] = &[
    "uid",
    "resourceVersion",
    "creationTimestamp",
    "generation",
    "managedFields",
];
const CLOUD_SERVER_FIELDS: &[&str] = &["arn", "created_at", "updated_at"];

/// Normalize a spec for comparison within its family
pub fn normalize(kind: ResourceKind, spec: &Spec) -> Spec {
    let mut value = strip_common(spec);

    if let Value::Object(map) = &mut value {
        match kind {
            ResourceKind::Image => normalize_image(map),
            ResourceKind::Container => normalize_container(map),
            ResourceKind::ClusterObject => normalize_cluster_object(map),
            ResourceKind::CloudObject => normalize_cloud_object(map),
        }
    }

    value
}

/// Whether desired and observed specs describe the same configuration
pub fn specs_equal(kind: ResourceKind, desired: &Spec, observed: &Spec) -> bool {
    normalize(kind, desired) == normalize(kind, observed)
}

/// Drop `_`-prefixed keys and nulls, recursively
fn strip_common(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, v)| !k.starts_with('_') && !v.is_null())
                .map(|(k, v)| (k.clone(), strip_common(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_common).collect()),
        other => other.clone(),
    }
}

fn normalize_image(map: &mut Map<String, Value>) {
    if let Some(Value::String(reference)) = map.get_mut("reference") {
        *reference = canonical_image_reference(reference);
    }
}

/// `nginx` -> `nginx:latest`; references with a tag or digest are kept.
fn canonical_image_reference(reference: &str) -> String {
    if reference.contains('@') {
        return reference.to_string();
    }
    // A ':' after the last '/' is a tag; one before it belongs to a registry port.
    let last_segment = reference.rsplit('/').next().unwrap_or(reference);
    if last_segment.contains(':') {
        reference.to_string()
    } else {
        format!("{reference}:latest")
    }
}

fn normalize_container(map: &mut Map<String, Value>) {
    for field in CONTAINER_SERVER_FIELDS {
        map.remove(*field);
    }
    if let Some(Value::Array(env)) = map.get_mut("env") {
        sort_array(env);
    }
}

fn normalize_cluster_object(map: &mut Map<String, Value>) {
    map.remove("status");
    if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
        for field in CLUSTER_METADATA_SERVER_FIELDS {
            metadata.remove(*field);
        }
    }
}

fn normalize_cloud_object(map: &mut Map<String, Value>) {
    for field in CLOUD_SERVER_FIELDS {
        map.remove(*field);
    }
    // Tags given as [{key, value}] pairs compare as a map.
    if let Some(tags) = map.get_mut("tags")
        && let Value::Array(items) = &*tags
        && let Some(as_map) = tag_pairs_to_map(items)
    {
        *tags = Value::Object(as_map);
    }
}

fn tag_pairs_to_map(items: &[Value]) -> Option<Map<String, Value>> {
    items
        .iter()
        .map(|item| {
            let key = item.get("key")?.as_str()?.to_string();
            let value = item.get("value")?.clone();
            Some((key, value))
        })
        .collect()
}

/// Order-insensitive comparison: sort by the serialized form of each item
fn sort_array(items: &mut [Value]) {
    items.sort_by_cached_key(ToString::to_string);
}
