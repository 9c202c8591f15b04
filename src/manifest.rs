//! Resource manifests
//!
//! A manifest is a TOML file (or a directory of them) listing resources:
//!
//! ```toml
//! group = "network"          # optional, defaults to the file stem
//!
//! [[resource]]
//! name = "net"
//! kind = "cloud-object"
//!
//! [resource.spec]
//! cidr = "10.0.0.0/16"
//!
//! [[resource]]
//! name = "db"
//! kind = "cloud-object"
//! depends_on = ["net"]       # bare name or kind/name
//! ```

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use reconciler::{GraphBuilder, ResourceDecl, ResourceGroup, ResourceId, ResourceKind, Spec};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const NAME_PATTERN: &str = r"^[a-z0-9]([a-z0-9_.-]*[a-z0-9])?$";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    group: Option<String>,
    #[serde(default)]
    resource: Vec<ManifestResource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestResource {
    name: String,
    kind: ResourceKind,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    spec: toml::Table,
}

/// One parsed file, before dependency names are resolved
#[derive(Debug)]
struct RawGroup {
    path: PathBuf,
    name: String,
    resources: Vec<ManifestResource>,
}

/// Declarations loaded from one or more manifest files
#[derive(Debug, Clone)]
pub struct Manifest {
    pub groups: Vec<ResourceGroup>,
    /// Files the groups came from, same order
    pub sources: Vec<PathBuf>,
}

impl Manifest {
    /// Load a manifest file, or every `*.toml` below a directory
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Manifest not found: {}", path.display());
        }

        let files = if path.is_dir() {
            collect_files(path)?
        } else {
            vec![path.to_path_buf()]
        };
        log::debug!("Loading {} manifest file(s) from {}", files.len(), path.display());

        let raw: Vec<RawGroup> = files
            .par_iter()
            .map(|file| read_file(file))
            .collect::<Result<_>>()?;

        Self::resolve(raw)
    }

    /// Parse a single manifest from text; `default_group` names it when the
    /// text has no `group` key
    #[cfg(test)]
    pub fn parse(text: &str, default_group: &str) -> Result<Self> {
        let raw = parse_group(text, Path::new(default_group), default_group)?;
        Self::resolve(vec![raw])
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.resources.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All declarations in file order
    pub fn decls(&self) -> impl Iterator<Item = &ResourceDecl> {
        self.groups.iter().flat_map(|g| g.resources.iter())
    }

    /// Graph builder seeded with every group
    pub fn builder(&self) -> GraphBuilder {
        let mut builder = GraphBuilder::new();
        for group in &self.groups {
            builder.add_group(group.clone());
        }
        builder
    }

    fn resolve(raw: Vec<RawGroup>) -> Result<Self> {
        let name_pattern = Regex::new(NAME_PATTERN).context("Invalid resource name pattern")?;

        let mut by_name: HashMap<&str, Vec<ResourceId>> = HashMap::new();
        for group in &raw {
            for res in &group.resources {
                if !name_pattern.is_match(&res.name) {
                    bail!(
                        "Invalid resource name '{}' in {}: use lowercase letters, digits, '.', '_' or '-'",
                        res.name,
                        group.path.display()
                    );
                }
                let id = ResourceId::new(res.kind, res.name.as_str());
                let ids = by_name.entry(res.name.as_str()).or_default();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }

        let mut groups = Vec::with_capacity(raw.len());
        let mut sources = Vec::with_capacity(raw.len());

        for group in &raw {
            let mut decls = Vec::with_capacity(group.resources.len());
            for res in &group.resources {
                let id = ResourceId::new(res.kind, res.name.as_str());
                let mut decl = ResourceDecl::new(res.kind, res.name.as_str(), table_to_json(&res.spec));
                for dep in &res.depends_on {
                    let dep_id = resolve_dependency(dep, &by_name)
                        .with_context(|| format!("In {} ({})", id, group.path.display()))?;
                    decl = decl.depends_on(dep_id);
                }
                decls.push(decl);
            }
            groups.push(ResourceGroup::new(group.name.clone(), decls));
            sources.push(group.path.clone());
        }

        Ok(Self { groups, sources })
    }
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Could not walk {}", dir.display()))?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "toml") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn read_file(path: &Path) -> Result<RawGroup> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read manifest: {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default");
    parse_group(&content, path, stem)
}

fn parse_group(text: &str, path: &Path, default_group: &str) -> Result<RawGroup> {
    let file: ManifestFile = toml::from_str(text)
        .with_context(|| format!("Invalid manifest: {}", path.display()))?;
    Ok(RawGroup {
        path: path.to_path_buf(),
        name: file.group.unwrap_or_else(|| default_group.to_string()),
        resources: file.resource,
    })
}

/// `kind/name` is taken as written; a bare name must match exactly one
/// declared resource
fn resolve_dependency(dep: &str, by_name: &HashMap<&str, Vec<ResourceId>>) -> Result<ResourceId> {
    if dep.contains('/') {
        return dep
            .parse::<ResourceId>()
            .map_err(|e| anyhow::anyhow!("Invalid dependency '{dep}': {e}"));
    }

    match by_name.get(dep).map(Vec::as_slice) {
        Some([id]) => Ok(id.clone()),
        Some(ids) if ids.len() > 1 => {
            let candidates: Vec<String> = ids.iter().map(ToString::to_string).collect();
            bail!(
                "Dependency '{dep}' is ambiguous ({}); use kind/name",
                candidates.join(", ")
            )
        }
        _ => bail!("Dependency '{dep}' does not name any declared resource"),
    }
}

fn table_to_json(table: &toml::Table) -> Spec {
    Value::Object(
        table
            .iter()
            .map(|(k, v)| (k.clone(), toml_to_json(v)))
            .collect::<Map<_, _>>(),
    )
}

fn toml_to_json(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::from(*i),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => table_to_json(table),
    }
}

// ============================================================================
// Tests
// ============================================================================
