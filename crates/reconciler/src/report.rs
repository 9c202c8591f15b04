//! Run report - per-resource outcomes and the overall verdict
//!
//! Workers push finished entries into a [`ReportBuilder`] behind a single
//! mutex; [`ReportBuilder::finish`] restores declaration order.

use crate::error::AdapterError;
use crate::resource::{Resource, ResourceId};
use crate::types::{Intent, ResourceStatus, SkipReason, Verb};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Outcome of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Execution level the resource ran (or would have run) in
    pub level: usize,
    pub status: ResourceStatus,
    /// Verb the reconciler chose; absent when never evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<Verb>,
    /// Adapter action attempts, 0 for no-ops and skips
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AdapterError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    pub elapsed_ms: u64,
    #[serde(skip)]
    ordinal: usize,
}

impl ResourceReport {
    /// Snapshot a resource in its terminal state
    pub fn from_resource(resource: &Resource, level: usize) -> Self {
        Self {
            id: resource.id().clone(),
            group: resource.group.clone(),
            level,
            status: resource.status(),
            verb: resource.verb(),
            attempts: resource.attempts(),
            error: resource.last_error().cloned(),
            skip_reason: resource.skip_reason().cloned(),
            provider_id: resource.provider_id().map(str::to_string),
            elapsed_ms: u64::try_from(resource.elapsed().as_millis()).unwrap_or(u64::MAX),
            ordinal: resource.ordinal,
        }
    }

    /// Applied without any change
    pub fn is_unchanged(&self) -> bool {
        self.status == ResourceStatus::Applied && self.verb == Some(Verb::NoOp)
    }
}

/// Counts per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn add(&mut self, entry: &ResourceReport) {
        match (entry.status, entry.verb) {
            (ResourceStatus::Applied, Some(Verb::Create)) => self.created += 1,
            (ResourceStatus::Applied, Some(Verb::Update)) => self.updated += 1,
            (ResourceStatus::Applied, Some(Verb::Delete)) => self.deleted += 1,
            (ResourceStatus::Applied, _) => self.unchanged += 1,
            (ResourceStatus::Failed, _) => self.failed += 1,
            (ResourceStatus::Skipped, _) => self.skipped += 1,
            _ => {}
        }
    }

    /// Total number of resources
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.unchanged + self.failed + self.skipped
    }

    /// Number of resources actually changed
    pub fn changed(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Final result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub intent: Intent,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Entries in declaration order
    pub entries: Vec<ResourceReport>,
    pub summary: RunSummary,
    /// False when at least one resource failed
    pub overall_success: bool,
}

impl RunReport {
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceReport> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Status of a resource, if it was part of the run
    pub fn status_of(&self, id: &ResourceId) -> Option<ResourceStatus> {
        self.get(id).map(|e| e.status)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResourceReport> {
        self.entries
            .iter()
            .filter(|e| e.status == ResourceStatus::Failed)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Assembles a [`RunReport`] from concurrently finishing workers
#[derive(Debug)]
pub struct ReportBuilder {
    intent: Intent,
    dry_run: bool,
    started_at: DateTime<Utc>,
    entries: Mutex<Vec<ResourceReport>>,
}

impl ReportBuilder {
    pub fn new(intent: Intent, dry_run: bool) -> Self {
        Self {
            intent,
            dry_run,
            started_at: Utc::now(),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, entry: ResourceReport) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);
    }

    pub fn finish(self) -> RunReport {
        let mut entries = self
            .entries
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.sort_by_key(|e| e.ordinal);

        let mut summary = RunSummary::default();
        for entry in &entries {
            summary.add(entry);
        }

        RunReport {
            intent: self.intent,
            dry_run: self.dry_run,
            started_at: self.started_at,
            finished_at: Utc::now(),
            overall_success: summary.failed == 0,
            entries,
            summary,
        }
    }
}
