//! Terminal progress for runs
//!
//! Bridges the engine's [`ProgressCallback`] to an indicatif bar. Workers
//! report concurrently, so everything goes through the bar's own locking.
//! Per-resource lines go to stderr; stdout is left to the command's report.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconciler::{AdapterError, ProgressCallback, ResourceId, ResourceReport, SkipReason};
use std::time::Duration;

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Which per-resource lines get echoed while a run is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    /// Nothing; used for `--json` and `-q`
    Silent,
    /// Retries and failures
    Problems,
    /// Every completed resource as well
    All,
}

pub struct RunProgress {
    pb: ProgressBar,
    echo: Echo,
}

impl RunProgress {
    /// Bar over `total` resources; hidden when `visible` is false
    pub fn new(total: usize, visible: bool, echo: Echo) -> Self {
        let pb = if visible && echo != Echo::Silent {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        match ProgressStyle::default_bar().template(TEMPLATE) {
            Ok(style) => pb.set_style(style.progress_chars("=>-")),
            Err(e) => log::debug!("Falling back to default progress style: {e}"),
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        Self { pb, echo }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    fn emit(&self, line: Option<String>) {
        if let Some(line) = line {
            self.pb.suspend(|| eprintln!("{line}"));
        }
    }

    fn retry_line(
        &self,
        id: &ResourceId,
        attempt: u32,
        max_attempts: u32,
        error: &AdapterError,
        delay: Duration,
    ) -> Option<String> {
        if self.echo == Echo::Silent {
            return None;
        }
        Some(format!(
            "  {} {} attempt {}/{} failed: {} {}",
            "↻".yellow(),
            id,
            attempt,
            max_attempts,
            error,
            format!("(retrying in {}ms)", delay.as_millis()).dimmed()
        ))
    }

    fn completion_line(&self, entry: &ResourceReport) -> Option<String> {
        let icon = crate::ui::status_icon(entry.status, entry.verb);
        match (&entry.error, self.echo) {
            (_, Echo::Silent) => None,
            (Some(err), _) => Some(format!("  {} {} {}", icon, entry.id, err.to_string().red())),
            (None, Echo::All) if !matches!(entry.skip_reason, Some(SkipReason::DryRun)) => {
                Some(format!("  {} {}", icon, entry.id))
            }
            (None, _) => None,
        }
    }
}

impl ProgressCallback for RunProgress {
    fn on_level_start(&self, level: usize, count: usize) {
        self.pb.set_message(format!("level {level} ({count})"));
    }

    fn on_resource_start(&self, id: &ResourceId) {
        self.pb.set_message(id.to_string());
    }

    fn on_retry(
        &self,
        id: &ResourceId,
        attempt: u32,
        max_attempts: u32,
        error: &AdapterError,
        delay: Duration,
    ) {
        self.emit(self.retry_line(id, attempt, max_attempts, error, delay));
    }

    fn on_resource_complete(&self, entry: &ResourceReport) {
        self.emit(self.completion_line(entry));
        self.pb.set_message(format!(
            "{} {}",
            crate::ui::status_icon(entry.status, entry.verb),
            entry.id
        ));
        self.pb.inc(1);
    }
}
