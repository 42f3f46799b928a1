//! Per-unit job results and the run report.

use std::path::Path;

use chrono::{DateTime, Utc};
use geosfp_common::CalendarUnit;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Outcome of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Skipped,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Pipeline stage that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Augment,
    Process,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Augment => "augment",
            Self::Process => "process",
        }
    }
}

/// Result of processing one unit in one stage (and, for fan-out, one
/// output target). Never modified once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub unit: CalendarUnit,
    pub stage: Stage,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobResult {
    pub fn success(unit: CalendarUnit, stage: Stage) -> Self {
        Self {
            unit,
            stage,
            status: JobStatus::Success,
            target: None,
            detail: None,
        }
    }

    pub fn skipped(unit: CalendarUnit, stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            unit,
            stage,
            status: JobStatus::Skipped,
            target: None,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(unit: CalendarUnit, stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            unit,
            stage,
            status: JobStatus::Failed,
            target: None,
            detail: Some(detail.into()),
        }
    }

    pub fn from_error(unit: CalendarUnit, stage: Stage, err: &PipelineError) -> Self {
        Self::failed(unit, stage, err.to_string())
    }

    pub fn with_target(mut self, label: impl Into<String>) -> Self {
        self.target = Some(label.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

/// Counts of results by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a JobResult>) -> Self {
        let mut counts = Self::default();
        for result in results {
            counts.add(result.status);
        }
        counts
    }

    pub fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Success => self.success += 1,
            JobStatus::Skipped => self.skipped += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }
}

/// Month-level aggregate of a monthly processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSummary {
    pub month: CalendarUnit,
    pub counts: StatusCounts,
}

impl MonthSummary {
    pub fn from_results(month: CalendarUnit, results: &[JobResult]) -> Self {
        Self {
            month,
            counts: StatusCounts::from_results(results),
        }
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every result is Success or Skipped.
    Success,
    /// Some results failed, others did not.
    Partial,
    /// Every result failed.
    Failed,
}

impl RunStatus {
    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failed => 1,
            Self::Partial => 2,
        }
    }
}

/// Ordered, append-only account of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when the run stopped early on a cancellation request.
    #[serde(default)]
    pub cancelled: bool,
    /// Units never started because the run was cancelled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pending: Vec<CalendarUnit>,
    results: Vec<JobResult>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
            pending: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: JobResult) {
        self.results.push(result);
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = JobResult>) {
        self.results.extend(results);
    }

    /// Stop the run early, recording the units that were never started.
    pub fn cancel(&mut self, pending: impl IntoIterator<Item = CalendarUnit>) {
        self.cancelled = true;
        self.pending.extend(pending);
    }

    pub fn pending(&self) -> &[CalendarUnit] {
        &self.pending
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn results(&self) -> &[JobResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts::from_results(&self.results)
    }

    /// A cancelled run is never a success: at best it is partial.
    pub fn status(&self) -> RunStatus {
        let counts = self.counts();
        if counts.failed == 0 && !self.cancelled {
            RunStatus::Success
        } else if counts.failed > 0 && counts.failed == counts.total() {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        }
    }

    /// Keys of the units that had at least one failure, in run order,
    /// followed by the units a cancellation left unstarted.
    pub fn units_to_rerun(&self) -> Vec<String> {
        let failed = self.results.iter().filter(|r| r.is_failed()).map(|r| r.unit);
        let mut keys: Vec<String> = Vec::new();
        for unit in failed.chain(self.pending.iter().copied()) {
            let key = unit.key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Document<'a> {
            status: RunStatus,
            counts: StatusCounts,
            units_to_rerun: Vec<String>,
            #[serde(flatten)]
            report: &'a RunReport,
        }

        serde_json::to_string_pretty(&Document {
            status: self.status(),
            counts: self.counts(),
            units_to_rerun: self.units_to_rerun(),
            report: self,
        })
        .map_err(|e| PipelineError::config(format!("cannot serialize report: {}", e)))
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::write(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| PipelineError::write(path, e))
    }
}
