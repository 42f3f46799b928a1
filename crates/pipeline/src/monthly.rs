//! Monthly processing with fan-out to output targets.
//!
//! A month is expanded into its days. For each day a [`DayStep`] produces one
//! dataset, which is then written to every output target; targets are
//! independent, so a failed write to one never affects the others. The
//! result list always holds one entry per (day, target) pair.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geosfp_common::{
    resolve_artifact, resolve_dir, CalendarError, CalendarUnit, FileTemplate, OutputTarget,
    OutputTargets,
};
use met_dataset::{coarsen_dataset, Dataset, DatasetIo};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::augment::VariableAugmentor;
use crate::error::{PipelineError, Result};
use crate::report::{JobResult, MonthSummary, Stage};

/// Produces the dataset of one day.
#[async_trait]
pub trait DayStep: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the step needs a run configuration directory.
    fn requires_run_dir(&self) -> bool {
        false
    }

    async fn run(&self, day: CalendarUnit, raw_root: &Path, run_dir: Option<&Path>) -> Result<Dataset>;
}

/// Built-in step: augment the day's raw dataset in process.
pub struct AugmentStep {
    augmentor: VariableAugmentor,
    input_template: FileTemplate,
}

impl AugmentStep {
    pub fn new(augmentor: VariableAugmentor, input_template: FileTemplate) -> Self {
        Self {
            augmentor,
            input_template,
        }
    }
}

#[async_trait]
impl DayStep for AugmentStep {
    fn name(&self) -> &str {
        "augment"
    }

    async fn run(&self, day: CalendarUnit, raw_root: &Path, _run_dir: Option<&Path>) -> Result<Dataset> {
        let raw_path = resolve_artifact(raw_root, &day, &self.input_template);
        let augmentor = self.augmentor.clone();
        tokio::task::spawn_blocking(move || augmentor.derive(&raw_path, &day))
            .await
            .map_err(|e| PipelineError::transform(format!("augmentation task failed: {}", e)))?
    }
}

/// External model-run step.
///
/// Runs `<run_dir>/<program> <yyyymmdd> <raw_day_dir> <output_path>` with
/// `run_dir` as working directory, then reads `output_path` back.
pub struct ExternalStep {
    program: String,
    scratch_dir: PathBuf,
    timeout: Duration,
    io: Arc<dyn DatasetIo>,
}

impl ExternalStep {
    pub fn new(
        program: impl Into<String>,
        scratch_dir: impl Into<PathBuf>,
        timeout: Duration,
        io: Arc<dyn DatasetIo>,
    ) -> Self {
        Self {
            program: program.into(),
            scratch_dir: scratch_dir.into(),
            timeout,
            io,
        }
    }
}

#[async_trait]
impl DayStep for ExternalStep {
    fn name(&self) -> &str {
        &self.program
    }

    fn requires_run_dir(&self) -> bool {
        true
    }

    async fn run(&self, day: CalendarUnit, raw_root: &Path, run_dir: Option<&Path>) -> Result<Dataset> {
        let run_dir = run_dir
            .ok_or_else(|| PipelineError::config("external processing requires a run directory"))?;
        let raw_dir = resolve_dir(raw_root, &day);
        if !raw_dir.is_dir() {
            return Err(PipelineError::MissingInput(raw_dir));
        }

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| PipelineError::write(&self.scratch_dir, e))?;
        let output_path = self.scratch_dir.join(format!("{}.out", day.key()));
        tokio::fs::remove_file(&output_path).await.ok();

        let program = run_dir.join(&self.program);
        debug!(program = %program.display(), day = %day, "Running external step");

        let child = Command::new(&program)
            .arg(day.key())
            .arg(&raw_dir)
            .arg(&output_path)
            .current_dir(run_dir)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                PipelineError::transform(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                PipelineError::transform(format!("failed to run {}: {}", program.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::transform(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let io = self.io.clone();
        let dataset = tokio::task::spawn_blocking(move || {
            let result = io
                .read_dataset(&output_path)
                .map_err(|e| PipelineError::from_read(&output_path, e));
            std::fs::remove_file(&output_path).ok();
            result
        })
        .await
        .map_err(|e| PipelineError::transform(format!("reading step output failed: {}", e)))??;
        Ok(dataset)
    }
}

/// Runs a day step over every day of a month and fans the result out.
pub struct MonthlyProcessor {
    step: Arc<dyn DayStep>,
    io: Arc<dyn DatasetIo>,
    output_template: FileTemplate,
    horizontal_dims: Vec<String>,
    overwrite: bool,
}

impl MonthlyProcessor {
    pub fn new(step: Arc<dyn DayStep>, io: Arc<dyn DatasetIo>, output_template: FileTemplate) -> Self {
        Self {
            step,
            io,
            output_template,
            horizontal_dims: vec!["lat".to_string(), "lon".to_string()],
            overwrite: false,
        }
    }

    pub fn with_horizontal_dims(mut self, dims: Vec<String>) -> Self {
        self.horizontal_dims = dims;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Output path of `day` for `target`.
    pub fn output_path(&self, day: &CalendarUnit, target: &OutputTarget) -> PathBuf {
        resolve_dir(&target.root_dir, day).join(self.output_template.render(day, &[("label", &target.label)]))
    }

    /// Process every day of `month`.
    ///
    /// Fails before any work only when `month` is not a month unit, no
    /// targets are given, or the step needs a run directory and none is
    /// given. Everything else is reported per (day, target).
    #[instrument(skip(self, run_dir, raw_root, targets), fields(month = %month, step = self.step.name()))]
    pub async fn process(
        &self,
        month: CalendarUnit,
        run_dir: Option<&Path>,
        raw_root: &Path,
        targets: &OutputTargets,
    ) -> Result<Vec<JobResult>> {
        if !month.is_month() {
            let key = month.key();
            return Err(CalendarError::invalid_range(key.clone(), key, "monthly processing needs a month unit").into());
        }
        if targets.is_empty() {
            return Err(PipelineError::config("monthly processing needs at least one output target"));
        }
        if self.step.requires_run_dir() && run_dir.is_none() {
            return Err(PipelineError::config(format!(
                "step {} requires a run directory",
                self.step.name()
            )));
        }

        let mut results = Vec::with_capacity(month.days().len() * targets.len());
        for day in month.days() {
            results.extend(self.process_day(day, run_dir, raw_root, targets).await);
        }

        let summary = self.summarize(month, &results);
        info!(
            success = summary.counts.success,
            skipped = summary.counts.skipped,
            failed = summary.counts.failed,
            "Month processed"
        );
        Ok(results)
    }

    /// Month-level counts of a result list.
    pub fn summarize(&self, month: CalendarUnit, results: &[JobResult]) -> MonthSummary {
        MonthSummary::from_results(month, results)
    }

    async fn process_day(
        &self,
        day: CalendarUnit,
        run_dir: Option<&Path>,
        raw_root: &Path,
        targets: &OutputTargets,
    ) -> Vec<JobResult> {
        let planned: Vec<(&OutputTarget, PathBuf)> = targets
            .iter()
            .map(|t| (t, self.output_path(&day, t)))
            .collect();

        let results = if !self.overwrite && planned.iter().all(|(_, path)| path.is_file()) {
            debug!(day = %day, "All outputs present, skipping");
            planned
                .iter()
                .map(|(t, _)| JobResult::skipped(day, Stage::Process, "output already present").with_target(&t.label))
                .collect()
        } else {
            match self.step.run(day, raw_root, run_dir).await {
                Ok(dataset) => {
                    let dataset = Arc::new(dataset);
                    let mut results = Vec::with_capacity(planned.len());
                    for (target, path) in planned {
                        results.push(self.write_target(day, &dataset, target, path).await);
                    }
                    results
                }
                Err(e) => {
                    warn!(day = %day, error = %e, kind = e.kind(), "Day step failed");
                    planned
                        .iter()
                        .map(|(t, _)| JobResult::from_error(day, Stage::Process, &e).with_target(&t.label))
                        .collect()
                }
            }
        };

        for result in &results {
            metrics::counter!(
                "geosfp_units_total",
                "stage" => Stage::Process.as_str(),
                "status" => result.status.as_str()
            )
            .increment(1);
        }
        results
    }

    async fn write_target(
        &self,
        day: CalendarUnit,
        dataset: &Arc<Dataset>,
        target: &OutputTarget,
        path: PathBuf,
    ) -> JobResult {
        if !self.overwrite && path.is_file() {
            return JobResult::skipped(day, Stage::Process, "output already present").with_target(&target.label);
        }

        let io = self.io.clone();
        let dataset = dataset.clone();
        let factor = target.coarsen as usize;
        let dims = self.horizontal_dims.clone();
        let dest = path.clone();
        let written = tokio::task::spawn_blocking(move || -> Result<()> {
            let dim_refs: Vec<&str> = dims.iter().map(String::as_str).collect();
            let coarse;
            let out = if factor > 1 {
                coarse = coarsen_dataset(&dataset, factor, &dim_refs).map_err(|e| PipelineError::write(&dest, e))?;
                &coarse
            } else {
                dataset.as_ref()
            };
            io.write_atomic(out, &dest).map_err(|e| PipelineError::write(&dest, e))
        })
        .await
        .map_err(|e| PipelineError::write(&path, format!("write task failed: {}", e)))
        .and_then(|r| r);

        match written {
            Ok(()) => {
                debug!(day = %day, target = %target.label, path = %path.display(), "Output written");
                JobResult::success(day, Stage::Process)
                    .with_target(&target.label)
                    .with_detail(path.display().to_string())
            }
            Err(e) => {
                warn!(day = %day, target = %target.label, error = %e, "Output write failed");
                JobResult::from_error(day, Stage::Process, &e).with_target(&target.label)
            }
        }
    }
}
