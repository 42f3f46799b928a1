//! Pipeline driver.
//!
//! Walks a schedule of calendar units in order and runs the selected stage
//! on each. Per-unit failures are recorded and the walk continues; only an
//! invalid schedule or configuration aborts, and both are detected before
//! the first unit is touched.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use geosfp_common::{resolve_artifact, resolve_dir, CalendarError, CalendarUnit, Granularity, OutputTargets, UnitSchedule};
use met_dataset::{open_io, DatasetIo};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::augment::VariableAugmentor;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::fetch::RemoteFetcher;
use crate::monthly::{AugmentStep, DayStep, ExternalStep, MonthlyProcessor};
use crate::remote::{HttpArchive, RemoteArchive};
use crate::report::{JobResult, RunReport, Stage};
use crate::transform::SoilTemperature;

/// Which stage(s) a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Retrieve raw files only.
    Fetch,
    /// Augment already-present datasets.
    Augment,
    /// Retrieve, then augment the units whose retrieval succeeded.
    FetchAndAugment,
    /// Monthly processing with fan-out; units must be months.
    ProcessMonth,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Augment => "augment",
            Self::FetchAndAugment => "fetch-and-augment",
            Self::ProcessMonth => "process-month",
        }
    }
}

impl FromStr for RunMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fetch" | "download" => Ok(Self::Fetch),
            "augment" => Ok(Self::Augment),
            "fetch-and-augment" | "run" => Ok(Self::FetchAndAugment),
            "process-month" => Ok(Self::ProcessMonth),
            other => Err(PipelineError::config(format!("unknown run mode: {}", other))),
        }
    }
}

/// Runs pipeline stages over a schedule of units.
pub struct PipelineDriver {
    config: PipelineConfig,
    fetcher: RemoteFetcher,
    augmentor: VariableAugmentor,
    monthly: MonthlyProcessor,
    targets: OutputTargets,
    cancel: CancellationToken,
}

impl PipelineDriver {
    /// Build a driver with the HTTP archive and the configured dataset
    /// backend.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let archive = Arc::new(HttpArchive::new(&config.remote)?);
        let io = open_io(config.dataset_format)
            .map_err(|e| PipelineError::config(e.to_string()))?;
        Self::with_components(config, archive, io)
    }

    /// Build a driver around an explicit archive and dataset backend.
    pub fn with_components(
        config: PipelineConfig,
        archive: Arc<dyn RemoteArchive>,
        io: Arc<dyn DatasetIo>,
    ) -> Result<Self> {
        config.validate()?;

        let fetcher = RemoteFetcher::new(archive, &config.remote);
        let augmentor = VariableAugmentor::new(
            io.clone(),
            Arc::new(SoilTemperature::new(config.augment.soil.clone())),
        )
        .with_overwrite(config.augment.overwrite);

        let step: Arc<dyn DayStep> = match &config.process.program {
            Some(program) => Arc::new(ExternalStep::new(
                program.clone(),
                config.process.scratch_dir.clone(),
                config.process.program_timeout(),
                io.clone(),
            )),
            None => Arc::new(AugmentStep::new(
                augmentor.clone(),
                config.augment.input_template.clone(),
            )),
        };
        let monthly = MonthlyProcessor::new(step, io, config.process.output_template.clone())
            .with_horizontal_dims(config.process.horizontal_dims.clone())
            .with_overwrite(config.process.overwrite);
        let targets = config.process.output_targets();

        Ok(Self {
            config,
            fetcher,
            augmentor,
            monthly,
            targets,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that stops the run before the next unit when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Input and output paths of the augmentation of `day`.
    pub fn augment_paths(&self, day: &CalendarUnit) -> (PathBuf, PathBuf) {
        let augment = &self.config.augment;
        (
            resolve_artifact(self.config.augment_input_root(), day, &augment.input_template),
            resolve_artifact(&augment.output_root, day, &augment.output_template),
        )
    }

    /// Root the monthly day step reads from.
    fn process_input_root(&self) -> &Path {
        if self.config.process.program.is_some() {
            self.config.raw_root.as_path()
        } else {
            self.config.augment_input_root()
        }
    }

    fn check(&self, schedule: &UnitSchedule, mode: RunMode) -> Result<()> {
        if mode == RunMode::ProcessMonth {
            if schedule.granularity() != Granularity::Month {
                let keys: Vec<String> = schedule.iter().map(|u| u.key()).collect();
                return Err(CalendarError::invalid_range(
                    keys.first().cloned().unwrap_or_default(),
                    keys.last().cloned().unwrap_or_default(),
                    "monthly processing needs month units",
                )
                .into());
            }
            if self.targets.is_empty() {
                return Err(PipelineError::config("monthly processing needs at least one output target"));
            }
            if self.config.process.program.is_some() && self.config.process.run_dir.is_none() {
                return Err(PipelineError::config("process.program requires process.run_dir"));
            }
        }
        if mode == RunMode::FetchAndAugment {
            let collection = &self.config.augment.raw_collection;
            if !self.fetcher.has_collection(collection) {
                return Err(PipelineError::config(format!(
                    "augment.raw_collection {} is not among the fetched collections",
                    collection
                )));
            }
        }
        Ok(())
    }

    /// Run `mode` over every unit of `schedule`.
    ///
    /// Returns the report of every unit processed; stops early when the
    /// cancellation token fires, recording the unstarted units as pending.
    pub async fn run(&self, schedule: &UnitSchedule, mode: RunMode) -> Result<RunReport> {
        self.check(schedule, mode)?;

        let units: Vec<CalendarUnit> = match mode {
            RunMode::Augment | RunMode::FetchAndAugment => {
                schedule.iter().flat_map(|u| u.days()).collect()
            }
            RunMode::Fetch | RunMode::ProcessMonth => schedule.iter().collect(),
        };

        info!(mode = mode.as_str(), units = units.len(), "Starting run");
        let mut report = RunReport::new();

        let mut queue = units.into_iter();
        while let Some(unit) = queue.next() {
            if self.cancel.is_cancelled() {
                warn!(unit = %unit, "Run cancelled, stopping before next unit");
                report.cancel(std::iter::once(unit).chain(queue));
                break;
            }

            let results = match mode {
                RunMode::Fetch => vec![self.fetcher.fetch(unit, &self.config.raw_root).await],
                RunMode::Augment => {
                    let (raw, out) = self.augment_paths(&unit);
                    vec![self.augmentor.augment(&raw, &out, unit).await]
                }
                RunMode::FetchAndAugment => self.fetch_and_augment(unit).await,
                RunMode::ProcessMonth => {
                    self.monthly
                        .process(
                            unit,
                            self.config.process.run_dir.as_deref(),
                            self.process_input_root(),
                            &self.targets,
                        )
                        .await?
                }
            };

            for result in &results {
                log_result(result);
            }
            report.extend(results);
        }

        report.finish();
        let counts = report.counts();
        info!(
            mode = mode.as_str(),
            success = counts.success,
            skipped = counts.skipped,
            failed = counts.failed,
            cancelled = report.cancelled,
            "Run finished"
        );
        Ok(report)
    }

    /// Hourly files of the augmented collection for `day`, as fetched into
    /// the raw tree.
    pub fn fetched_inputs(&self, day: &CalendarUnit) -> Vec<PathBuf> {
        self.fetcher
            .collection_paths(*day, &self.config.augment.raw_collection, &self.config.raw_root)
            .unwrap_or_default()
    }

    /// Fetch one day, then augment it from the files just fetched.
    async fn fetch_and_augment(&self, day: CalendarUnit) -> Vec<JobResult> {
        let fetched = self.fetcher.fetch(day, &self.config.raw_root).await;
        let inputs = self.fetched_inputs(&day);
        let (_, out) = self.augment_paths(&day);

        let augmented = if fetched.is_failed() {
            let missing = inputs
                .iter()
                .find(|p| !p.is_file())
                .cloned()
                .unwrap_or_else(|| resolve_dir(&self.config.raw_root, &day));
            JobResult::from_error(day, Stage::Augment, &PipelineError::MissingInput(missing))
        } else {
            self.augmentor.augment_parts(&inputs, &out, day).await
        };
        vec![fetched, augmented]
    }
}

fn log_result(result: &JobResult) {
    let target = result.target.as_deref().unwrap_or("-");
    let detail = result.detail.as_deref().unwrap_or("");
    if result.is_failed() {
        warn!(
            unit = %result.unit,
            stage = result.stage.as_str(),
            target = target,
            detail = detail,
            "Unit failed"
        );
    } else {
        info!(
            unit = %result.unit,
            stage = result.stage.as_str(),
            target = target,
            status = result.status.as_str(),
            "Unit done"
        );
    }
}
