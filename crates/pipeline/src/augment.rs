//! Per-day variable augmentation.
//!
//! Reads one dataset (or the hourly parts of one, joined along `time`), adds
//! the variables computed by a [`DatasetTransform`] and writes the result
//! atomically. Pre-existing variables and attributes are copied unchanged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use geosfp_common::CalendarUnit;
use met_dataset::{Dataset, DatasetIo};
use tracing::{debug, info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::report::{JobResult, Stage};
use crate::transform::DatasetTransform;

/// What an augmentation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Written(PathBuf),
    /// The output existed and overwriting is disabled.
    AlreadyPresent(PathBuf),
}

/// Applies a transform to datasets through a dataset I/O backend.
#[derive(Clone)]
pub struct VariableAugmentor {
    io: Arc<dyn DatasetIo>,
    transform: Arc<dyn DatasetTransform>,
    overwrite: bool,
}

impl VariableAugmentor {
    pub fn new(io: Arc<dyn DatasetIo>, transform: Arc<dyn DatasetTransform>) -> Self {
        Self {
            io,
            transform,
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn io(&self) -> &Arc<dyn DatasetIo> {
        &self.io
    }

    /// Augment one unit. Never returns an error: failures are reported in
    /// the result.
    pub async fn augment(&self, raw_path: &Path, out_path: &Path, unit: CalendarUnit) -> JobResult {
        self.augment_parts(&[raw_path.to_path_buf()], out_path, unit).await
    }

    /// Augment one unit whose input is split over `parts` (hourly files of
    /// one collection), joined along `time` in the given order.
    #[instrument(skip(self, parts, out_path), fields(unit = %unit, transform = self.transform.name(), parts = parts.len()))]
    pub async fn augment_parts(&self, parts: &[PathBuf], out_path: &Path, unit: CalendarUnit) -> JobResult {
        let result = match self.try_augment_parts(parts, out_path, unit).await {
            Ok(Outcome::Written(path)) => {
                info!(path = %path.display(), "Augmented dataset written");
                JobResult::success(unit, Stage::Augment).with_detail(path.display().to_string())
            }
            Ok(Outcome::AlreadyPresent(path)) => {
                debug!(path = %path.display(), "Output present, skipping");
                JobResult::skipped(unit, Stage::Augment, "output already present")
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Augmentation failed");
                JobResult::from_error(unit, Stage::Augment, &e)
            }
        };

        metrics::counter!(
            "geosfp_units_total",
            "stage" => Stage::Augment.as_str(),
            "status" => result.status.as_str()
        )
        .increment(1);
        result
    }

    /// Augment one unit, surfacing the error.
    pub async fn try_augment(
        &self,
        raw_path: &Path,
        out_path: &Path,
        unit: CalendarUnit,
    ) -> Result<Outcome> {
        self.try_augment_parts(&[raw_path.to_path_buf()], out_path, unit).await
    }

    pub async fn try_augment_parts(
        &self,
        parts: &[PathBuf],
        out_path: &Path,
        unit: CalendarUnit,
    ) -> Result<Outcome> {
        if !self.overwrite && out_path.is_file() {
            return Ok(Outcome::AlreadyPresent(out_path.to_path_buf()));
        }

        let this = self.clone();
        let parts = parts.to_vec();
        let out_path = out_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let dataset = this.derive_parts(&parts, &unit)?;
            this.io
                .write_atomic(&dataset, &out_path)
                .map_err(|e| PipelineError::write(&out_path, e))?;
            Ok(Outcome::Written(out_path))
        })
        .await
        .map_err(|e| PipelineError::transform(format!("augmentation task failed: {}", e)))?
    }

    /// Read `raw_path` and return the augmented dataset without writing it.
    ///
    /// Blocking; call from a blocking context.
    pub fn derive(&self, raw_path: &Path, unit: &CalendarUnit) -> Result<Dataset> {
        let dataset = self
            .io
            .read_dataset(raw_path)
            .map_err(|e| PipelineError::from_read(raw_path, e))?;
        self.apply(dataset, unit)
    }

    /// Read every part, join them along `time` and return the augmented
    /// dataset. A single part is read as is.
    ///
    /// Blocking; call from a blocking context.
    pub fn derive_parts(&self, parts: &[PathBuf], unit: &CalendarUnit) -> Result<Dataset> {
        match parts {
            [] => Err(PipelineError::transform(format!("no input files for {}", unit))),
            [single] => self.derive(single, unit),
            _ => {
                let datasets = parts
                    .iter()
                    .map(|path| {
                        self.io
                            .read_dataset(path)
                            .map_err(|e| PipelineError::from_read(path, e))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let joined = Dataset::concat(&datasets, "time")
                    .map_err(|e| PipelineError::transform(format!("cannot join hourly files: {}", e)))?;
                self.apply(joined, unit)
            }
        }
    }

    /// Add the transform's variables to `dataset`.
    pub fn apply(&self, mut dataset: Dataset, unit: &CalendarUnit) -> Result<Dataset> {
        let derived = self.transform.derive(&dataset, unit)?;
        for (name, variable) in derived {
            dataset
                .add_variable(name, variable)
                .map_err(|e| PipelineError::transform(e.to_string()))?;
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::SoilTemperature;
    use met_dataset::{GridArchiveIo, Variable};
    use tempfile::TempDir;

    fn augmentor() -> VariableAugmentor {
        VariableAugmentor::new(
            Arc::new(GridArchiveIo::new()),
            Arc::new(SoilTemperature::default()),
        )
    }

    fn write_surface(io: &dyn DatasetIo, path: &Path) {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 2).unwrap();
        ds.add_dimension("lat", 1).unwrap();
        ds.add_variable("TS", Variable::new(["time", "lat"], vec![280.0, 300.0]))
            .unwrap();
        ds.set_attribute("title", "GEOS-FP");
        io.write_atomic(&ds, path).unwrap();
    }

    #[tokio::test]
    async fn test_augment_keeps_existing_fields() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw.nc");
        let out = tmp.path().join("out/2014/08/augmented.nc");
        let aug = augmentor();
        write_surface(aug.io().as_ref(), &raw);

        let day: CalendarUnit = "20140820".parse().unwrap();
        let outcome = aug.try_augment(&raw, &out, day).await.unwrap();
        assert_eq!(outcome, Outcome::Written(out.clone()));

        let written = aug.io().read_dataset(&out).unwrap();
        let original = aug.io().read_dataset(&raw).unwrap();
        assert_eq!(written.variable("TS").unwrap(), original.variable("TS").unwrap());
        assert!(written.has_variable("TSOIL1"));
        assert_eq!(written.attribute("title"), Some("GEOS-FP"));
    }

    #[tokio::test]
    async fn test_existing_output_is_skipped_unless_overwrite() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw.nc");
        let out = tmp.path().join("out.nc");
        let aug = augmentor();
        write_surface(aug.io().as_ref(), &raw);
        std::fs::write(&out, b"existing").unwrap();

        let day: CalendarUnit = "20140820".parse().unwrap();
        let result = aug.augment(&raw, &out, day).await;
        assert_eq!(result.status, crate::report::JobStatus::Skipped);
        assert_eq!(std::fs::read(&out).unwrap(), b"existing");

        let result = aug.clone().with_overwrite(true).augment(&raw, &out, day).await;
        assert_eq!(result.status, crate::report::JobStatus::Success);
    }

    fn write_hour(io: &dyn DatasetIo, path: &Path, ts: f32) {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 1).unwrap();
        ds.add_dimension("lat", 1).unwrap();
        ds.add_variable("TS", Variable::new(["time", "lat"], vec![ts])).unwrap();
        io.write_atomic(&ds, path).unwrap();
    }

    #[tokio::test]
    async fn test_hourly_parts_are_joined_before_deriving() {
        let tmp = TempDir::new().unwrap();
        let aug = augmentor();
        let parts: Vec<PathBuf> = [("0030", 280.0), ("1230", 300.0)]
            .into_iter()
            .map(|(hhmm, ts)| {
                let path = tmp.path().join(format!("GEOS.fp.asm.tavg1_2d_slv_Nx.20140820_{}.V01.nc4", hhmm));
                write_hour(aug.io().as_ref(), &path, ts);
                path
            })
            .collect();
        let out = tmp.path().join("out.nc");

        let day: CalendarUnit = "20140820".parse().unwrap();
        let result = aug.augment_parts(&parts, &out, day).await;
        assert_eq!(result.status, crate::report::JobStatus::Success);

        let written = aug.io().read_dataset(&out).unwrap();
        assert_eq!(written.dimension_len("time"), Some(2));
        assert_eq!(written.variable("TS").unwrap().data, vec![280.0, 300.0]);
        let tsoil = &written.variable("TSOIL1").unwrap().data;
        assert!(tsoil[0] > 280.0 && tsoil[1] < 300.0);
    }

    #[tokio::test]
    async fn test_missing_hourly_part_is_missing_input() {
        let tmp = TempDir::new().unwrap();
        let aug = augmentor();
        let present = tmp.path().join("hour00.nc4");
        write_hour(aug.io().as_ref(), &present, 280.0);
        let absent = tmp.path().join("hour12.nc4");

        let day: CalendarUnit = "20140820".parse().unwrap();
        let err = aug
            .try_augment_parts(&[present, absent.clone()], &tmp.path().join("out.nc"), day)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(p) if p == absent));
    }

    #[tokio::test]
    async fn test_existing_output_variable_is_transform_error() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw.nc");
        let aug = augmentor();

        let mut ds = Dataset::new();
        ds.add_dimension("lat", 1).unwrap();
        ds.add_variable("TS", Variable::new(["lat"], vec![280.0])).unwrap();
        ds.add_variable("TSOIL1", Variable::new(["lat"], vec![1.0])).unwrap();
        aug.io().write_atomic(&ds, &raw).unwrap();

        let day: CalendarUnit = "20140820".parse().unwrap();
        let err = aug
            .try_augment(&raw, &tmp.path().join("out.nc"), day)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transform(_)));
    }
}
