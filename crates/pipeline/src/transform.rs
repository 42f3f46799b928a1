//! Derived-variable transforms applied by the augmentor.

use geosfp_common::CalendarUnit;
use met_dataset::{Dataset, Variable};

use crate::config::SoilConfig;
use crate::error::{PipelineError, Result};

/// Computes new variables from an existing dataset.
///
/// Implementations must be pure: the same dataset and unit always yield the
/// same variables.
pub trait DatasetTransform: Send + Sync {
    fn name(&self) -> &str;

    /// Variables to add, keyed by name. Existing variables are never
    /// returned for replacement.
    fn derive(&self, dataset: &Dataset, unit: &CalendarUnit) -> Result<Vec<(String, Variable)>>;
}

/// Near-surface soil temperature derived from skin temperature.
///
/// The diurnal wave of the surface temperature is damped with depth while
/// the daily mean propagates unchanged:
///
/// `T(z, t) = mean(TS) + (TS(t) - mean(TS)) * exp(-z / d)`
///
/// where `z` is the layer depth and `d` the damping depth. The mean is taken
/// over the `time` dimension per grid cell; a source without a `time`
/// dimension is a single sample and is copied through.
#[derive(Debug, Clone)]
pub struct SoilTemperature {
    config: SoilConfig,
}

impl SoilTemperature {
    pub fn new(config: SoilConfig) -> Self {
        Self { config }
    }

    fn damping(&self) -> f32 {
        (-self.config.depth_m / self.config.damping_depth_m).exp()
    }
}

impl Default for SoilTemperature {
    fn default() -> Self {
        Self::new(SoilConfig::default())
    }
}

impl DatasetTransform for SoilTemperature {
    fn name(&self) -> &str {
        "soil_temperature"
    }

    fn derive(&self, dataset: &Dataset, unit: &CalendarUnit) -> Result<Vec<(String, Variable)>> {
        let source_name = &self.config.source_variable;
        let output_name = &self.config.output_variable;

        let source = dataset.variable(source_name).map_err(|_| {
            PipelineError::transform(format!("source variable {} not present", source_name))
        })?;
        if dataset.has_variable(output_name) {
            return Err(PipelineError::transform(format!(
                "output variable {} already present",
                output_name
            )));
        }
        let day_of_year = unit.day_of_year().ok_or_else(|| {
            PipelineError::transform(format!("{} is not a day unit", unit))
        })?;

        let shape = dataset
            .shape_of(source)
            .map_err(|e| PipelineError::transform(e.to_string()))?;
        let time_axis = source.dims.iter().position(|d| d == "time");
        let data = damp_toward_mean(&source.data, &shape, time_axis, self.damping());

        let mut variable = Variable::new(source.dims.clone(), data)
            .with_attribute("long_name", "soil temperature of the top layer")
            .with_attribute("depth_m", self.config.depth_m.to_string())
            .with_attribute("derived_from", source_name.clone())
            .with_attribute("day_of_year", day_of_year.to_string());
        if let Some(units) = source.attribute("units") {
            variable = variable.with_attribute("units", units);
        }

        Ok(vec![(output_name.clone(), variable)])
    }
}

/// Apply `mean + (x - mean) * factor` with the mean taken along `axis`.
/// NaN samples are excluded from the mean and stay NaN.
fn damp_toward_mean(data: &[f32], shape: &[usize], axis: Option<usize>, factor: f32) -> Vec<f32> {
    let Some(axis) = axis else {
        return data.to_vec();
    };

    let n = shape[axis];
    let outer: usize = shape[..axis].iter().product();
    let inner: usize = shape[axis + 1..].iter().product();
    let mut out = vec![f32::NAN; data.len()];

    for o in 0..outer {
        for i in 0..inner {
            let index = |t: usize| (o * n + t) * inner + i;

            let mut sum = 0.0f64;
            let mut count = 0usize;
            for t in 0..n {
                let v = data[index(t)];
                if !v.is_nan() {
                    sum += v as f64;
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }
            let mean = (sum / count as f64) as f32;

            for t in 0..n {
                let v = data[index(t)];
                out[index(t)] = if v.is_nan() {
                    f32::NAN
                } else {
                    mean + (v - mean) * factor
                };
            }
        }
    }
    out
}
