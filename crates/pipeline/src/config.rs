//! Pipeline configuration.
//!
//! Loaded from a YAML file; every section has defaults matching the GEOS-FP
//! tavg1 collections on the NCCS data portal and the GEOS-Chem 2x2.5 met
//! file naming, so a minimal file only needs the root directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use geosfp_common::{FileTemplate, OutputTarget, OutputTargets};
use met_dataset::DatasetFormat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of the raw download tree (`root/YYYY/MM/`).
    #[serde(default = "default_raw_root")]
    pub raw_root: PathBuf,
    /// Encoding of the datasets read and written by the transforms.
    #[serde(default)]
    pub dataset_format: DatasetFormat,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub augment: AugmentConfig,
    #[serde(default)]
    pub process: ProcessConfig,
}

fn default_raw_root() -> PathBuf {
    PathBuf::from("/data/GEOS_FP/ori")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_root: default_raw_root(),
            dataset_format: DatasetFormat::default(),
            remote: RemoteConfig::default(),
            augment: AugmentConfig::default(),
            process: ProcessConfig::default(),
        }
    }
}

/// Remote archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Directory URL template for one day of data.
    #[serde(default = "default_base_url")]
    pub base_url: FileTemplate,
    /// File name template; `{collection}` and `{hh}` are filled per file.
    #[serde(default = "default_file_template")]
    pub file_template: FileTemplate,
    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionConfig>,
    /// Whole-transfer timeout for one file.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Attempts per file before the unit is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Files of one unit downloaded concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_base_url() -> FileTemplate {
    FileTemplate::new("https://portal.nccs.nasa.gov/datashare/gmao/geos-fp/das/Y{yyyy}/M{mm}/D{dd}")
}

fn default_file_template() -> FileTemplate {
    FileTemplate::new("GEOS.fp.asm.{collection}.{yyyymmdd}_{hh}30.V01.nc4")
}

fn default_collections() -> Vec<CollectionConfig> {
    ["tavg1_2d_flx_Nx", "tavg1_2d_lnd_Nx", "tavg1_2d_rad_Nx", "tavg1_2d_slv_Nx"]
        .into_iter()
        .map(CollectionConfig::hourly)
        .collect()
}

fn default_timeout_secs() -> u64 {
    600 // 10 minutes
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            file_template: default_file_template(),
            collections: default_collections(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_attempts: default_max_attempts(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// One remote collection and the hours it is published for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default = "default_hours")]
    pub hours: Vec<u32>,
}

fn default_hours() -> Vec<u32> {
    (0..24).collect()
}

impl CollectionConfig {
    /// A time-averaged hourly collection (24 files per day).
    pub fn hourly(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hours: default_hours(),
        }
    }
}

/// Per-day variable augmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Where the datasets to augment live; defaults to `raw_root`.
    #[serde(default)]
    pub input_root: Option<PathBuf>,
    #[serde(default = "default_augment_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "default_met_template")]
    pub input_template: FileTemplate,
    #[serde(default = "default_met_template")]
    pub output_template: FileTemplate,
    /// Fetched collection whose hourly files feed the augmentation when
    /// fetching and augmenting in one run.
    #[serde(default = "default_raw_collection")]
    pub raw_collection: String,
    /// Rewrite outputs that already exist.
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub soil: SoilConfig,
}

fn default_augment_output_root() -> PathBuf {
    PathBuf::from("/data/GEOS_FP_soil_T")
}

fn default_met_template() -> FileTemplate {
    FileTemplate::new("GEOSFP.{yyyymmdd}.A1.2x25.nc")
}

fn default_raw_collection() -> String {
    "tavg1_2d_slv_Nx".to_string()
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            input_root: None,
            output_root: default_augment_output_root(),
            input_template: default_met_template(),
            output_template: default_met_template(),
            raw_collection: default_raw_collection(),
            overwrite: false,
            soil: SoilConfig::default(),
        }
    }
}

/// Parameters of the soil temperature derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilConfig {
    #[serde(default = "default_source_variable")]
    pub source_variable: String,
    #[serde(default = "default_output_variable")]
    pub output_variable: String,
    /// Depth of the layer centre (m).
    #[serde(default = "default_depth")]
    pub depth_m: f32,
    /// E-folding depth of the diurnal temperature wave (m).
    #[serde(default = "default_damping_depth")]
    pub damping_depth_m: f32,
}

fn default_source_variable() -> String {
    "TS".to_string()
}

fn default_output_variable() -> String {
    "TSOIL1".to_string()
}

fn default_depth() -> f32 {
    0.05
}

fn default_damping_depth() -> f32 {
    0.1
}

impl Default for SoilConfig {
    fn default() -> Self {
        Self {
            source_variable: default_source_variable(),
            output_variable: default_output_variable(),
            depth_m: default_depth(),
            damping_depth_m: default_damping_depth(),
        }
    }
}

/// Monthly processing with fan-out to output targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Run configuration directory for the external processing program.
    #[serde(default)]
    pub run_dir: Option<PathBuf>,
    /// Program (relative to `run_dir`) run once per day. When unset, days
    /// are processed with the built-in augmentation.
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default = "default_program_timeout_secs")]
    pub program_timeout_secs: u64,
    /// Scratch directory for external program output.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Output file name; `{label}` is replaced by the target label.
    #[serde(default = "default_output_template")]
    pub output_template: FileTemplate,
    /// Output targets keyed by label.
    #[serde(default)]
    pub outputs: BTreeMap<String, TargetConfig>,
    /// Dimensions reduced when a target coarsens the grid.
    #[serde(default = "default_horizontal_dims")]
    pub horizontal_dims: Vec<String>,
    #[serde(default)]
    pub overwrite: bool,
}

fn default_program_timeout_secs() -> u64 {
    3600
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp/geosfp-scratch")
}

fn default_output_template() -> FileTemplate {
    FileTemplate::new("GEOSFP.{yyyymmdd}.A1.{label}.nc")
}

fn default_horizontal_dims() -> Vec<String> {
    vec!["lat".to_string(), "lon".to_string()]
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            run_dir: None,
            program: None,
            program_timeout_secs: default_program_timeout_secs(),
            scratch_dir: default_scratch_dir(),
            output_template: default_output_template(),
            outputs: BTreeMap::new(),
            horizontal_dims: default_horizontal_dims(),
            overwrite: false,
        }
    }
}

impl ProcessConfig {
    pub fn program_timeout(&self) -> Duration {
        Duration::from_secs(self.program_timeout_secs)
    }

    pub fn output_targets(&self) -> OutputTargets {
        self.outputs
            .iter()
            .map(|(label, target)| {
                OutputTarget::new(label.clone(), target.root_dir.clone()).with_coarsen(target.coarsen)
            })
            .collect()
    }
}

/// One output target as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub root_dir: PathBuf,
    #[serde(default = "default_coarsen")]
    pub coarsen: u32,
}

fn default_coarsen() -> u32 {
    1
}

impl PipelineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content).map_err(|e| match e {
            PipelineError::Config(msg) => {
                PipelineError::config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        debug!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    /// Parse and validate YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| PipelineError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Root holding the datasets the augmentation reads.
    pub fn augment_input_root(&self) -> &Path {
        self.augment.input_root.as_deref().unwrap_or(self.raw_root.as_path())
    }

    /// Reject settings that would make every unit fail.
    pub fn validate(&self) -> Result<()> {
        let remote = &self.remote;
        if remote.max_attempts == 0 {
            return Err(PipelineError::config("remote.max_attempts must be at least 1"));
        }
        if remote.max_concurrent == 0 {
            return Err(PipelineError::config("remote.max_concurrent must be at least 1"));
        }
        if remote.timeout_secs == 0 {
            return Err(PipelineError::config("remote.timeout_secs must be positive"));
        }
        for collection in &remote.collections {
            if collection.name.is_empty() {
                return Err(PipelineError::config("remote collection with empty name"));
            }
            if let Some(hour) = collection.hours.iter().find(|h| **h > 23) {
                return Err(PipelineError::config(format!(
                    "collection {} has invalid hour {}",
                    collection.name, hour
                )));
            }
            let mut hours = collection.hours.clone();
            hours.sort_unstable();
            if let Some(pair) = hours.windows(2).find(|w| w[0] == w[1]) {
                return Err(PipelineError::config(format!(
                    "collection {} lists hour {} more than once",
                    collection.name, pair[0]
                )));
            }
        }

        let soil = &self.augment.soil;
        if !(soil.depth_m > 0.0 && soil.damping_depth_m > 0.0) {
            return Err(PipelineError::config("soil depths must be positive"));
        }
        if soil.output_variable == soil.source_variable {
            return Err(PipelineError::config(
                "soil output variable must differ from the source variable",
            ));
        }

        if let Some((label, _)) = self.process.outputs.iter().find(|(_, t)| t.coarsen == 0) {
            return Err(PipelineError::config(format!(
                "output {} has coarsen factor 0",
                label
            )));
        }
        if self.process.program.is_some() && self.process.run_dir.is_none() {
            return Err(PipelineError::config("process.program requires process.run_dir"));
        }
        Ok(())
    }
}
