//! Resumable GEOS-FP retrieval and augmentation pipeline.
//!
//! # Stages
//!
//! - [`fetch`]: download the raw files of a day or month, skipping units
//!   that are already complete
//! - [`augment`]: derive new variables (soil temperature) from a day's dataset
//! - [`monthly`]: process every day of a month and fan the output out to
//!   several target roots
//! - [`driver`]: run a stage over a date range or month list and collect a
//!   [`RunReport`]
//!
//! Every unit either succeeds, is skipped because its output already
//! exists, or fails with a recorded reason; a rerun over the same range
//! picks up exactly the failed units.

pub mod augment;
pub mod config;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod monthly;
pub mod remote;
pub mod report;
pub mod transform;

pub use augment::{Outcome, VariableAugmentor};
pub use config::{
    AugmentConfig, CollectionConfig, PipelineConfig, ProcessConfig, RemoteConfig, SoilConfig,
    TargetConfig,
};
pub use driver::{PipelineDriver, RunMode};
pub use error::{PipelineError, Result};
pub use fetch::RemoteFetcher;
pub use monthly::{AugmentStep, DayStep, ExternalStep, MonthlyProcessor};
pub use remote::{HttpArchive, RemoteArchive, RemoteFile};
pub use report::{JobResult, JobStatus, MonthSummary, RunReport, RunStatus, Stage, StatusCounts};
pub use transform::{DatasetTransform, SoilTemperature};
