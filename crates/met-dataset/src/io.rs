//! Dataset I/O backends.

use std::path::Path;
use std::sync::Arc;

use geosfp_common::partial_path;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::GridArchiveIo;
use crate::dataset::Dataset;
use crate::error::{DatasetError, DatasetResult};

/// Reads and writes datasets in one on-disk encoding.
pub trait DatasetIo: Send + Sync {
    /// Encoding handled by this backend.
    fn format(&self) -> DatasetFormat;

    /// Read a full dataset into memory.
    fn read_dataset(&self, path: &Path) -> DatasetResult<Dataset>;

    /// Write a dataset to `path`, replacing any existing file.
    fn write_dataset(&self, dataset: &Dataset, path: &Path) -> DatasetResult<()>;

    /// Write through a `.partial` sibling and rename on success, so an
    /// interrupted write never leaves a truncated file at `path`.
    fn write_atomic(&self, dataset: &Dataset, path: &Path) -> DatasetResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = partial_path(path);
        if let Err(e) = self.write_dataset(dataset, &temp) {
            std::fs::remove_file(&temp).ok();
            return Err(e);
        }
        if let Err(e) = std::fs::rename(&temp, path) {
            std::fs::remove_file(&temp).ok();
            return Err(e.into());
        }

        debug!(path = %path.display(), format = ?self.format(), "Dataset written");
        Ok(())
    }
}

/// Supported on-disk encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    /// Native gzip container, see [`GridArchiveIo`].
    #[default]
    Archive,
    /// NetCDF-4 (requires the `netcdf` feature).
    Netcdf,
}

impl DatasetFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Netcdf => "netcdf",
        }
    }
}

impl std::str::FromStr for DatasetFormat {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "archive" => Ok(Self::Archive),
            "netcdf" | "nc" | "nc4" => Ok(Self::Netcdf),
            other => Err(DatasetError::backend(format!("unknown dataset format: {}", other))),
        }
    }
}

/// Instantiate the backend for a format.
pub fn open_io(format: DatasetFormat) -> DatasetResult<Arc<dyn DatasetIo>> {
    match format {
        DatasetFormat::Archive => Ok(Arc::new(GridArchiveIo::new())),
        #[cfg(feature = "netcdf")]
        DatasetFormat::Netcdf => Ok(Arc::new(crate::netcdf_io::NetCdfIo::new())),
        #[cfg(not(feature = "netcdf"))]
        DatasetFormat::Netcdf => Err(DatasetError::backend(
            "NetCDF support not compiled in (enable the `netcdf` feature)",
        )),
    }
}
