//! Gridded meteorological datasets.
//!
//! The pipeline treats dataset encoding as an external concern: it reads a
//! [`Dataset`] through a [`DatasetIo`] backend, derives new variables and
//! writes the result back through the same backend.
//!
//! # Backends
//!
//! - [`GridArchiveIo`]: gzip-compressed container with a JSON header and a
//!   little-endian f32 payload. Pure Rust, always available.
//! - `NetCdfIo` (feature `netcdf`): NetCDF-4 files via the `netcdf` crate.
//!   Requires libnetcdf and libhdf5 on the build host.
//!
//! # Example
//!
//! ```ignore
//! use met_dataset::{Dataset, DatasetIo, GridArchiveIo, Variable};
//!
//! let mut ds = Dataset::new();
//! ds.add_dimension("lat", 91)?;
//! ds.add_dimension("lon", 144)?;
//! ds.add_variable("TS", Variable::new(["lat", "lon"], vec![288.0; 91 * 144]))?;
//!
//! let io = GridArchiveIo::new();
//! io.write_atomic(&ds, Path::new("/data/2014/08/GEOSFP.20140820.A1.2x25.nc"))?;
//! ```

pub mod archive;
pub mod dataset;
pub mod downsample;
pub mod error;
pub mod io;
#[cfg(feature = "netcdf")]
pub mod netcdf_io;

pub use archive::GridArchiveIo;
pub use dataset::{Dataset, Dimension, Variable};
pub use downsample::{coarsen_axis, coarsen_dataset};
pub use error::{DatasetError, DatasetResult};
pub use io::{open_io, DatasetFormat, DatasetIo};
#[cfg(feature = "netcdf")]
pub use netcdf_io::NetCdfIo;
