//! NetCDF-4 backend.
//!
//! Numeric variables are read as f32 (netCDF-C performs the conversion);
//! character and string variables are skipped. Only string attributes are
//! carried over.

use std::path::Path;

use netcdf::AttributeValue;
use tracing::debug;

use crate::dataset::{Dataset, Variable};
use crate::error::{DatasetError, DatasetResult};
use crate::io::{DatasetFormat, DatasetIo};

/// Reads and writes NetCDF-4 files.
#[derive(Debug, Clone, Default)]
pub struct NetCdfIo;

impl NetCdfIo {
    pub fn new() -> Self {
        Self
    }
}

fn nc_err(path: &Path, err: netcdf::Error) -> DatasetError {
    DatasetError::backend(format!("{}: {}", path.display(), err))
}

impl DatasetIo for NetCdfIo {
    fn format(&self) -> DatasetFormat {
        DatasetFormat::Netcdf
    }

    fn read_dataset(&self, path: &Path) -> DatasetResult<Dataset> {
        if !path.exists() {
            return Err(DatasetError::NotFound(path.to_path_buf()));
        }
        let file = netcdf::open(path).map_err(|e| nc_err(path, e))?;

        let mut dataset = Dataset::new();
        for dim in file.dimensions() {
            dataset.add_dimension(dim.name(), dim.len())?;
        }
        for attr in file.attributes() {
            if let Ok(AttributeValue::Str(value)) = attr.value() {
                dataset.set_attribute(attr.name(), value);
            }
        }

        for var in file.variables() {
            let name = var.name();
            let data: Vec<f32> = match var.get_values::<f32, _>(..) {
                Ok(data) => data,
                Err(e) => {
                    debug!(variable = %name, error = %e, "Skipping non-numeric variable");
                    continue;
                }
            };
            let mut variable = Variable::new(var.dimensions().iter().map(|d| d.name()), data);
            for attr in var.attributes() {
                if let Ok(AttributeValue::Str(value)) = attr.value() {
                    variable.attributes.insert(attr.name().to_string(), value);
                }
            }
            dataset.add_variable(name, variable)?;
        }

        Ok(dataset)
    }

    fn write_dataset(&self, dataset: &Dataset, path: &Path) -> DatasetResult<()> {
        let mut file = netcdf::create(path).map_err(|e| nc_err(path, e))?;

        for dim in dataset.dimensions() {
            file.add_dimension(&dim.name, dim.len)
                .map_err(|e| nc_err(path, e))?;
        }
        for (name, value) in dataset.attributes() {
            file.add_attribute(name, value.as_str())
                .map_err(|e| nc_err(path, e))?;
        }

        for (name, var) in dataset.variables() {
            let dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();
            let mut nc_var = file
                .add_variable::<f32>(name, &dims)
                .map_err(|e| nc_err(path, e))?;
            for (attr, value) in &var.attributes {
                nc_var
                    .put_attribute(attr, value.as_str())
                    .map_err(|e| nc_err(path, e))?;
            }
            nc_var
                .put_values(&var.data, ..)
                .map_err(|e| nc_err(path, e))?;
        }

        Ok(())
    }
}
