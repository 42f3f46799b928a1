//! Test data generators for creating synthetic GEOS-FP-like data.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use met_dataset::{Dataset, Variable};

use crate::fixtures::grid::GridSpec;

/// Creates hourly skin temperatures in Kelvin with a diurnal cycle.
///
/// Laid out as `[hours][height][width]`. The daily mean follows a
/// latitude gradient from 250K to 310K; the diurnal amplitude is 8K with
/// the peak at hour 12.
pub fn create_diurnal_temperature(hours: usize, width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(hours * width * height);
    for hour in 0..hours {
        let phase = (hour as f32 - 12.0) / 24.0 * std::f32::consts::TAU;
        let diurnal = 8.0 * phase.cos();
        for row in 0..height {
            let y_factor = row as f32 / height.max(1) as f32;
            for _col in 0..width {
                data.push(250.0 + y_factor * 60.0 + diurnal);
            }
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Builds a dataset with an hourly `TS` field on `grid`.
///
/// Dimensions are `time`, `lat`, `lon`; `TS` carries a `units` attribute.
pub fn surface_dataset(grid: GridSpec, hours: usize) -> Dataset {
    let mut ds = Dataset::new();
    ds.add_dimension("time", hours).expect("time dimension");
    ds.add_dimension("lat", grid.lat).expect("lat dimension");
    ds.add_dimension("lon", grid.lon).expect("lon dimension");
    ds.add_variable(
        "TS",
        Variable::new(
            ["time", "lat", "lon"],
            create_diurnal_temperature(hours, grid.lon, grid.lat),
        )
        .with_attribute("units", "K")
        .with_attribute("long_name", "surface skin temperature"),
    )
    .expect("TS variable");
    ds.set_attribute("Title", "GEOS-FP time-averaged surface fields");
    ds
}

/// Builds a dataset without any temperature field.
pub fn dataset_without_temperature(grid: GridSpec) -> Dataset {
    let mut ds = Dataset::new();
    ds.add_dimension("lat", grid.lat).expect("lat dimension");
    ds.add_dimension("lon", grid.lon).expect("lon dimension");
    ds.add_variable(
        "PS",
        Variable::new(["lat", "lon"], create_constant_grid(grid.lon, grid.lat, 101_325.0)),
    )
    .expect("PS variable");
    ds
}
