//! Common test fixtures for GEOS-FP pipeline tests.
//!
//! This module provides pre-defined test data that represents common
//! scenarios in GEOS-FP retrieval and processing.

/// Common grid specifications for testing.
pub mod grid {
    /// GEOS-Chem 2 x 2.5 degree global grid.
    pub const GEOS_2X25: GridSpec = GridSpec {
        label: "2x2.5",
        lon: 144,
        lat: 91,
    };

    /// GEOS-Chem 4 x 5 degree global grid.
    pub const GEOS_4X5: GridSpec = GridSpec {
        label: "4x5",
        lon: 72,
        lat: 46,
    };

    /// Simple 4x4 test grid
    pub const SIMPLE_4X4: GridSpec = GridSpec {
        label: "4x4",
        lon: 4,
        lat: 4,
    };

    /// Grid specification for testing.
    #[derive(Debug, Clone, Copy)]
    pub struct GridSpec {
        pub label: &'static str,
        pub lon: usize,
        pub lat: usize,
    }

    impl GridSpec {
        /// Returns the total number of grid cells.
        pub fn size(&self) -> usize {
            self.lon * self.lat
        }
    }
}

/// Common dates and ranges for testing.
pub mod dates {
    /// Six-day range used by the augmentation runs.
    pub const RANGE_START: &str = "20140820";
    pub const RANGE_END: &str = "20140825";
    pub const RANGE_DAYS: usize = 6;

    /// A 31-day month.
    pub const MONTH_AUGUST_2018: &str = "201808";
    pub const MONTH_AUGUST_2018_DAYS: usize = 31;

    /// Month list used by the monthly processing runs.
    pub const MONTH_LIST: &str = "201805,201806,201807";

    /// Leap-year February.
    pub const MONTH_FEB_2016: &str = "201602";
}

/// GEOS-FP remote collections.
pub mod collections {
    pub const FLX: &str = "tavg1_2d_flx_Nx";
    pub const LND: &str = "tavg1_2d_lnd_Nx";
    pub const SLV: &str = "tavg1_2d_slv_Nx";

    /// Hourly files per collection per day.
    pub const FILES_PER_DAY: usize = 24;
}

/// Common variable names.
pub mod variables {
    /// Surface skin temperature.
    pub const TS: &str = "TS";

    /// Derived top-layer soil temperature.
    pub const TSOIL1: &str = "TSOIL1";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_sizes() {
        assert_eq!(grid::GEOS_2X25.size(), 144 * 91);
        assert_eq!(grid::GEOS_4X5.size(), 72 * 46);
    }

    #[test]
    fn test_coarse_grid_is_half_of_fine_grid() {
        assert_eq!(grid::GEOS_2X25.lon.div_ceil(2), grid::GEOS_4X5.lon);
        assert_eq!(grid::GEOS_2X25.lat.div_ceil(2), grid::GEOS_4X5.lat);
    }
}
