//! Common types shared across the GEOS-FP retrieval pipeline.
//!
//! - [`calendar`]: day/month calendar units and inclusive ranges over them
//! - [`layout`]: the `root/YYYY/MM/` directory convention and file-name templates
//! - [`target`]: named output destinations for fan-out writes

pub mod calendar;
pub mod error;
pub mod layout;
pub mod target;

pub use calendar::{CalendarRange, CalendarUnit, Granularity, UnitIter, UnitSchedule};
pub use error::{CalendarError, CalendarResult};
pub use layout::{partial_path, resolve, resolve_artifact, resolve_dir, DataLocation, FileTemplate};
pub use target::{OutputTarget, OutputTargets};
