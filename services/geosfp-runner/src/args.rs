//! Command-line schedule selection.

use anyhow::{bail, Context, Result};
use clap::Args;
use geosfp_common::{CalendarRange, UnitSchedule};

/// Either an inclusive date range or an explicit list of units.
#[derive(Args, Debug, Clone)]
pub struct ScheduleArgs {
    /// First unit of the range (YYYYMMDD or YYYYMM)
    #[arg(long, requires = "end", conflicts_with = "months")]
    pub start: Option<String>,

    /// Last unit of the range, inclusive
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Comma-separated units (e.g. 201407,201408)
    #[arg(long)]
    pub months: Option<String>,
}

impl ScheduleArgs {
    pub fn to_schedule(&self) -> Result<UnitSchedule> {
        match (&self.start, &self.end, &self.months) {
            (_, _, Some(list)) => {
                UnitSchedule::parse_list(list).with_context(|| format!("invalid unit list {}", list))
            }
            (Some(start), Some(end), None) => {
                let range = CalendarRange::parse(start, end)
                    .with_context(|| format!("invalid range {}..{}", start, end))?;
                Ok(range.into())
            }
            _ => bail!("either --start and --end or --months is required"),
        }
    }
}
