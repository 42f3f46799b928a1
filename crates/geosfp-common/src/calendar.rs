//! Calendar units (days and months) and inclusive ranges over them.
//!
//! A [`CalendarUnit`] is the granularity of one processing job. Downloads of
//! whole months and per-day augmentation share the same type, tagged with a
//! [`Granularity`], so ranges and path resolution have one implementation.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, CalendarResult};

/// Granularity of a calendar unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => f.write_str("day"),
            Self::Month => f.write_str("month"),
        }
    }
}

/// A single day or a single month of the Gregorian calendar.
///
/// Month units are stored as the first day of the month, so a unit is
/// always a valid date and day units always fall inside their month.
/// Serialized as the canonical key (`yyyymmdd` or `yyyymm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CalendarUnit {
    granularity: Granularity,
    date: NaiveDate,
}

impl CalendarUnit {
    /// Create a day unit.
    pub fn day(year: i32, month: u32, day: u32) -> CalendarResult<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self::from_date)
            .ok_or(CalendarError::InvalidDate { year, month, day })
    }

    /// Create a month unit.
    pub fn month(year: i32, month: u32) -> CalendarResult<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|date| Self {
                granularity: Granularity::Month,
                date,
            })
            .ok_or(CalendarError::InvalidDate {
                year,
                month,
                day: 1,
            })
    }

    /// Day unit for a chrono date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            granularity: Granularity::Day,
            date,
        }
    }

    /// Parse a canonical key: `YYYYMMDD` for a day, `YYYYMM` for a month.
    pub fn parse_key(key: &str) -> CalendarResult<Self> {
        let key = key.trim();
        if !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CalendarError::InvalidKey(key.to_string()));
        }
        let field = |range: std::ops::Range<usize>| -> CalendarResult<u32> {
            key[range]
                .parse()
                .map_err(|_| CalendarError::InvalidKey(key.to_string()))
        };

        match key.len() {
            8 => Self::day(field(0..4)? as i32, field(4..6)?, field(6..8)?),
            6 => Self::month(field(0..4)? as i32, field(4..6)?),
            _ => Err(CalendarError::InvalidKey(key.to_string())),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn is_day(&self) -> bool {
        self.granularity == Granularity::Day
    }

    pub fn is_month(&self) -> bool {
        self.granularity == Granularity::Month
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month_number(&self) -> u32 {
        self.date.month()
    }

    /// Day of month, `None` for month units.
    pub fn day_number(&self) -> Option<u32> {
        self.is_day().then(|| self.date.day())
    }

    /// Day of year (1-366), `None` for month units.
    pub fn day_of_year(&self) -> Option<u32> {
        self.is_day().then(|| self.date.ordinal())
    }

    /// First calendar day covered by this unit.
    pub fn first_date(&self) -> NaiveDate {
        self.date
    }

    /// Last calendar day covered by this unit.
    pub fn last_date(&self) -> NaiveDate {
        match self.granularity {
            Granularity::Day => self.date,
            Granularity::Month => self
                .date
                .checked_add_months(Months::new(1))
                .and_then(|d| d.pred_opt())
                .unwrap_or(self.date),
        }
    }

    /// Zero-padded four digit year.
    pub fn yyyy(&self) -> String {
        format!("{:04}", self.date.year())
    }

    /// Zero-padded two digit month.
    pub fn mm(&self) -> String {
        format!("{:02}", self.date.month())
    }

    /// Zero-padded two digit day, `None` for month units.
    pub fn dd(&self) -> Option<String> {
        self.day_number().map(|d| format!("{:02}", d))
    }

    /// Canonical key: `yyyymmdd` for days, `yyyymm` for months.
    pub fn key(&self) -> String {
        match self.granularity {
            Granularity::Day => self.date.format("%Y%m%d").to_string(),
            Granularity::Month => self.date.format("%Y%m").to_string(),
        }
    }

    /// The month containing this unit.
    pub fn containing_month(&self) -> Self {
        Self {
            granularity: Granularity::Month,
            date: self.date.with_day(1).unwrap_or(self.date),
        }
    }

    /// The next unit of the same granularity.
    pub fn succ(&self) -> Option<Self> {
        let date = match self.granularity {
            Granularity::Day => self.date.succ_opt()?,
            Granularity::Month => self.date.checked_add_months(Months::new(1))?,
        };
        Some(Self {
            granularity: self.granularity,
            date,
        })
    }

    /// Every day of this unit, as a day range.
    ///
    /// For a day unit this is a single-element range.
    pub fn days(&self) -> CalendarRange {
        CalendarRange {
            start: Self::from_date(self.first_date()),
            end: Self::from_date(self.last_date()),
        }
    }
}

impl fmt::Display for CalendarUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for CalendarUnit {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_key(s)
    }
}

impl From<CalendarUnit> for String {
    fn from(unit: CalendarUnit) -> Self {
        unit.key()
    }
}

impl TryFrom<String> for CalendarUnit {
    type Error = CalendarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_key(&value)
    }
}

/// Inclusive range of calendar units of one granularity.
///
/// Iteration is lazy and restartable: iterating the same range twice yields
/// the same sequence. Deserialization goes through [`CalendarRange::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeBounds")]
pub struct CalendarRange {
    start: CalendarUnit,
    end: CalendarUnit,
}

#[derive(Deserialize)]
struct RangeBounds {
    start: CalendarUnit,
    end: CalendarUnit,
}

impl TryFrom<RangeBounds> for CalendarRange {
    type Error = CalendarError;

    fn try_from(bounds: RangeBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.start, bounds.end)
    }
}

impl CalendarRange {
    /// Create a range, rejecting inverted bounds and mixed granularities.
    pub fn new(start: CalendarUnit, end: CalendarUnit) -> CalendarResult<Self> {
        if start.granularity != end.granularity {
            return Err(CalendarError::invalid_range(
                start.key(),
                end.key(),
                format!(
                    "granularity mismatch ({} vs {})",
                    start.granularity, end.granularity
                ),
            ));
        }
        if start > end {
            return Err(CalendarError::invalid_range(
                start.key(),
                end.key(),
                "start is after end",
            ));
        }
        Ok(Self { start, end })
    }

    /// Parse a range from two canonical keys.
    pub fn parse(start: &str, end: &str) -> CalendarResult<Self> {
        Self::new(start.parse()?, end.parse()?)
    }

    pub fn start(&self) -> CalendarUnit {
        self.start
    }

    pub fn end(&self) -> CalendarUnit {
        self.end
    }

    pub fn granularity(&self) -> Granularity {
        self.start.granularity
    }

    /// Number of units in the range.
    pub fn len(&self) -> usize {
        match self.granularity() {
            Granularity::Day => {
                (self.end.date - self.start.date).num_days() as usize + 1
            }
            Granularity::Month => {
                let index = |u: &CalendarUnit| u.year() as i64 * 12 + u.month_number() as i64;
                (index(&self.end) - index(&self.start)) as usize + 1
            }
        }
    }

    /// Always false: a valid range holds at least one unit.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, unit: &CalendarUnit) -> bool {
        unit.granularity == self.granularity() && *unit >= self.start && *unit <= self.end
    }

    pub fn iter(&self) -> UnitIter {
        UnitIter {
            next: Some(self.start),
            end: self.end,
        }
    }
}

impl IntoIterator for CalendarRange {
    type Item = CalendarUnit;
    type IntoIter = UnitIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &CalendarRange {
    type Item = CalendarUnit;
    type IntoIter = UnitIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the units of a [`CalendarRange`].
#[derive(Debug, Clone)]
pub struct UnitIter {
    next: Option<CalendarUnit>,
    end: CalendarUnit,
}

impl Iterator for UnitIter {
    type Item = CalendarUnit;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if current > self.end {
            self.next = None;
            return None;
        }
        self.next = if current == self.end {
            None
        } else {
            current.succ()
        };
        Some(current)
    }
}

/// The units processed by one invocation: a contiguous range or an
/// explicit list (e.g. a handful of months picked for a rerun).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSchedule {
    Range(CalendarRange),
    List(Vec<CalendarUnit>),
}

impl UnitSchedule {
    /// Build an explicit list; all units must share one granularity.
    pub fn list(units: Vec<CalendarUnit>) -> CalendarResult<Self> {
        let (first, last) = match (units.first(), units.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(CalendarError::invalid_range("", "", "empty unit list")),
        };
        if let Some(odd) = units.iter().find(|u| u.granularity != first.granularity) {
            return Err(CalendarError::invalid_range(
                first.key(),
                last.key(),
                format!("unit {} is not a {}", odd, first.granularity),
            ));
        }
        Ok(Self::List(units))
    }

    /// Parse a comma separated list of keys, e.g. `201407,201408,201409`.
    pub fn parse_list(keys: &str) -> CalendarResult<Self> {
        let units = keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(CalendarUnit::parse_key)
            .collect::<CalendarResult<Vec<_>>>()?;
        Self::list(units)
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Range(range) => range.granularity(),
            // list() rejects empty lists
            Self::List(units) => units
                .first()
                .map(|u| u.granularity)
                .unwrap_or(Granularity::Day),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Range(range) => range.len(),
            Self::List(units) => units.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = CalendarUnit> + '_> {
        match self {
            Self::Range(range) => Box::new(range.iter()),
            Self::List(units) => Box::new(units.iter().copied()),
        }
    }
}

impl From<CalendarRange> for UnitSchedule {
    fn from(range: CalendarRange) -> Self {
        Self::Range(range)
    }
}
