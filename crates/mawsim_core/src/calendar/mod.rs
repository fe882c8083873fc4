//! Calendar conversion primitives for seasonal rule evaluation.
//!
//! # Responsibility
//! - Convert Gregorian dates to lunar-calendar dates and back.
//! - Resolve lunar month windows as Gregorian date ranges.
//!
//! # Invariants
//! - All functions are pure and deterministic; no I/O, no clock reads.
//! - Dates outside the supported tabular range are rejected, never guessed.

use chrono::NaiveDate;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod lunar;

pub use lunar::{
    is_leap_lunar_year, lunar_month_name, lunar_month_window, month_length,
    parse_lunar_month_name, to_lunar, LunarDate, MonthWindow, MAX_LUNAR_YEAR, MIN_LUNAR_YEAR,
};

pub type CalendarResult<T> = Result<T, CalendarError>;

/// Conversion failure for dates outside the tabular calendar's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    /// Gregorian date falls outside the supported lunar-year table.
    UnsupportedDate(NaiveDate),
    /// Lunar year is outside the supported table.
    UnsupportedLunarYear(i32),
    /// Lunar month must be 1..=12.
    InvalidLunarMonth(u8),
}

impl Display for CalendarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedDate(date) => {
                write!(f, "date {date} is outside the supported lunar calendar range")
            }
            Self::UnsupportedLunarYear(year) => write!(
                f,
                "lunar year {year} is outside the supported range {MIN_LUNAR_YEAR}..={MAX_LUNAR_YEAR}"
            ),
            Self::InvalidLunarMonth(month) => {
                write!(f, "lunar month {month} is invalid; expected 1..=12")
            }
        }
    }
}

impl Error for CalendarError {}
