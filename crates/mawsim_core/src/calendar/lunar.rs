//! Tabular lunar-calendar arithmetic.
//!
//! # Responsibility
//! - Implement the civil tabular approximation of the Islamic lunar calendar.
//! - Map lunar months to half-open Gregorian date windows.
//!
//! # Invariants
//! - Epoch is fixed at 1 Muharram AH 1 = JDN 1948440 (0622-07-19 Gregorian).
//! - Leap years follow the arithmetic 30-year cycle, not moon sighting.
//! - Conversions outside `MIN_LUNAR_YEAR..=MAX_LUNAR_YEAR` are errors.

use super::{CalendarError, CalendarResult};
use chrono::{Datelike, NaiveDate};

/// First supported lunar year (starts 1899-05-12 Gregorian).
pub const MIN_LUNAR_YEAR: i32 = 1317;
/// Last supported lunar year (ends in Gregorian year 2194).
pub const MAX_LUNAR_YEAR: i32 = 1621;

/// Julian day number of 1 Muharram AH 1 in the civil reckoning.
const EPOCH_JDN: i64 = 1_948_440;

/// Offset between chrono's `num_days_from_ce` day count and JDN.
const CE_TO_JDN: i64 = 1_721_425;

const MONTH_NAMES: [&str; 12] = [
    "muharram",
    "safar",
    "rabi_al_awwal",
    "rabi_al_thani",
    "jumada_al_awwal",
    "jumada_al_thani",
    "rajab",
    "shaban",
    "ramadan",
    "shawwal",
    "dhu_al_qadah",
    "dhu_al_hijjah",
];

/// A date in the tabular lunar calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LunarDate {
    pub year: i32,
    /// 1..=12.
    pub month: u8,
    /// 1..=30.
    pub day: u8,
}

/// Gregorian window covered by one lunar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    /// First Gregorian day of the lunar month.
    pub start: NaiveDate,
    /// First Gregorian day of the following lunar month.
    pub end_exclusive: NaiveDate,
}

impl MonthWindow {
    /// Last Gregorian day that still belongs to the lunar month.
    pub fn last_day(&self) -> NaiveDate {
        self.end_exclusive.pred_opt().unwrap_or(self.end_exclusive)
    }
}

/// Returns whether a lunar year is a leap year in the 30-year civil cycle.
///
/// Leap years are 2, 5, 7, 10, 13, 16, 18, 21, 24, 26 and 29 of each cycle.
pub fn is_leap_lunar_year(year: i32) -> bool {
    (11 * i64::from(year) + 3).rem_euclid(30) >= 19
}

/// Returns the length in days of a lunar month.
///
/// Odd months have 30 days, even months 29, except month 12 which has 30
/// days in leap years.
pub fn month_length(year: i32, month: u8) -> CalendarResult<u8> {
    check_month(month)?;
    Ok(match month {
        12 if is_leap_lunar_year(year) => 30,
        m if m % 2 == 1 => 30,
        _ => 29,
    })
}

/// Returns the canonical transliterated name of a lunar month.
pub fn lunar_month_name(month: u8) -> CalendarResult<&'static str> {
    check_month(month)?;
    Ok(MONTH_NAMES[usize::from(month) - 1])
}

/// Resolves a lunar month name to its 1-based index.
///
/// Matching ignores case, spacing and punctuation, so `"Rabi' al-Awwal"`,
/// `"rabi al awwal"` and `"rabi_al_awwal"` all resolve to month 3.
pub fn parse_lunar_month_name(name: &str) -> Option<u8> {
    let normalized = normalize_month_name(name);
    MONTH_NAMES
        .iter()
        .position(|candidate| normalize_month_name(candidate) == normalized)
        .map(|index| index as u8 + 1)
}

fn normalize_month_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Converts a Gregorian date to its lunar-calendar equivalent.
pub fn to_lunar(date: NaiveDate) -> CalendarResult<LunarDate> {
    let jdn = i64::from(date.num_days_from_ce()) + CE_TO_JDN;
    let year = lunar_year_of_jdn(jdn);
    if !(MIN_LUNAR_YEAR..=MAX_LUNAR_YEAR).contains(&year) {
        return Err(CalendarError::UnsupportedDate(date));
    }

    let day_of_year = jdn - lunar_new_year_jdn(year);
    let mut month = 12u8;
    while month > 1 && day_of_year < month_start_offset(month) {
        month -= 1;
    }
    let day = day_of_year - month_start_offset(month) + 1;

    Ok(LunarDate {
        year,
        month,
        day: day as u8,
    })
}

/// Returns the Gregorian window `[start, end)` of one lunar month.
pub fn lunar_month_window(year: i32, month: u8) -> CalendarResult<MonthWindow> {
    check_month(month)?;
    if !(MIN_LUNAR_YEAR..=MAX_LUNAR_YEAR).contains(&year) {
        return Err(CalendarError::UnsupportedLunarYear(year));
    }

    let start_jdn = lunar_new_year_jdn(year) + month_start_offset(month);
    let end_jdn = if month == 12 {
        lunar_new_year_jdn(year + 1)
    } else {
        lunar_new_year_jdn(year) + month_start_offset(month + 1)
    };

    Ok(MonthWindow {
        start: jdn_to_gregorian(start_jdn, year)?,
        end_exclusive: jdn_to_gregorian(end_jdn, year)?,
    })
}

/// JDN of 1 Muharram of the given lunar year.
fn lunar_new_year_jdn(year: i32) -> i64 {
    let y = i64::from(year);
    EPOCH_JDN + 354 * (y - 1) + (3 + 11 * y).div_euclid(30)
}

/// Lunar year containing the given JDN (standard inverse of the cycle sum).
fn lunar_year_of_jdn(jdn: i64) -> i32 {
    ((30 * (jdn - EPOCH_JDN) + 10_646).div_euclid(10_631)) as i32
}

/// Day offset of the first day of a month from 1 Muharram.
///
/// Closed form of the cumulative 30/29 alternation.
fn month_start_offset(month: u8) -> i64 {
    let m = i64::from(month);
    (59 * (m - 1) + 1) / 2
}

fn jdn_to_gregorian(jdn: i64, year: i32) -> CalendarResult<NaiveDate> {
    let days = i32::try_from(jdn - CE_TO_JDN)
        .map_err(|_| CalendarError::UnsupportedLunarYear(year))?;
    NaiveDate::from_num_days_from_ce_opt(days)
        .ok_or(CalendarError::UnsupportedLunarYear(year))
}

fn check_month(month: u8) -> CalendarResult<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(CalendarError::InvalidLunarMonth(month))
    }
}
