//! Seasonal rule evaluator.
//!
//! # Responsibility
//! - Compute the desired active/inactive state for one rule at one date.
//! - Report the matched window and the next date worth re-checking.
//!
//! # Invariants
//! - Date-range rules take precedence and never recur.
//! - Recurring rules match the nearest current-or-future occurrence; a stale
//!   past window is never matched.
//! - `next_check_at` is an optimization hint only: re-evaluating on any date
//!   must produce the same desired state.

use crate::calendar::{
    lunar_month_window, to_lunar, CalendarError, MIN_LUNAR_YEAR,
};
use crate::model::rule::{LunarYearSpec, SeasonalRule, WindowOffsets};
use chrono::{Datelike, Days, NaiveDate};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Sentinel returned when a rule can never match again.
pub const FAR_FUTURE: NaiveDate = NaiveDate::MAX;

/// Inclusive activation window with lead/lag offsets already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ActiveWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Result of evaluating one rule at one reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub desired_active: bool,
    /// The occurrence window the decision was made against; `None` for
    /// `SeasonalRule::None`.
    pub window: Option<ActiveWindow>,
    /// Nearest future boundary: window start if not yet begun, the day after
    /// the window end while inside it, `FAR_FUTURE` when nothing recurs.
    pub next_check_at: NaiveDate,
}

/// Evaluation failure; the scheduler skips the category and retains its
/// previous status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluateError {
    Calendar(CalendarError),
    /// Offset arithmetic left the representable date range.
    WindowOverflow,
}

impl Display for EvaluateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Calendar(err) => write!(f, "{err}"),
            Self::WindowOverflow => write!(f, "rule window exceeds the representable date range"),
        }
    }
}

impl Error for EvaluateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Calendar(err) => Some(err),
            Self::WindowOverflow => None,
        }
    }
}

impl From<CalendarError> for EvaluateError {
    fn from(value: CalendarError) -> Self {
        Self::Calendar(value)
    }
}

/// Evaluates one rule at the given reference date.
///
/// Pure and deterministic; `as_of` is the only notion of "now".
pub fn evaluate(rule: &SeasonalRule, as_of: NaiveDate) -> Result<Evaluation, EvaluateError> {
    match rule {
        SeasonalRule::DateRange {
            start,
            end,
            offsets,
        } => {
            let window = expand(*start, *end, offsets)?;
            Ok(one_shot(window, as_of))
        }
        SeasonalRule::LunarMonth {
            month,
            year: LunarYearSpec::Fixed(year),
            offsets,
        } => {
            let window = lunar_window(*year, *month, offsets)?;
            Ok(one_shot(window, as_of))
        }
        SeasonalRule::LunarMonth {
            month,
            year: LunarYearSpec::Auto,
            offsets,
        } => {
            let this_year = to_lunar(as_of)?.year;
            // Previous occurrence first: its lag window can reach across the
            // lunar new year and must union with the next lead window.
            for candidate in [this_year - 1, this_year] {
                if candidate < MIN_LUNAR_YEAR {
                    continue;
                }
                let window = lunar_window(candidate, *month, offsets)?;
                if window.end >= as_of {
                    return Ok(recurring(window, as_of));
                }
            }
            // The following year's window cannot end before a date that lies
            // inside this year.
            let window = lunar_window(this_year + 1, *month, offsets)?;
            Ok(recurring(window, as_of))
        }
        SeasonalRule::SolarMonth { month, offsets } => {
            let this_year = as_of.year();
            for candidate in [this_year - 1, this_year] {
                let window = solar_window(candidate, *month, offsets)?;
                if window.end >= as_of {
                    return Ok(recurring(window, as_of));
                }
            }
            let window = solar_window(this_year + 1, *month, offsets)?;
            Ok(recurring(window, as_of))
        }
        SeasonalRule::None => Ok(Evaluation {
            desired_active: false,
            window: None,
            next_check_at: FAR_FUTURE,
        }),
    }
}

fn lunar_window(
    year: i32,
    month: u8,
    offsets: &WindowOffsets,
) -> Result<ActiveWindow, EvaluateError> {
    let window = lunar_month_window(year, month)?;
    expand(window.start, window.last_day(), offsets)
}

fn solar_window(
    year: i32,
    month: u8,
    offsets: &WindowOffsets,
) -> Result<ActiveWindow, EvaluateError> {
    let start =
        NaiveDate::from_ymd_opt(year, u32::from(month), 1).ok_or(EvaluateError::WindowOverflow)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, u32::from(month) + 1, 1)
    }
    .ok_or(EvaluateError::WindowOverflow)?;
    let end = next_month
        .pred_opt()
        .ok_or(EvaluateError::WindowOverflow)?;
    expand(start, end, offsets)
}

fn expand(
    start: NaiveDate,
    end: NaiveDate,
    offsets: &WindowOffsets,
) -> Result<ActiveWindow, EvaluateError> {
    let start = start
        .checked_sub_days(Days::new(u64::from(offsets.activate_days_before)))
        .ok_or(EvaluateError::WindowOverflow)?;
    let end = end
        .checked_add_days(Days::new(u64::from(offsets.deactivate_days_after)))
        .ok_or(EvaluateError::WindowOverflow)?;
    Ok(ActiveWindow { start, end })
}

/// Non-recurring window: once it has passed there is nothing left to check.
fn one_shot(window: ActiveWindow, as_of: NaiveDate) -> Evaluation {
    let next_check_at = if as_of < window.start {
        window.start
    } else if as_of <= window.end {
        day_after(window.end)
    } else {
        FAR_FUTURE
    };
    Evaluation {
        desired_active: window.contains(as_of),
        window: Some(window),
        next_check_at,
    }
}

/// Recurring window chosen so that `as_of <= window.end` always holds.
fn recurring(window: ActiveWindow, as_of: NaiveDate) -> Evaluation {
    if as_of < window.start {
        Evaluation {
            desired_active: false,
            window: Some(window),
            next_check_at: window.start,
        }
    } else {
        Evaluation {
            desired_active: true,
            window: Some(window),
            next_check_at: day_after(window.end),
        }
    }
}

fn day_after(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(FAR_FUTURE)
}
