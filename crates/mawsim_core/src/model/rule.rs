//! Seasonal rule payloads and their validated tagged representation.
//!
//! # Responsibility
//! - Model the loosely-shaped rule configuration written by the admin surface.
//! - Translate it once into a mutually-exclusive tagged variant.
//!
//! # Invariants
//! - `SeasonalRule` is the only shape the evaluator consumes; it never
//!   re-inspects which optional payload fields were present.
//! - Date-range fields take precedence over month-based fields.
//! - Lunar and solar month selection is mutually exclusive.

use crate::calendar::{parse_lunar_month_name, MAX_LUNAR_YEAR, MIN_LUNAR_YEAR};
use chrono::NaiveDate;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lead/lag expansion applied to a matched season window, in days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowOffsets {
    /// Days before the window start during which the category is already active.
    #[serde(default)]
    pub activate_days_before: u32,
    /// Days after the window end during which the category stays active.
    #[serde(default)]
    pub deactivate_days_after: u32,
}

/// Target lunar year selection for a lunar month rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LunarYearSpec {
    /// Follow the lunar year of the evaluation date, rolling forward past
    /// windows that have already ended.
    Auto,
    /// Match one specific lunar year only.
    Fixed(i32),
}

impl Serialize for LunarYearSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auto => serializer.serialize_str("auto"),
            Self::Fixed(year) => serializer.serialize_i32(*year),
        }
    }
}

impl<'de> Deserialize<'de> for LunarYearSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(i32),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(year) => Ok(Self::Fixed(year)),
            Repr::Text(text) if text.trim().eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            Repr::Text(text) => Err(D::Error::custom(format!(
                "invalid lunar year `{text}`; expected \"auto\" or an integer"
            ))),
        }
    }
}

/// Lunar month as written by the admin surface: an index or a month name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LunarMonthField {
    Number(u8),
    Name(String),
}

impl LunarMonthField {
    fn resolve(&self) -> Result<u8, RuleValidationError> {
        match self {
            Self::Number(month) => Ok(*month),
            Self::Name(name) => parse_lunar_month_name(name)
                .ok_or_else(|| RuleValidationError::UnknownMonthName(name.clone())),
        }
    }
}

/// Loosely-shaped rule configuration as persisted by the admin surface.
///
/// Optional fields are intentionally permissive; [`RulePayload::into_rule`]
/// is the single place that enforces shape invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lunar_month: Option<LunarMonthField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lunar_year: Option<LunarYearSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solar_month: Option<u8>,
    #[serde(default)]
    pub activate_days_before: u32,
    #[serde(default)]
    pub deactivate_days_after: u32,
}

/// Validated, mutually-exclusive seasonal rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeasonalRule {
    /// Explicit date range; highest precedence, non-recurring.
    DateRange {
        start: NaiveDate,
        end: NaiveDate,
        offsets: WindowOffsets,
    },
    /// One lunar month, recurring when `year` is `Auto`.
    LunarMonth {
        month: u8,
        year: LunarYearSpec,
        offsets: WindowOffsets,
    },
    /// One Gregorian month, recurring every year.
    SolarMonth { month: u8, offsets: WindowOffsets },
    /// No seasonal behavior; the category is never auto-activated.
    None,
}

impl SeasonalRule {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Rejection reasons for rule payloads, raised at rule-write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleValidationError {
    /// Persisted payload is not valid JSON for the expected shape.
    MalformedPayload(String),
    /// Only one of `start_date`/`end_date` was provided.
    IncompleteDateRange,
    StartAfterEnd { start: NaiveDate, end: NaiveDate },
    /// Both lunar and solar month fields are set.
    LunarSolarConflict,
    MonthOutOfRange(u8),
    UnknownMonthName(String),
    /// `lunar_year` is meaningless without `lunar_month`.
    LunarYearWithoutMonth,
    LunarYearOutOfRange(i32),
}

impl Display for RuleValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedPayload(message) => write!(f, "malformed rule payload: {message}"),
            Self::IncompleteDateRange => {
                write!(f, "date range rule requires both start_date and end_date")
            }
            Self::StartAfterEnd { start, end } => {
                write!(f, "rule start_date {start} is after end_date {end}")
            }
            Self::LunarSolarConflict => {
                write!(f, "lunar_month and solar_month are mutually exclusive")
            }
            Self::MonthOutOfRange(month) => {
                write!(f, "month {month} is out of range; expected 1..=12")
            }
            Self::UnknownMonthName(name) => write!(f, "unknown lunar month name `{name}`"),
            Self::LunarYearWithoutMonth => {
                write!(f, "lunar_year is set but lunar_month is missing")
            }
            Self::LunarYearOutOfRange(year) => write!(
                f,
                "lunar year {year} is outside the supported range {MIN_LUNAR_YEAR}..={MAX_LUNAR_YEAR}"
            ),
        }
    }
}

impl Error for RuleValidationError {}

impl RulePayload {
    /// Translates the loose payload into its tagged rule variant.
    ///
    /// # Contract
    /// - A complete date range wins over any month fields.
    /// - Lunar and solar month selection cannot be combined.
    /// - A payload with no season fields at all yields `SeasonalRule::None`.
    pub fn into_rule(&self) -> Result<SeasonalRule, RuleValidationError> {
        let offsets = WindowOffsets {
            activate_days_before: self.activate_days_before,
            deactivate_days_after: self.deactivate_days_after,
        };

        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => {
                if start > end {
                    return Err(RuleValidationError::StartAfterEnd { start, end });
                }
                return Ok(SeasonalRule::DateRange {
                    start,
                    end,
                    offsets,
                });
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(RuleValidationError::IncompleteDateRange);
            }
            (None, None) => {}
        }

        match (self.lunar_month.as_ref(), self.solar_month) {
            (Some(_), Some(_)) => Err(RuleValidationError::LunarSolarConflict),
            (Some(field), None) => {
                let month = field.resolve()?;
                check_month(month)?;
                let year = self.lunar_year.unwrap_or(LunarYearSpec::Auto);
                if let LunarYearSpec::Fixed(fixed) = year {
                    if !(MIN_LUNAR_YEAR..=MAX_LUNAR_YEAR).contains(&fixed) {
                        return Err(RuleValidationError::LunarYearOutOfRange(fixed));
                    }
                }
                Ok(SeasonalRule::LunarMonth {
                    month,
                    year,
                    offsets,
                })
            }
            (None, Some(month)) => {
                if self.lunar_year.is_some() {
                    return Err(RuleValidationError::LunarYearWithoutMonth);
                }
                check_month(month)?;
                Ok(SeasonalRule::SolarMonth { month, offsets })
            }
            (None, None) => {
                if self.lunar_year.is_some() {
                    return Err(RuleValidationError::LunarYearWithoutMonth);
                }
                Ok(SeasonalRule::None)
            }
        }
    }
}

fn check_month(month: u8) -> Result<(), RuleValidationError> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(RuleValidationError::MonthOutOfRange(month))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_payload_translates_to_no_rule() {
        assert_eq!(RulePayload::default().into_rule().unwrap(), SeasonalRule::None);
    }

    #[test]
    fn date_range_takes_precedence_over_month_fields() {
        let payload = RulePayload {
            start_date: Some(date(2026, 3, 1)),
            end_date: Some(date(2026, 3, 31)),
            lunar_month: Some(LunarMonthField::Number(9)),
            ..RulePayload::default()
        };

        match payload.into_rule().unwrap() {
            SeasonalRule::DateRange { start, end, .. } => {
                assert_eq!(start, date(2026, 3, 1));
                assert_eq!(end, date(2026, 3, 31));
            }
            other => panic!("expected date range rule, got {other:?}"),
        }
    }

    #[test]
    fn inverted_or_incomplete_range_is_rejected() {
        let inverted = RulePayload {
            start_date: Some(date(2026, 4, 1)),
            end_date: Some(date(2026, 3, 1)),
            ..RulePayload::default()
        };
        assert!(matches!(
            inverted.into_rule().unwrap_err(),
            RuleValidationError::StartAfterEnd { .. }
        ));

        let incomplete = RulePayload {
            start_date: Some(date(2026, 4, 1)),
            ..RulePayload::default()
        };
        assert_eq!(
            incomplete.into_rule().unwrap_err(),
            RuleValidationError::IncompleteDateRange
        );
    }

    #[test]
    fn lunar_and_solar_months_are_mutually_exclusive() {
        let payload = RulePayload {
            lunar_month: Some(LunarMonthField::Number(9)),
            solar_month: Some(3),
            ..RulePayload::default()
        };
        assert_eq!(
            payload.into_rule().unwrap_err(),
            RuleValidationError::LunarSolarConflict
        );
    }

    #[test]
    fn lunar_month_names_resolve_to_indices() {
        let payload = RulePayload {
            lunar_month: Some(LunarMonthField::Name("Ramadan".to_string())),
            activate_days_before: 3,
            ..RulePayload::default()
        };

        match payload.into_rule().unwrap() {
            SeasonalRule::LunarMonth {
                month,
                year,
                offsets,
            } => {
                assert_eq!(month, 9);
                assert_eq!(year, LunarYearSpec::Auto);
                assert_eq!(offsets.activate_days_before, 3);
            }
            other => panic!("expected lunar rule, got {other:?}"),
        }

        let spaced = RulePayload {
            lunar_month: Some(LunarMonthField::Name("Rabi' al-Awwal".to_string())),
            ..RulePayload::default()
        };
        assert!(matches!(
            spaced.into_rule().unwrap(),
            SeasonalRule::LunarMonth { month: 3, .. }
        ));

        let unknown = RulePayload {
            lunar_month: Some(LunarMonthField::Name("brumaire".to_string())),
            ..RulePayload::default()
        };
        assert!(matches!(
            unknown.into_rule().unwrap_err(),
            RuleValidationError::UnknownMonthName(_)
        ));
    }

    #[test]
    fn month_indices_are_range_checked() {
        let lunar = RulePayload {
            lunar_month: Some(LunarMonthField::Number(13)),
            ..RulePayload::default()
        };
        assert_eq!(
            lunar.into_rule().unwrap_err(),
            RuleValidationError::MonthOutOfRange(13)
        );

        let solar = RulePayload {
            solar_month: Some(0),
            ..RulePayload::default()
        };
        assert_eq!(
            solar.into_rule().unwrap_err(),
            RuleValidationError::MonthOutOfRange(0)
        );
    }

    #[test]
    fn lunar_year_requires_lunar_month() {
        let payload = RulePayload {
            lunar_year: Some(LunarYearSpec::Fixed(1447)),
            solar_month: Some(3),
            ..RulePayload::default()
        };
        assert_eq!(
            payload.into_rule().unwrap_err(),
            RuleValidationError::LunarYearWithoutMonth
        );
    }

    #[test]
    fn fixed_lunar_year_is_range_checked() {
        let payload = RulePayload {
            lunar_month: Some(LunarMonthField::Number(9)),
            lunar_year: Some(LunarYearSpec::Fixed(99)),
            ..RulePayload::default()
        };
        assert_eq!(
            payload.into_rule().unwrap_err(),
            RuleValidationError::LunarYearOutOfRange(99)
        );
    }

    #[test]
    fn payload_json_round_trip_keeps_loose_fields() {
        let json = r#"{
            "lunar_month": "ramadan",
            "lunar_year": "auto",
            "activate_days_before": 3,
            "deactivate_days_after": 1
        }"#;
        let payload: RulePayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.lunar_year, Some(LunarYearSpec::Auto));
        assert!(matches!(
            payload.into_rule().unwrap(),
            SeasonalRule::LunarMonth { month: 9, .. }
        ));

        let fixed: RulePayload =
            serde_json::from_str(r#"{"lunar_month": 9, "lunar_year": 1447}"#).unwrap();
        assert_eq!(fixed.lunar_year, Some(LunarYearSpec::Fixed(1447)));
    }

    #[test]
    fn negative_offsets_fail_payload_deserialization() {
        let result = serde_json::from_str::<RulePayload>(r#"{"activate_days_before": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn rule_snapshot_serializes_with_kind_tag() {
        let rule = SeasonalRule::LunarMonth {
            month: 9,
            year: LunarYearSpec::Auto,
            offsets: WindowOffsets::default(),
        };
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"kind\":\"lunar_month\""));
        assert!(json.contains("\"year\":\"auto\""));

        let back: SeasonalRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
