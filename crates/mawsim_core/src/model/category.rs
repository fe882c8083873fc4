//! Category domain model and transition audit record.
//!
//! # Responsibility
//! - Define the canonical category record shared with the admin surface.
//! - Define the append-only transition record produced by the store.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another category.
//! - `status`, `last_evaluated_at`, `last_transition_at` and `next_check_at`
//!   are owned by this engine whenever `auto_activate` is true.
//! - `revision` only ever increases; it backs the optimistic write path.

use crate::model::rule::{RulePayload, RuleValidationError};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a category.
pub type CategoryId = Uuid;

static SLUG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("slug pattern is a valid regex")
});

/// Management flavor of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    /// Curated by operators; never auto-managed.
    Smart,
    /// Populated by queries; never auto-managed.
    Dynamic,
    /// Visibility follows a seasonal rule.
    Seasonal,
}

/// Visibility state of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Active,
    Inactive,
}

impl CategoryStatus {
    pub fn from_active(active: bool) -> Self {
        if active {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

/// Canonical category record.
///
/// Identity fields (`slug`, names, `kind`) are owned by the admin surface;
/// the engine owns the status/evaluation fields for auto-managed rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub uuid: CategoryId,
    /// URL-safe identifier, `^[a-z0-9]+(-[a-z0-9]+)*$`.
    pub slug: String,
    /// Primary display name.
    pub name: String,
    /// Optional secondary (latin) display name.
    pub name_en: Option<String>,
    pub kind: CategoryType,
    pub status: CategoryStatus,
    /// Whether the scheduler manages `status` for this category.
    pub auto_activate: bool,
    /// Seasonal rule configuration as written by the admin surface.
    pub rule: Option<RulePayload>,
    /// Last evaluation timestamp, epoch milliseconds.
    pub last_evaluated_at: Option<i64>,
    /// Last status flip timestamp, epoch milliseconds.
    pub last_transition_at: Option<i64>,
    /// Next date worth re-evaluating; a scheduling hint, never a correctness
    /// input.
    pub next_check_at: Option<NaiveDate>,
    /// Optimistic concurrency counter, bumped on every status flip.
    pub revision: i64,
}

/// Validation failures for category identity and rule configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryValidationError {
    InvalidSlug(String),
    EmptyName,
    Rule(RuleValidationError),
}

impl Display for CategoryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSlug(slug) => write!(
                f,
                "invalid slug `{slug}`; expected lowercase alphanumerics and hyphens"
            ),
            Self::EmptyName => write!(f, "category name cannot be empty"),
            Self::Rule(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CategoryValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Rule(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RuleValidationError> for CategoryValidationError {
    fn from(value: RuleValidationError) -> Self {
        Self::Rule(value)
    }
}

impl Category {
    /// Creates a new inactive category with a generated stable ID.
    pub fn new(slug: impl Into<String>, name: impl Into<String>, kind: CategoryType) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            slug: slug.into(),
            name: name.into(),
            name_en: None,
            kind,
            status: CategoryStatus::Inactive,
            auto_activate: false,
            rule: None,
            last_evaluated_at: None,
            last_transition_at: None,
            next_check_at: None,
            revision: 0,
        }
    }

    /// Validates identity fields and, when present, the rule payload.
    pub fn validate(&self) -> Result<(), CategoryValidationError> {
        if !SLUG_PATTERN.is_match(&self.slug) {
            return Err(CategoryValidationError::InvalidSlug(self.slug.clone()));
        }
        if self.name.trim().is_empty() {
            return Err(CategoryValidationError::EmptyName);
        }
        if let Some(payload) = &self.rule {
            payload.into_rule()?;
        }
        Ok(())
    }
}

/// One committed status flip. Append-only; created exclusively by
/// `apply_transition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    /// Monotonic row id within the transition log.
    pub id: i64,
    pub category_id: CategoryId,
    pub from_status: CategoryStatus,
    pub to_status: CategoryStatus,
    /// Evaluation timestamp, epoch milliseconds.
    pub evaluated_at: i64,
    /// Canonical JSON of the rule that produced this transition.
    pub rule_snapshot: String,
}
