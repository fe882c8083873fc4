//! Core engine for seasonal category activation.
//! This crate is the single source of truth for activation invariants.

pub mod calendar;
pub mod db;
pub mod engine;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use calendar::{
    lunar_month_window, to_lunar, CalendarError, LunarDate, MonthWindow,
};
pub use engine::{evaluate, ActiveWindow, EvaluateError, Evaluation, FAR_FUTURE};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::category::{
    Category, CategoryId, CategoryStatus, CategoryType, CategoryValidationError, TransitionRecord,
};
pub use model::rule::{
    LunarMonthField, LunarYearSpec, RulePayload, RuleValidationError, SeasonalRule, WindowOffsets,
};
pub use repo::category_repo::{
    CategoryRepository, ManagedCategory, RepoError, RepoResult, SqliteCategoryRepository,
    TransitionOutcome, TransitionRequest,
};
pub use service::scheduler::{
    ChangeBatch, ChangeListener, SeasonScheduler, TickOutcome, TickReport, TickRequest,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
