//! Pure rule evaluation.
//!
//! # Responsibility
//! - Decide whether a seasonal rule should currently hold its category active.
//!
//! # Invariants
//! - Evaluation is pure: the reference date is always an explicit argument.
//! - Re-evaluating the same rule and date always yields the same result.

pub mod evaluator;

pub use evaluator::{evaluate, ActiveWindow, EvaluateError, Evaluation, FAR_FUTURE};
