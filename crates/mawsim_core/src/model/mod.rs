//! Domain model for seasonal category activation.
//!
//! # Responsibility
//! - Define the canonical category record and its status lifecycle.
//! - Translate loosely-shaped rule payloads into the tagged rule variant.
//!
//! # Invariants
//! - Every category is identified by a stable `CategoryId`.
//! - Rule payloads are validated exactly once, at the write boundary; the
//!   evaluator only ever sees a well-formed `SeasonalRule`.

pub mod category;
pub mod rule;
