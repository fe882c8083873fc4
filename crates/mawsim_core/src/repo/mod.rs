//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the transition-store contract consumed by the scheduler.
//! - Isolate SQLite query details from evaluation and orchestration.
//!
//! # Invariants
//! - Write paths validate categories and rule payloads before SQL mutations.
//! - Status flips and their audit records commit atomically, per category.

pub mod category_repo;
