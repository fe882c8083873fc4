//! Orchestration services.
//!
//! # Responsibility
//! - Drive evaluation over all auto-managed categories and commit results.
//! - Keep callers decoupled from repository and evaluator details.

pub mod scheduler;
