//! Seasonal activation scheduler.
//!
//! # Responsibility
//! - Run one evaluation pass (tick) over all auto-managed categories.
//! - Commit real status changes through the repository and collect them into
//!   one batch change event.
//!
//! # Invariants
//! - At most one tick executes at a time; a tick that starts while another is
//!   in flight is skipped, never queued.
//! - A failure on one category never aborts the rest of the batch; only a
//!   driver-level load failure aborts the tick.
//! - The next-check skip is an optimization: a forced tick re-evaluating
//!   every category must reach the same persisted state.

use crate::engine::evaluator::evaluate;
use crate::model::category::CategoryId;
use crate::repo::category_repo::{
    CategoryRepository, RepoError, RepoResult, TransitionRequest,
};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Input for one scheduler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRequest {
    /// Reference date for all rule evaluations in this tick.
    pub as_of: NaiveDate,
    /// Wall-clock timestamp recorded in audit rows, epoch milliseconds.
    pub evaluated_at_ms: i64,
    /// When true, the next-check skip is bypassed and every managed category
    /// is re-evaluated ("re-evaluate now").
    pub force: bool,
}

/// Summary of one completed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Categories that went through evaluate + apply.
    pub evaluated: u32,
    /// Categories skipped by the next-check optimization.
    pub skipped: u32,
    /// Categories skipped because of a malformed rule or evaluation failure.
    pub failed: u32,
    /// Categories whose persisted status actually flipped.
    pub changed: Vec<CategoryId>,
}

/// Outcome of a tick attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another tick was already in flight; this one was dropped.
    SkippedBusy,
}

/// Batch of categories whose status flipped during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    pub as_of: NaiveDate,
    pub changed: Vec<CategoryId>,
}

/// Downstream consumer of change batches (cache invalidation and the like).
pub trait ChangeListener: Send + Sync {
    fn categories_changed(&self, batch: &ChangeBatch);
}

/// Evaluation pipeline over all auto-managed categories.
pub struct SeasonScheduler<R: CategoryRepository> {
    repo: R,
    listeners: Vec<Arc<dyn ChangeListener>>,
    tick_in_flight: AtomicBool,
}

impl<R: CategoryRepository> SeasonScheduler<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            listeners: Vec::new(),
            tick_in_flight: AtomicBool::new(false),
        }
    }

    /// Registers a listener notified once per tick that produced changes.
    pub fn register_listener(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    /// Runs one evaluation pass.
    ///
    /// # Contract
    /// - Returns `SkippedBusy` without touching the store when a tick is
    ///   already running.
    /// - Per-category failures are logged and counted, not propagated.
    /// - A repository error while loading the batch aborts the tick; the next
    ///   tick retries from scratch.
    pub fn run_tick(&self, request: &TickRequest) -> RepoResult<TickOutcome> {
        if self
            .tick_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("event=tick module=scheduler status=busy as_of={}", request.as_of);
            return Ok(TickOutcome::SkippedBusy);
        }
        let _guard = TickGuard(&self.tick_in_flight);

        info!(
            "event=tick module=scheduler status=start as_of={} force={}",
            request.as_of, request.force
        );

        let managed = self.repo.list_managed()?;
        let mut report = TickReport::default();

        for entry in managed {
            let category = entry.category;

            let rule = match entry.rule {
                Ok(rule) => rule,
                Err(err) => {
                    warn!(
                        "event=tick_category module=scheduler status=error slug={} error_code=malformed_rule error={}",
                        category.slug, err
                    );
                    report.failed += 1;
                    continue;
                }
            };

            if !request.force {
                if let Some(next_check) = category.next_check_at {
                    if request.as_of < next_check {
                        report.skipped += 1;
                        continue;
                    }
                }
            }

            let evaluation = match evaluate(&rule, request.as_of) {
                Ok(evaluation) => evaluation,
                Err(err) => {
                    // Never guess on conversion failure; keep the previous
                    // status and move on.
                    warn!(
                        "event=tick_category module=scheduler status=error slug={} error_code=evaluate_failed error={}",
                        category.slug, err
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let snapshot = match serde_json::to_string(&rule) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(
                        "event=tick_category module=scheduler status=error slug={} error_code=snapshot_failed error={}",
                        category.slug, err
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let outcome = self.repo.apply_transition(&TransitionRequest {
                category_id: category.uuid,
                desired_active: evaluation.desired_active,
                evaluated_at_ms: request.evaluated_at_ms,
                next_check_at: evaluation.next_check_at,
                rule_snapshot: snapshot,
            });

            match outcome {
                Ok(outcome) => {
                    report.evaluated += 1;
                    if outcome.changed {
                        debug!(
                            "event=tick_category module=scheduler status=changed slug={} active={}",
                            category.slug, evaluation.desired_active
                        );
                        report.changed.push(category.uuid);
                    }
                }
                Err(RepoError::Conflict(id)) => {
                    // The racing writer already applied this state.
                    debug!(
                        "event=tick_category module=scheduler status=conflict category={id}"
                    );
                    report.evaluated += 1;
                }
                Err(err) => {
                    warn!(
                        "event=tick_category module=scheduler status=error slug={} error_code=apply_failed error={}",
                        category.slug, err
                    );
                    report.failed += 1;
                }
            }
        }

        if !report.changed.is_empty() {
            let batch = ChangeBatch {
                as_of: request.as_of,
                changed: report.changed.clone(),
            };
            for listener in &self.listeners {
                listener.categories_changed(&batch);
            }
        }

        info!(
            "event=tick module=scheduler status=ok as_of={} evaluated={} skipped={} failed={} changed={}",
            request.as_of,
            report.evaluated,
            report.skipped,
            report.failed,
            report.changed.len()
        );

        Ok(TickOutcome::Completed(report))
    }
}

/// Clears the in-flight flag even when a tick unwinds early.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
