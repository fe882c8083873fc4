//! Category repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the persisted side of the activation pipeline: managed-category
//!   listing, idempotent status transitions, audit history.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - `apply_transition` appends exactly one transition record per real status
//!   flip and none otherwise.
//! - Concurrent transitions for one category serialize via the `revision`
//!   column; the losing writer no-ops or reports a conflict, never double
//!   writes.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::category::{
    Category, CategoryId, CategoryStatus, CategoryType, CategoryValidationError, TransitionRecord,
};
use crate::model::rule::{RulePayload, RuleValidationError, SeasonalRule};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

const CATEGORY_SELECT_SQL: &str = "SELECT
    uuid,
    slug,
    name,
    name_en,
    type,
    status,
    auto_activate,
    rule_json,
    last_evaluated_at,
    last_transition_at,
    next_check_at,
    revision
FROM categories";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for category persistence and transition operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(CategoryValidationError),
    Db(DbError),
    NotFound(CategoryId),
    /// Lost an optimistic write race that did not converge; callers treat
    /// this as a no-op, never as a user-visible failure.
    Conflict(CategoryId),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "category not found: {id}"),
            Self::Conflict(id) => write!(f, "concurrent transition lost for category {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted category data: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; run migrations first"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` is missing")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CategoryValidationError> for RepoError {
    fn from(value: CategoryValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RuleValidationError> for RepoError {
    fn from(value: RuleValidationError) -> Self {
        Self::Validation(CategoryValidationError::Rule(value))
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One auto-managed category with its rule translated at the load boundary.
///
/// The translation result is kept per row so one malformed persisted rule
/// cannot poison a whole scheduler batch.
#[derive(Debug)]
pub struct ManagedCategory {
    pub category: Category,
    pub rule: Result<SeasonalRule, RuleValidationError>,
}

/// Input for one idempotent transition write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub category_id: CategoryId,
    pub desired_active: bool,
    /// Evaluation timestamp recorded in audit rows, epoch milliseconds.
    pub evaluated_at_ms: i64,
    /// Scheduler hint persisted alongside the evaluation.
    pub next_check_at: NaiveDate,
    /// Canonical JSON of the rule that produced this decision.
    pub rule_snapshot: String,
}

/// Result of one transition write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// Whether the persisted status actually flipped.
    pub changed: bool,
    /// Status persisted after the call.
    pub status: CategoryStatus,
}

/// Store contract consumed by the scheduler and the admin seam.
pub trait CategoryRepository {
    fn create_category(&self, category: &Category) -> RepoResult<CategoryId>;
    fn update_rule(&self, id: CategoryId, payload: Option<&RulePayload>) -> RepoResult<()>;
    fn set_auto_activate(&self, id: CategoryId, enabled: bool) -> RepoResult<()>;
    fn get_category(&self, id: CategoryId) -> RepoResult<Option<Category>>;
    fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>>;
    /// Categories with `type = seasonal` and `auto_activate = 1`.
    fn list_managed(&self) -> RepoResult<Vec<ManagedCategory>>;
    fn apply_transition(&self, request: &TransitionRequest) -> RepoResult<TransitionOutcome>;
    /// Audit history for one category, newest first.
    fn list_transitions(&self, id: CategoryId, limit: u32) -> RepoResult<Vec<TransitionRecord>>;
}

/// SQLite-backed category repository.
pub struct SqliteCategoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCategoryRepository<'conn> {
    /// Wraps a connection after verifying schema version and required tables.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }

        for table in ["categories", "category_transitions"] {
            let exists: i64 = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
                );",
                [table],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(RepoError::MissingRequiredTable(table));
            }
        }

        Ok(Self { conn })
    }

    fn read_status_and_revision(
        &self,
        id: CategoryId,
    ) -> RepoResult<Option<(CategoryStatus, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, revision FROM categories WHERE uuid = ?1;")?;
        let mut rows = stmt.query([id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let status_text: String = row.get(0)?;
        let status = parse_status(&status_text).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid status `{status_text}` in categories.status"))
        })?;
        Ok(Some((status, row.get(1)?)))
    }
}

impl CategoryRepository for SqliteCategoryRepository<'_> {
    fn create_category(&self, category: &Category) -> RepoResult<CategoryId> {
        category.validate()?;

        let rule_json = category
            .rule
            .as_ref()
            .map(|payload| {
                serde_json::to_string(payload)
                    .map_err(|err| RepoError::InvalidData(format!("rule payload: {err}")))
            })
            .transpose()?;

        self.conn.execute(
            "INSERT INTO categories (
                uuid,
                slug,
                name,
                name_en,
                type,
                status,
                auto_activate,
                rule_json,
                last_evaluated_at,
                last_transition_at,
                next_check_at,
                revision
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                category.uuid.to_string(),
                category.slug.as_str(),
                category.name.as_str(),
                category.name_en.as_deref(),
                category_type_to_db(category.kind),
                status_to_db(category.status),
                bool_to_int(category.auto_activate),
                rule_json.as_deref(),
                category.last_evaluated_at,
                category.last_transition_at,
                category.next_check_at.map(|date| date.to_string()),
                category.revision,
            ],
        )?;

        Ok(category.uuid)
    }

    fn update_rule(&self, id: CategoryId, payload: Option<&RulePayload>) -> RepoResult<()> {
        let rule_json = payload
            .map(|payload| {
                payload.into_rule()?;
                serde_json::to_string(payload)
                    .map_err(|err| RepoError::InvalidData(format!("rule payload: {err}")))
            })
            .transpose()?;

        // The old rule's boundary hint must not outlive the rule; the next
        // non-forced tick re-evaluates from scratch.
        let changed = self.conn.execute(
            "UPDATE categories
             SET
                rule_json = ?1,
                next_check_at = NULL,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![rule_json.as_deref(), id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn set_auto_activate(&self, id: CategoryId, enabled: bool) -> RepoResult<()> {
        // Re-enabling drops any hint persisted before management was turned
        // off, so the first tick afterwards always re-evaluates.
        let changed = if enabled {
            self.conn.execute(
                "UPDATE categories
                 SET
                    auto_activate = 1,
                    next_check_at = NULL,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                params![id.to_string()],
            )?
        } else {
            self.conn.execute(
                "UPDATE categories
                 SET
                    auto_activate = 0,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                params![id.to_string()],
            )?
        };

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn get_category(&self, id: CategoryId) -> RepoResult<Option<Category>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CATEGORY_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let (category, rule) = parse_category_row(row)?;
        // Single-row reads reject invalid persisted rules instead of masking
        // them; batch loads isolate per row via `list_managed`.
        rule.map_err(|err| RepoError::InvalidData(err.to_string()))?;
        Ok(Some(category))
    }

    fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CATEGORY_SELECT_SQL} WHERE slug = ?1;"))?;
        let mut rows = stmt.query([slug])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let (category, rule) = parse_category_row(row)?;
        rule.map_err(|err| RepoError::InvalidData(err.to_string()))?;
        Ok(Some(category))
    }

    fn list_managed(&self) -> RepoResult<Vec<ManagedCategory>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CATEGORY_SELECT_SQL}
             WHERE type = 'seasonal' AND auto_activate = 1
             ORDER BY slug ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut managed = Vec::new();

        while let Some(row) = rows.next()? {
            let (category, rule) = parse_category_row(row)?;
            managed.push(ManagedCategory { category, rule });
        }

        Ok(managed)
    }

    fn apply_transition(&self, request: &TransitionRequest) -> RepoResult<TransitionOutcome> {
        let desired = CategoryStatus::from_active(request.desired_active);
        let next_check_text = request.next_check_at.to_string();

        // One bounded retry: a lost CAS race re-reads and either converges to
        // the idempotent no-op path or reports a conflict.
        for _ in 0..2 {
            let Some((status, revision)) = self.read_status_and_revision(request.category_id)?
            else {
                return Err(RepoError::NotFound(request.category_id));
            };

            if status == desired {
                self.conn.execute(
                    "UPDATE categories
                     SET
                        last_evaluated_at = ?1,
                        next_check_at = ?2,
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE uuid = ?3;",
                    params![
                        request.evaluated_at_ms,
                        next_check_text.as_str(),
                        request.category_id.to_string(),
                    ],
                )?;
                return Ok(TransitionOutcome {
                    changed: false,
                    status,
                });
            }

            let tx = self.conn.unchecked_transaction()?;
            let updated = tx.execute(
                "UPDATE categories
                 SET
                    status = ?1,
                    last_evaluated_at = ?2,
                    last_transition_at = ?2,
                    next_check_at = ?3,
                    revision = revision + 1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?4 AND revision = ?5;",
                params![
                    status_to_db(desired),
                    request.evaluated_at_ms,
                    next_check_text.as_str(),
                    request.category_id.to_string(),
                    revision,
                ],
            )?;

            if updated == 1 {
                tx.execute(
                    "INSERT INTO category_transitions (
                        category_uuid,
                        from_status,
                        to_status,
                        evaluated_at,
                        rule_snapshot
                    ) VALUES (?1, ?2, ?3, ?4, ?5);",
                    params![
                        request.category_id.to_string(),
                        status_to_db(status),
                        status_to_db(desired),
                        request.evaluated_at_ms,
                        request.rule_snapshot.as_str(),
                    ],
                )?;
                tx.commit()?;
                return Ok(TransitionOutcome {
                    changed: true,
                    status: desired,
                });
            }

            drop(tx);
        }

        Err(RepoError::Conflict(request.category_id))
    }

    fn list_transitions(&self, id: CategoryId, limit: u32) -> RepoResult<Vec<TransitionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, category_uuid, from_status, to_status, evaluated_at, rule_snapshot
             FROM category_transitions
             WHERE category_uuid = ?1
             ORDER BY id DESC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![id.to_string(), i64::from(limit)])?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            records.push(parse_transition_row(row)?);
        }

        Ok(records)
    }
}

fn parse_category_row(
    row: &Row<'_>,
) -> RepoResult<(Category, Result<SeasonalRule, RuleValidationError>)> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in categories.uuid"))
    })?;

    let type_text: String = row.get("type")?;
    let kind = parse_category_type(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid category type `{type_text}` in categories.type"))
    })?;

    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in categories.status"))
    })?;

    let auto_activate = match row.get::<_, i64>("auto_activate")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid auto_activate value `{other}` in categories.auto_activate"
            )));
        }
    };

    let next_check_at = match row.get::<_, Option<String>>("next_check_at")? {
        Some(text) => Some(NaiveDate::from_str(&text).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid date `{text}` in categories.next_check_at"
            ))
        })?),
        None => None,
    };

    let rule_json: Option<String> = row.get("rule_json")?;
    let (payload, rule) = match rule_json.as_deref() {
        None => (None, Ok(SeasonalRule::None)),
        Some(text) => match serde_json::from_str::<RulePayload>(text) {
            Ok(payload) => {
                let rule = payload.into_rule();
                (Some(payload), rule)
            }
            Err(err) => (
                None,
                Err(RuleValidationError::MalformedPayload(err.to_string())),
            ),
        },
    };

    let category = Category {
        uuid,
        slug: row.get("slug")?,
        name: row.get("name")?,
        name_en: row.get("name_en")?,
        kind,
        status,
        auto_activate,
        rule: payload,
        last_evaluated_at: row.get("last_evaluated_at")?,
        last_transition_at: row.get("last_transition_at")?,
        next_check_at,
        revision: row.get("revision")?,
    };

    Ok((category, rule))
}

fn parse_transition_row(row: &Row<'_>) -> RepoResult<TransitionRecord> {
    let uuid_text: String = row.get("category_uuid")?;
    let category_id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in category_transitions.category_uuid"
        ))
    })?;

    let from_text: String = row.get("from_status")?;
    let to_text: String = row.get("to_status")?;
    let from_status = parse_status(&from_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{from_text}` in transition log"))
    })?;
    let to_status = parse_status(&to_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{to_text}` in transition log"))
    })?;

    Ok(TransitionRecord {
        id: row.get("id")?,
        category_id,
        from_status,
        to_status,
        evaluated_at: row.get("evaluated_at")?,
        rule_snapshot: row.get("rule_snapshot")?,
    })
}

fn category_type_to_db(kind: CategoryType) -> &'static str {
    match kind {
        CategoryType::Smart => "smart",
        CategoryType::Dynamic => "dynamic",
        CategoryType::Seasonal => "seasonal",
    }
}

fn parse_category_type(value: &str) -> Option<CategoryType> {
    match value {
        "smart" => Some(CategoryType::Smart),
        "dynamic" => Some(CategoryType::Dynamic),
        "seasonal" => Some(CategoryType::Seasonal),
        _ => None,
    }
}

fn status_to_db(status: CategoryStatus) -> &'static str {
    match status {
        CategoryStatus::Active => "active",
        CategoryStatus::Inactive => "inactive",
    }
}

fn parse_status(value: &str) -> Option<CategoryStatus> {
    match value {
        "active" => Some(CategoryStatus::Active),
        "inactive" => Some(CategoryStatus::Inactive),
        _ => None,
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
