use chrono::NaiveDate;
use mawsim_core::db::migrations::latest_version;
use mawsim_core::db::open_db_in_memory;
use mawsim_core::{
    Category, CategoryRepository, CategoryStatus, CategoryType, LunarMonthField, RepoError,
    RulePayload, SqliteCategoryRepository, TransitionRequest,
};
use rusqlite::Connection;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ramadan_payload() -> RulePayload {
    RulePayload {
        lunar_month: Some(LunarMonthField::Name("ramadan".to_string())),
        activate_days_before: 3,
        deactivate_days_after: 1,
        ..RulePayload::default()
    }
}

fn seasonal_category(slug: &str) -> Category {
    let mut category = Category::new(slug, format!("Category {slug}"), CategoryType::Seasonal);
    category.auto_activate = true;
    category.rule = Some(ramadan_payload());
    category
}

fn transition(
    id: Uuid,
    desired_active: bool,
    evaluated_at_ms: i64,
) -> TransitionRequest {
    TransitionRequest {
        category_id: id,
        desired_active,
        evaluated_at_ms,
        next_check_at: date(2026, 3, 21),
        rule_snapshot: r#"{"kind":"lunar_month","month":9}"#.to_string(),
    }
}

#[test]
fn create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let mut category = seasonal_category("ramadan-offers");
    category.name_en = Some("Ramadan offers".to_string());
    let id = repo.create_category(&category).unwrap();

    let loaded = repo.get_category(id).unwrap().unwrap();
    assert_eq!(loaded.uuid, category.uuid);
    assert_eq!(loaded.slug, "ramadan-offers");
    assert_eq!(loaded.name_en.as_deref(), Some("Ramadan offers"));
    assert_eq!(loaded.kind, CategoryType::Seasonal);
    assert_eq!(loaded.status, CategoryStatus::Inactive);
    assert!(loaded.auto_activate);
    assert_eq!(loaded.rule, Some(ramadan_payload()));
    assert_eq!(loaded.revision, 0);
    assert!(loaded.last_evaluated_at.is_none());

    let by_slug = repo.get_category_by_slug("ramadan-offers").unwrap().unwrap();
    assert_eq!(by_slug.uuid, id);
    assert!(repo.get_category_by_slug("missing").unwrap().is_none());
}

#[test]
fn validation_failure_blocks_create() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let category = Category::new("Bad Slug", "name", CategoryType::Smart);
    let err = repo.create_category(&category).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn duplicate_slug_is_rejected_by_the_schema() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    repo.create_category(&seasonal_category("eid")).unwrap();
    let err = repo.create_category(&seasonal_category("eid")).unwrap_err();
    assert!(matches!(err, RepoError::Db(_)));
}

#[test]
fn update_rule_replaces_and_clears_the_payload() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let id = repo.create_category(&seasonal_category("hajj")).unwrap();

    let solar = RulePayload {
        solar_month: Some(6),
        ..RulePayload::default()
    };
    repo.update_rule(id, Some(&solar)).unwrap();
    let loaded = repo.get_category(id).unwrap().unwrap();
    assert_eq!(loaded.rule, Some(solar));

    repo.update_rule(id, None).unwrap();
    let cleared = repo.get_category(id).unwrap().unwrap();
    assert!(cleared.rule.is_none());
}

#[test]
fn update_rule_validates_before_writing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let id = repo.create_category(&seasonal_category("hajj")).unwrap();

    let invalid = RulePayload {
        lunar_month: Some(LunarMonthField::Number(12)),
        solar_month: Some(6),
        ..RulePayload::default()
    };
    let err = repo.update_rule(id, Some(&invalid)).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));

    // The stored payload is untouched.
    let loaded = repo.get_category(id).unwrap().unwrap();
    assert_eq!(loaded.rule, Some(ramadan_payload()));
}

#[test]
fn rule_and_management_changes_clear_the_next_check_hint() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let id = repo.create_category(&seasonal_category("ramadan")).unwrap();
    repo.apply_transition(&transition(id, true, 1_000)).unwrap();
    assert_eq!(
        repo.get_category(id).unwrap().unwrap().next_check_at,
        Some(date(2026, 3, 21))
    );

    let solar = RulePayload {
        solar_month: Some(6),
        ..RulePayload::default()
    };
    repo.update_rule(id, Some(&solar)).unwrap();
    assert!(repo.get_category(id).unwrap().unwrap().next_check_at.is_none());

    // Disabling keeps the hint; re-enabling drops it.
    repo.apply_transition(&transition(id, true, 2_000)).unwrap();
    repo.set_auto_activate(id, false).unwrap();
    assert_eq!(
        repo.get_category(id).unwrap().unwrap().next_check_at,
        Some(date(2026, 3, 21))
    );

    repo.set_auto_activate(id, true).unwrap();
    assert!(repo.get_category(id).unwrap().unwrap().next_check_at.is_none());
}

#[test]
fn update_rule_on_missing_category_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let err = repo.update_rule(Uuid::new_v4(), None).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[test]
fn list_managed_filters_on_type_and_auto_activate() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let managed = seasonal_category("managed");
    repo.create_category(&managed).unwrap();

    let mut manual = seasonal_category("manual");
    manual.auto_activate = false;
    repo.create_category(&manual).unwrap();

    let smart = Category::new("curated", "Curated", CategoryType::Smart);
    repo.create_category(&smart).unwrap();

    let rows = repo.list_managed().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].category.uuid, managed.uuid);
    assert!(rows[0].rule.is_ok());
}

#[test]
fn list_managed_isolates_malformed_rules_per_row() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let healthy = seasonal_category("healthy");
    let broken = seasonal_category("broken");
    repo.create_category(&healthy).unwrap();
    repo.create_category(&broken).unwrap();

    conn.execute(
        "UPDATE categories SET rule_json = 'not json' WHERE slug = 'broken';",
        [],
    )
    .unwrap();

    let rows = repo.list_managed().unwrap();
    assert_eq!(rows.len(), 2);
    let broken_row = rows
        .iter()
        .find(|row| row.category.slug == "broken")
        .unwrap();
    assert!(broken_row.rule.is_err());
    let healthy_row = rows
        .iter()
        .find(|row| row.category.slug == "healthy")
        .unwrap();
    assert!(healthy_row.rule.is_ok());

    // Single-row reads stay strict.
    let err = repo.get_category(broken.uuid).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn apply_transition_flips_status_and_appends_one_record() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let id = repo.create_category(&seasonal_category("ramadan")).unwrap();

    let outcome = repo.apply_transition(&transition(id, true, 1_000)).unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.status, CategoryStatus::Active);

    let loaded = repo.get_category(id).unwrap().unwrap();
    assert_eq!(loaded.status, CategoryStatus::Active);
    assert_eq!(loaded.last_evaluated_at, Some(1_000));
    assert_eq!(loaded.last_transition_at, Some(1_000));
    assert_eq!(loaded.next_check_at, Some(date(2026, 3, 21)));
    assert_eq!(loaded.revision, 1);

    let records = repo.list_transitions(id, 10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].from_status, CategoryStatus::Inactive);
    assert_eq!(records[0].to_status, CategoryStatus::Active);
    assert_eq!(records[0].evaluated_at, 1_000);
}

#[test]
fn apply_transition_is_idempotent_for_equal_status() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let id = repo.create_category(&seasonal_category("ramadan")).unwrap();

    repo.apply_transition(&transition(id, true, 1_000)).unwrap();
    let repeat = repo.apply_transition(&transition(id, true, 2_000)).unwrap();
    assert!(!repeat.changed);
    assert_eq!(repeat.status, CategoryStatus::Active);

    // Only the evaluation timestamp moved; no second audit record, no
    // revision bump.
    let loaded = repo.get_category(id).unwrap().unwrap();
    assert_eq!(loaded.last_evaluated_at, Some(2_000));
    assert_eq!(loaded.last_transition_at, Some(1_000));
    assert_eq!(loaded.revision, 1);
    assert_eq!(repo.list_transitions(id, 10).unwrap().len(), 1);
}

#[test]
fn transitions_accumulate_newest_first() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let id = repo.create_category(&seasonal_category("ramadan")).unwrap();

    repo.apply_transition(&transition(id, true, 1_000)).unwrap();
    repo.apply_transition(&transition(id, false, 2_000)).unwrap();
    repo.apply_transition(&transition(id, true, 3_000)).unwrap();

    let records = repo.list_transitions(id, 10).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].evaluated_at, 3_000);
    assert_eq!(records[1].evaluated_at, 2_000);
    assert_eq!(records[2].evaluated_at, 1_000);

    let limited = repo.list_transitions(id, 2).unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].evaluated_at, 3_000);

    let loaded = repo.get_category(id).unwrap().unwrap();
    assert_eq!(loaded.revision, 3);
}

#[test]
fn apply_transition_on_missing_category_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let err = repo
        .apply_transition(&transition(Uuid::new_v4(), true, 1_000))
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[test]
fn set_auto_activate_toggles_management() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCategoryRepository::try_new(&conn).unwrap();

    let id = repo.create_category(&seasonal_category("ramadan")).unwrap();
    assert_eq!(repo.list_managed().unwrap().len(), 1);

    repo.set_auto_activate(id, false).unwrap();
    assert!(repo.list_managed().unwrap().is_empty());

    let err = repo.set_auto_activate(Uuid::new_v4(), true).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteCategoryRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert!(expected_version > 0),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_required_tables() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteCategoryRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredTable("categories"))
    ));
}
