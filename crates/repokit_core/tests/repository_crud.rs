mod common;

use common::{open_test_session, seed_customers, Customer, Order, Tag, MIGRATIONS};
use repokit_core::{
    now_epoch_ms, open_session_in_memory, DbError, DeleteMode, EntitySchema, ListQuery, Predicate,
    RepoError, Repository, SchemaError, SqliteRepository,
};
use rusqlite::types::Value;

#[test]
fn add_and_get_by_id_round_trip() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();

    let customer = Customer::new(1, "Ada", 120).with_email("ada@example.com");
    let added = repo.add(customer.clone(), true).unwrap();
    assert_eq!(added, customer);

    let loaded = repo.get_by_id(&1, None, false).unwrap().unwrap();
    assert_eq!(loaded, customer);
    assert!(repo.get_by_id(&2, None, false).unwrap().is_none());
}

#[test]
fn string_keyed_entities_round_trip() {
    let session = open_test_session();
    let repo = SqliteRepository::<Tag>::try_new(&session).unwrap();

    let tag = repo.add(Tag::new("urgent"), true).unwrap();
    assert_eq!(tag.base.id.len(), 36);

    let loaded = repo.get_by_id(&tag.base.id, None, false).unwrap().unwrap();
    assert_eq!(loaded.label, "urgent");
    assert_eq!(repo.table_name(), "tags");
}

#[test]
fn staged_writes_are_invisible_until_save() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();

    repo.add(Customer::new(1, "Ada", 100), false).unwrap();
    repo.add(Customer::new(2, "Bea", 200), false).unwrap();
    assert_eq!(session.pending_count(), 2);
    assert!(repo.get_by_id(&1, None, false).unwrap().is_none());

    assert_eq!(repo.save().unwrap(), 2);
    assert_eq!(session.pending_count(), 0);
    assert!(repo.get_by_id(&1, None, false).unwrap().is_some());
    assert_eq!(repo.save().unwrap(), 0);
}

#[test]
fn save_flushes_commands_staged_by_every_repository_on_the_session() {
    let session = open_test_session();
    let customers = SqliteRepository::<Customer>::try_new(&session).unwrap();
    let orders = SqliteRepository::<Order>::try_new(&session).unwrap();

    customers.add(Customer::new(1, "Ada", 100), false).unwrap();
    orders.add(Order::new(10, 1, 30), false).unwrap();

    assert_eq!(orders.save().unwrap(), 2);
    assert!(customers.exists(None).unwrap());
    assert!(orders.get_by_id(&10, None, false).unwrap().is_some());
}

#[test]
fn update_refreshes_updated_at_without_moving_it_backwards() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();

    let mut customer = Customer::new(1, "Ada", 100);
    let future = now_epoch_ms() + 60_000;
    customer.base.updated_at = future;
    repo.add(customer, true).unwrap();

    let mut loaded = repo.get_by_id(&1, None, false).unwrap().unwrap();
    loaded.credit = 150;
    let updated = repo.update(loaded, true).unwrap();
    assert!(updated.base.updated_at >= future);
    assert!(updated.base.updated_at >= updated.base.created_at);

    let stored = repo.get_by_id(&1, None, false).unwrap().unwrap();
    assert_eq!(stored.credit, 150);
    assert_eq!(stored.base.updated_at, updated.base.updated_at);
}

#[test]
fn add_or_update_inserts_when_absent_and_updates_when_present() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();

    repo.add_or_update(Customer::new(1, "Ada", 100), true).unwrap();
    assert_eq!(repo.get_list(&ListQuery::new()).unwrap().len(), 1);

    let mut changed = Customer::new(1, "Ada Lovelace", 100);
    changed.base.created_at = repo.get_by_id(&1, None, false).unwrap().unwrap().base.created_at;
    repo.add_or_update(changed, true).unwrap();

    let all = repo.get_list(&ListQuery::new()).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Ada Lovelace");
}

#[test]
fn soft_delete_keeps_row_visible_with_tombstone() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    let mut customer = repo.get_by_id(&2, None, false).unwrap().unwrap();
    let before = customer.base.updated_at;
    repo.delete(&mut customer, DeleteMode::Soft, true).unwrap();
    assert!(customer.base.is_deleted());
    assert!(customer.base.updated_at >= before);

    let stored = repo.get_by_id(&2, None, false).unwrap().unwrap();
    assert_ne!(stored.base.is_deleted, 0);
    assert_eq!(repo.get_list(&ListQuery::new()).unwrap().len(), 5);
}

#[test]
fn hard_delete_removes_row() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    assert!(repo.delete_by_id(&3, DeleteMode::Hard, true).unwrap());
    assert!(repo.get_by_id(&3, None, false).unwrap().is_none());
    assert_eq!(repo.get_list(&ListQuery::new()).unwrap().len(), 4);
}

#[test]
fn delete_by_id_reports_missing_rows_without_staging() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();

    assert!(!repo.delete_by_id(&99, DeleteMode::Soft, false).unwrap());
    assert_eq!(session.pending_count(), 0);
}

#[test]
fn delete_where_applies_mode_to_every_match() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    let rich = Predicate::ge("credit", 300);
    assert_eq!(repo.delete_where(Some(&rich), DeleteMode::Soft, true).unwrap(), 3);
    let tombstoned = repo
        .get_list(&ListQuery::new().with_filter(Predicate::eq("is_deleted", 1)))
        .unwrap();
    assert_eq!(common::ids(&tombstoned), vec![2, 4, 5]);

    let poor = Predicate::lt("credit", 150);
    assert_eq!(repo.delete_where(Some(&poor), DeleteMode::Hard, true).unwrap(), 1);
    assert_eq!(repo.get_list(&ListQuery::new()).unwrap().len(), 4);
}

#[test]
fn bulk_operations_reject_missing_arguments() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    let err = repo.delete_where(None, DeleteMode::Hard, true).unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));

    let err = repo
        .update_where(None, Some(|customer: &mut Customer| customer.credit = 0), true)
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));

    let filter = Predicate::eq("id", 1);
    let err = repo
        .update_where(Some(&filter), None::<fn(&mut Customer)>, true)
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));

    assert_eq!(session.pending_count(), 0);
    assert_eq!(repo.get_list(&ListQuery::new()).unwrap().len(), 5);
}

#[test]
fn update_where_mutates_only_matching_rows() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    let filter = Predicate::le("credit", 200);
    let updated = repo
        .update_where(Some(&filter), Some(|customer: &mut Customer| customer.credit += 1), true)
        .unwrap();
    assert_eq!(updated, 2);

    let credits: Vec<i64> = repo
        .get_list(&ListQuery::new())
        .unwrap()
        .iter()
        .map(|customer| customer.credit)
        .collect();
    assert_eq!(credits, vec![101, 300, 201, 500, 400]);
}

#[test]
fn update_range_skips_absent_entries() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    let mut first = repo.get_by_id(&1, None, false).unwrap().unwrap();
    first.name = "Ada L".to_string();
    let mut third = repo.get_by_id(&3, None, false).unwrap().unwrap();
    third.name = "Cy T".to_string();

    let staged = repo
        .update_range(vec![Some(first), None, Some(third)], true)
        .unwrap();
    assert_eq!(staged, 2);

    let names: Vec<String> = repo
        .get_list(&ListQuery::new())
        .unwrap()
        .into_iter()
        .map(|customer| customer.name)
        .collect();
    assert_eq!(names, vec!["Ada L", "Bea", "Cy T", "Dee", "Eli"]);
}

#[test]
fn tracked_update_writes_only_dirty_columns() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    let mut tracked = repo.get_by_id(&1, None, true).unwrap().unwrap();
    assert!(session.is_tracked::<Customer>(&1));
    session
        .execute_sql(
            "UPDATE customers SET credit = ?1 WHERE id = ?2",
            &[Value::Integer(999), Value::Integer(1)],
        )
        .unwrap();

    tracked.name = "Ada L".to_string();
    repo.update(tracked, true).unwrap();

    let stored = repo.get_by_id(&1, None, false).unwrap().unwrap();
    assert_eq!(stored.name, "Ada L");
    assert_eq!(stored.credit, 999);
}

#[test]
fn staged_tracked_updates_diff_against_the_previous_staged_update() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    let mut tracked = repo.get_by_id(&2, None, true).unwrap().unwrap();
    tracked.name = "Bee".to_string();
    let mut tracked = repo.update(tracked, false).unwrap();
    tracked.name = "Bea".to_string();
    repo.update(tracked, false).unwrap();
    assert_eq!(session.pending_count(), 2);
    repo.save().unwrap();

    let stored = repo.get_by_id(&2, None, false).unwrap().unwrap();
    assert_eq!(stored.name, "Bea");
    assert!(session.is_tracked::<Customer>(&2));
}

#[test]
fn untracked_update_writes_every_column() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    let mut untracked = repo.get_by_id(&2, None, false).unwrap().unwrap();
    assert!(!session.is_tracked::<Customer>(&2));
    session
        .execute_sql("UPDATE customers SET credit = 999 WHERE id = 2", &[])
        .unwrap();

    untracked.name = "Bea B".to_string();
    repo.update(untracked, true).unwrap();

    let stored = repo.get_by_id(&2, None, false).unwrap().unwrap();
    assert_eq!(stored.name, "Bea B");
    assert_eq!(stored.credit, 300);
}

#[test]
fn hard_delete_drops_tracked_snapshot() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();
    seed_customers(&session);

    let mut tracked = repo.get_by_id(&4, None, true).unwrap().unwrap();
    assert_eq!(session.tracked_count(), 1);
    repo.delete(&mut tracked, DeleteMode::Hard, true).unwrap();
    assert_eq!(session.tracked_count(), 0);
}

#[test]
fn update_of_missing_row_fails_the_whole_batch() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();

    repo.add(Customer::new(6, "Fay", 10), false).unwrap();
    repo.update(Customer::new(42, "Ghost", 0), false).unwrap();

    let err = repo.save().unwrap_err();
    match err {
        RepoError::Db(DbError::RowNotAffected { table, key }) => {
            assert_eq!(table, "customers");
            assert_eq!(key, "42");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.pending_count(), 0);
    assert!(repo.get_by_id(&6, None, false).unwrap().is_none());
}

#[test]
fn scenario_with_live_and_soft_deleted_rows() {
    let session = open_test_session();
    let repo = SqliteRepository::<Customer>::try_new(&session).unwrap();

    let mut gone = Customer::new(2, "Bea", 0);
    gone.base.is_deleted = 1;
    repo.add_range(vec![Customer::new(1, "Ada", 0), gone], true).unwrap();

    let live = repo
        .get_list(&ListQuery::new().with_filter(Predicate::eq("is_deleted", 0)))
        .unwrap();
    assert_eq!(common::ids(&live), vec![1]);
    assert!(repo.exists(Some(&Predicate::ne("is_deleted", 0))).unwrap());
    assert_eq!(repo.get_list(&ListQuery::new()).unwrap().len(), 2);
    assert_eq!(repo.last_or_default(None).unwrap().unwrap().base.id, 2);
}

#[test]
fn repository_requires_a_registered_schema() {
    let session = open_session_in_memory(MIGRATIONS).unwrap();
    let err = SqliteRepository::<Customer>::try_new(&session).err().unwrap();
    assert!(matches!(err, RepoError::UnregisteredEntity(_)));
}

#[test]
fn registration_checks_tables_columns_and_duplicates() {
    let mut session = open_session_in_memory(MIGRATIONS).unwrap();

    let missing_table = EntitySchema::<Customer>::builder("clients").build().unwrap();
    assert!(matches!(
        session.register(missing_table).unwrap_err(),
        RepoError::MissingRequiredTable(table) if table == "clients"
    ));

    let missing_column = EntitySchema::<Customer>::builder("customers")
        .field("nickname", |customer| Value::Text(customer.name.clone()))
        .build()
        .unwrap();
    assert!(matches!(
        session.register(missing_column).unwrap_err(),
        RepoError::MissingRequiredColumn { column, .. } if column == "nickname"
    ));

    session.register(common::customer_schema()).unwrap();
    assert!(matches!(
        session.register(common::customer_schema()).unwrap_err(),
        RepoError::Schema(SchemaError::AlreadyRegistered(_))
    ));
    assert_eq!(session.table_name::<Customer>(), Some("customers"));
    assert_eq!(session.table_name::<Order>(), None);
}
