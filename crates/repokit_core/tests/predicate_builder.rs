mod common;

use common::{ids, open_test_session, seed_customers, Customer};
use repokit_core::{ListQuery, Predicate, PredicateBuilder, Repository, SqliteRepository};

fn list(session: &repokit_core::Session, filter: Predicate<Customer>) -> Vec<i64> {
    let repo = SqliteRepository::<Customer>::try_new(session).unwrap();
    ids(&repo.get_list(&ListQuery::new().with_filter(filter)).unwrap())
}

#[test]
fn skipped_branches_leave_the_always_true_base() {
    let session = open_test_session();
    seed_customers(&session);

    let filter = PredicateBuilder::<Customer>::new()
        .if_and(false, Predicate::eq("id", 1))
        .if_or(false, Predicate::eq("id", 2))
        .build();
    assert!(matches!(filter, Predicate::True));
    assert_eq!(list(&session, filter), vec![1, 2, 3, 4, 5]);
}

#[test]
fn taken_and_branch_behaves_as_the_branch() {
    let session = open_test_session();
    seed_customers(&session);

    let branch = Predicate::<Customer>::ge("credit", 300);
    let built = PredicateBuilder::new().if_and(true, branch.clone()).build();
    assert_eq!(list(&session, built), list(&session, branch));
}

#[test]
fn or_onto_the_true_base_matches_everything() {
    let session = open_test_session();
    seed_customers(&session);

    let built = PredicateBuilder::<Customer>::new()
        .if_or(true, Predicate::eq("id", 3))
        .build();
    assert_eq!(list(&session, built), vec![1, 2, 3, 4, 5]);
}

#[test]
fn combination_is_left_to_right() {
    let session = open_test_session();
    seed_customers(&session);

    // (credit >= 300 OR id = 1) AND name != "Dee"
    let built = PredicateBuilder::with_base(Predicate::<Customer>::ge("credit", 300))
        .if_or(true, Predicate::eq("id", 1))
        .if_and(true, Predicate::ne("name", "Dee".to_string()))
        .build();
    assert_eq!(list(&session, built), vec![1, 2, 5]);
}

#[test]
fn if_else_always_combines_one_branch() {
    let session = open_test_session();
    seed_customers(&session);

    let vip_only = false;
    let built = PredicateBuilder::with_base(Predicate::<Customer>::le("credit", 400))
        .if_else_and(
            vip_only,
            Predicate::ge("credit", 400),
            Predicate::le("credit", 200),
        )
        .build();
    assert_eq!(list(&session, built), vec![1, 3]);

    let built = PredicateBuilder::with_base(Predicate::<Customer>::eq("id", 1))
        .if_else_or(true, Predicate::eq("id", 4), Predicate::eq("id", 5))
        .build();
    assert_eq!(list(&session, built), vec![1, 4]);
}

#[test]
fn build_snapshots_and_keeps_the_builder_usable() {
    let session = open_test_session();
    seed_customers(&session);

    let builder = PredicateBuilder::<Customer>::new().if_and(true, Predicate::ge("credit", 200));
    let early = builder.build();
    let again = builder.build();
    let narrowed = builder
        .if_and(true, Predicate::leaf(|customer: &Customer| customer.name.len() == 3))
        .build();

    assert_eq!(list(&session, early), vec![2, 3, 4, 5]);
    assert_eq!(list(&session, again), vec![2, 3, 4, 5]);
    assert_eq!(list(&session, narrowed), vec![2, 4, 5]);
}
