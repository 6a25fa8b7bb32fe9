mod common;

use chrono::TimeDelta;
use common::{email, epoch, user};
use sales_core::model::order::Direction;
use sales_core::model::user::{ORDER_BY_EMAIL, ORDER_BY_NAME};
use sales_core::{
    open_db_in_memory, OrderBy, Page, RepoError, RequestContext, Role, SqliteUserStore, User,
    UserFilter, UserStorer,
};
use uuid::Uuid;

fn seed(store: &SqliteUserStore<'_>, ctx: &RequestContext) -> Vec<User> {
    let mut users = Vec::new();
    for (offset, (name, address)) in [
        ("Ann Jones", "ann@example.com"),
        ("Bill Kennedy", "bill@example.com"),
        ("Cora Bills", "cora@example.com"),
    ]
    .into_iter()
    .enumerate()
    {
        let mut seeded = user(name, address);
        seeded.date_created = epoch() + TimeDelta::days(offset as i64);
        seeded.date_updated = seeded.date_created;
        store.create(ctx, &seeded).unwrap();
        users.push(seeded);
    }
    users
}

#[test]
fn create_then_read_round_trips_every_column() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();

    let mut stored = user("Bill Kennedy", "bill@example.com");
    stored.roles = vec![Role::Admin, Role::User];
    stored.department = Some("Sales".to_string());
    stored.enabled = false;
    store.create(&ctx, &stored).unwrap();

    assert_eq!(store.query_by_id(&ctx, stored.user_id).unwrap(), stored);
    assert_eq!(store.query_by_email(&ctx, &stored.email).unwrap(), stored);
}

#[test]
fn duplicate_primary_or_email_is_duplicate_key() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();
    let first = user("Bill Kennedy", "bill@example.com");
    store.create(&ctx, &first).unwrap();

    let same_email = user("Other Bill", "bill@example.com");
    assert!(store.create(&ctx, &same_email).unwrap_err().is_duplicate_key());

    let mut same_id = user("Other Bill", "other@example.com");
    same_id.user_id = first.user_id;
    assert!(store.create(&ctx, &same_id).unwrap_err().is_duplicate_key());
}

#[test]
fn update_and_delete_report_missing_rows() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();
    let ghost = user("Ghost", "ghost@example.com");

    assert!(store.update(&ctx, &ghost).unwrap_err().is_not_found());
    assert!(store.delete(&ctx, &ghost).unwrap_err().is_not_found());
    assert!(store
        .query_by_id(&ctx, ghost.user_id)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn delete_removes_row() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();
    let users = seed(&store, &ctx);

    store.delete(&ctx, &users[0]).unwrap();
    assert_eq!(store.count(&ctx, &UserFilter::default()).unwrap(), 2);
    assert!(store.delete(&ctx, &users[0]).unwrap_err().is_not_found());
}

#[test]
fn query_filters_orders_and_pages() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();
    let users = seed(&store, &ctx);

    let by_name_desc = OrderBy::new(ORDER_BY_NAME, Direction::Desc);
    let first_page = store
        .query(&ctx, &UserFilter::default(), &by_name_desc, Page::new(1, 2).unwrap())
        .unwrap();
    let names: Vec<_> = first_page.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Cora Bills", "Bill Kennedy"]);

    let second_page = store
        .query(&ctx, &UserFilter::default(), &by_name_desc, Page::new(2, 2).unwrap())
        .unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].name, "Ann Jones");

    let bills = UserFilter::default().with_name("Bill");
    let by_email = OrderBy::new(ORDER_BY_EMAIL, Direction::Asc);
    let matched = store
        .query(&ctx, &bills, &by_email, Page::default())
        .unwrap();
    assert_eq!(matched.len(), 2);
    assert_eq!(store.count(&ctx, &bills).unwrap(), 2);

    let created_window = UserFilter::default()
        .with_start_created_date(users[1].date_created)
        .with_end_created_date(users[2].date_created);
    assert_eq!(store.count(&ctx, &created_window).unwrap(), 2);

    let exact = UserFilter::default().with_email(email("ann@example.com"));
    assert_eq!(store.count(&ctx, &exact).unwrap(), 1);
}

#[test]
fn order_field_outside_allow_list_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();

    let err = store
        .query(
            &ctx,
            &UserFilter::default(),
            &OrderBy::new("password_hash; DROP TABLE users", Direction::Asc),
            Page::default(),
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn query_by_ids_returns_existing_matches_only() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();
    let users = seed(&store, &ctx);

    let found = store
        .query_by_ids(&ctx, &[users[0].user_id, Uuid::new_v4(), users[2].user_id])
        .unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|u| u.user_id == users[0].user_id));
    assert!(found.iter().any(|u| u.user_id == users[2].user_id));
}

#[test]
fn empty_id_batch_skips_io_even_for_canceled_context() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();
    ctx.cancel();

    assert!(store.query_by_ids(&ctx, &[]).unwrap().is_empty());
    assert!(matches!(
        store.count(&ctx, &UserFilter::default()),
        Err(RepoError::Context(_))
    ));
}

#[test]
fn invalid_persisted_role_is_reported() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();
    let stored = user("Bill Kennedy", "bill@example.com");
    store.create(&ctx, &stored).unwrap();
    conn.execute(
        "UPDATE users SET roles = 'SUPERUSER' WHERE user_id = ?1;",
        [stored.user_id.to_string()],
    )
    .unwrap();

    assert!(matches!(
        store.query_by_id(&ctx, stored.user_id),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn name_filter_treats_like_wildcards_literally() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();
    store.create(&ctx, &user("Ann_Jones", "ann@example.com")).unwrap();
    store.create(&ctx, &user("AnnXJones", "annx@example.com")).unwrap();
    store.create(&ctx, &user("100% Bill", "bill@example.com")).unwrap();

    assert_eq!(store.count(&ctx, &UserFilter::default().with_name("Ann_J")).unwrap(), 1);
    assert_eq!(store.count(&ctx, &UserFilter::default().with_name("0% B")).unwrap(), 1);
    assert_eq!(store.count(&ctx, &UserFilter::default().with_name("%")).unwrap(), 1);
}

#[test]
fn page_offset_beyond_sqlite_range_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteUserStore::new(&conn);
    let ctx = RequestContext::background();

    let err = store
        .query(
            &ctx,
            &UserFilter::default(),
            &OrderBy::new(ORDER_BY_NAME, Direction::Asc),
            Page::new(u32::MAX, u32::MAX).unwrap(),
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}
