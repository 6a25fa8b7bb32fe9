mod common;

use common::{
    email, fast_hasher, manual_clock, new_user, Calls, CountingUserStore, RecordingSink, PASSWORD,
};
use sales_core::model::user::{EVENT_CREATED, EVENT_SOURCE, EVENT_UPDATED};
use sales_core::{
    open_db_in_memory, CachedUserStore, CoreError, EventSink, Role, RequestContext,
    SqliteUserStore, UpdateEventProjection, UpdateUser, UserCache, UserCore,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn partial_update_changes_only_present_fields() {
    let conn = open_db_in_memory().unwrap();
    let core = UserCore::new(SqliteUserStore::new(&conn), manual_clock(), fast_hasher());
    let ctx = RequestContext::background();

    let mut input = new_user("Bill Kennedy", "bill@example.com");
    input.department = Some("Sales".to_string());
    input.roles = vec![Role::Admin, Role::User];
    let created = core.create(&ctx, input).unwrap();

    let updated = core
        .update(
            &ctx,
            &created,
            UpdateUser {
                name: Some("X".to_string()),
                ..UpdateUser::default()
            },
        )
        .unwrap();

    assert_eq!(updated.name, "X");
    assert_eq!(updated.user_id, created.user_id);
    assert_eq!(updated.email, created.email);
    assert_eq!(updated.roles, created.roles);
    assert_eq!(updated.password_hash, created.password_hash);
    assert_eq!(updated.department, created.department);
    assert_eq!(updated.enabled, created.enabled);
    assert_eq!(updated.date_created, created.date_created);
    assert!(updated.date_updated > created.date_updated);

    let stored = core.query_by_id(&ctx, created.user_id).unwrap();
    assert_eq!(stored, updated);
}

#[test]
fn create_assigns_identity_and_hashes_password() {
    let conn = open_db_in_memory().unwrap();
    let core = UserCore::new(SqliteUserStore::new(&conn), manual_clock(), fast_hasher());
    let ctx = RequestContext::background();

    let created = core.create(&ctx, new_user("Bill Kennedy", "bill@example.com")).unwrap();

    assert!(created.enabled);
    assert_eq!(created.date_created, created.date_updated);
    assert_ne!(created.password_hash, PASSWORD.as_bytes());
    assert!(core
        .authenticate(&ctx, &created.email, PASSWORD)
        .is_ok());
}

#[test]
fn duplicate_email_is_non_unique_key_on_sqlite() {
    let conn = open_db_in_memory().unwrap();
    let core = UserCore::new(SqliteUserStore::new(&conn), manual_clock(), fast_hasher());
    let ctx = RequestContext::background();

    core.create(&ctx, new_user("Bill Kennedy", "bill@example.com")).unwrap();
    let err = core
        .create(&ctx, new_user("Bill Kennedy", "BILL@example.com"))
        .unwrap_err();

    assert!(
        matches!(err, CoreError::NonUniqueKey { .. }),
        "unexpected error: {err:?}"
    );
}

#[test]
fn update_of_missing_user_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let core = UserCore::new(SqliteUserStore::new(&conn), manual_clock(), fast_hasher());
    let ctx = RequestContext::background();
    let ghost = common::user("Ghost", "ghost@example.com");

    let err = core
        .update(&ctx, &ghost, UpdateUser::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "user" }));
    assert!(core.delete(&ctx, &ghost).unwrap_err().is_not_found());
}

#[test]
fn update_event_carries_only_enablement_by_default() {
    let store = CountingUserStore::new();
    let sink = RecordingSink::new();
    let core = UserCore::new(store, manual_clock(), fast_hasher())
        .with_event_sink(sink.clone() as Arc<dyn EventSink>);
    let ctx = RequestContext::background();
    let created = core.create(&ctx, new_user("Bill Kennedy", "bill@example.com")).unwrap();

    core.update(
        &ctx,
        &created,
        UpdateUser {
            name: Some("Renamed".to_string()),
            enabled: Some(false),
            ..UpdateUser::default()
        },
    )
    .unwrap();

    let updates: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|event| event.kind == EVENT_UPDATED)
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].source, EVENT_SOURCE);

    let params = updates[0].params_json().unwrap();
    let fields = params.as_object().unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(params["userID"], created.user_id.to_string());
    assert_eq!(params["enabled"], false);
    assert!(params.get("name").is_none());
}

#[test]
fn all_changed_projection_carries_every_changed_field_but_no_password() {
    let sink = RecordingSink::new();
    let core = UserCore::new(CountingUserStore::new(), manual_clock(), fast_hasher())
        .with_event_sink(sink.clone() as Arc<dyn EventSink>)
        .with_projection(UpdateEventProjection::AllChanged);
    let ctx = RequestContext::background();
    let created = core.create(&ctx, new_user("Bill Kennedy", "bill@example.com")).unwrap();

    core.update(
        &ctx,
        &created,
        UpdateUser {
            name: Some("Renamed".to_string()),
            password: Some("new-secret".to_string()),
            password_confirm: Some("new-secret".to_string()),
            ..UpdateUser::default()
        },
    )
    .unwrap();

    let event = sink.events().pop().unwrap();
    let params = event.params_json().unwrap();
    assert_eq!(params["name"], "Renamed");
    assert!(params.get("password").is_none());
    assert!(params.get("enabled").is_none());
}

#[test]
fn failed_write_emits_no_event() {
    let store = CountingUserStore::new();
    let sink = RecordingSink::new();
    let core = UserCore::new(store.clone(), manual_clock(), fast_hasher())
        .with_event_sink(sink.clone() as Arc<dyn EventSink>);
    let ctx = RequestContext::background();

    store.fail_writes(true);
    assert!(core
        .create(&ctx, new_user("Bill Kennedy", "bill@example.com"))
        .is_err());
    assert!(sink.events().is_empty());
}

#[test]
fn authenticate_rejects_wrong_password_and_disabled_user() {
    let conn = open_db_in_memory().unwrap();
    let core = UserCore::new(SqliteUserStore::new(&conn), manual_clock(), fast_hasher());
    let ctx = RequestContext::background();
    let created = core.create(&ctx, new_user("Bill Kennedy", "bill@example.com")).unwrap();

    assert!(matches!(
        core.authenticate(&ctx, &created.email, "wrong"),
        Err(CoreError::AuthenticationFailure)
    ));
    assert!(core
        .authenticate(&ctx, &email("nobody@example.com"), PASSWORD)
        .unwrap_err()
        .is_not_found());

    core.update(
        &ctx,
        &created,
        UpdateUser {
            enabled: Some(false),
            ..UpdateUser::default()
        },
    )
    .unwrap();
    assert!(matches!(
        core.authenticate(&ctx, &created.email, PASSWORD),
        Err(CoreError::AuthenticationFailure)
    ));
}

#[test]
fn end_to_end_create_read_disable_read() {
    let clock = manual_clock();
    let store = CountingUserStore::new();
    let cache = Arc::new(UserCache::new(Duration::from_secs(600), clock.clone()));
    let sink = RecordingSink::new();
    let core = UserCore::new(
        CachedUserStore::new(store.clone(), cache.clone()),
        clock,
        fast_hasher(),
    )
    .with_event_sink(sink.clone() as Arc<dyn EventSink>);
    let ctx = RequestContext::background();

    let a = core.create(&ctx, new_user("User A", "a@x.com")).unwrap();
    assert!(cache.contains_id(a.user_id));
    assert!(cache.contains_email(&email("a@x.com")));

    assert_eq!(core.query_by_id(&ctx, a.user_id).unwrap(), a);
    assert_eq!(Calls::get(&store.calls.query_by_id), 0);

    let disabled = core
        .update(
            &ctx,
            &a,
            UpdateUser {
                enabled: Some(false),
                ..UpdateUser::default()
            },
        )
        .unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EVENT_CREATED);
    assert_eq!(events[1].kind, EVENT_UPDATED);
    assert_eq!(
        events[1].params_json().unwrap(),
        serde_json::json!({ "userID": a.user_id.to_string(), "enabled": false })
    );

    let by_email = core.query_by_email(&ctx, &email("a@x.com")).unwrap();
    assert_eq!(by_email, disabled);
    assert!(!by_email.enabled);
    assert_eq!(Calls::get(&store.calls.query_by_email), 0);
}

#[test]
fn authenticate_with_out_of_range_password_is_authentication_failure() {
    let conn = open_db_in_memory().unwrap();
    let core = UserCore::new(SqliteUserStore::new(&conn), manual_clock(), fast_hasher());
    let ctx = RequestContext::background();
    let created = core.create(&ctx, new_user("Bill Kennedy", "bill@example.com")).unwrap();

    for password in [String::new(), "x".repeat(73)] {
        assert!(matches!(
            core.authenticate(&ctx, &created.email, &password),
            Err(CoreError::AuthenticationFailure)
        ));
    }
}
