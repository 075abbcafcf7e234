mod support;

use keyshift::{
    DEFAULT_LEDGER_KEY, KeySpace, Ledger, MemoryStore, MigrationError, MigrationRunner, MigrationSet, RunnerState,
    catalog,
    units::{AuthInfoSplit, BoardRename, MailboxUuid, authinfo, board_rename, mailbox_uuid},
};
use serde_json::json;
use support::{FailingStore, mark_items};

fn items(count: usize) -> MemoryStore {
    MemoryStore::with_records((1..=count).map(|i| (format!("Item:{i}"), json!({"n": i}))))
}

fn ledger_ids(store: &MemoryStore) -> serde_json::Value {
    store.record(DEFAULT_LEDGER_KEY).unwrap()["Migrations"].clone()
}

#[tokio::test]
async fn every_supplied_order_records_ids_in_static_order() {
    let ids = ["a-001", "b-002", "c-003"];
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in orders {
        let supplied: Vec<&'static str> = order.iter().map(|i| ids[*i]).collect();
        let set = MigrationSet::sorted(mark_items(&supplied)).unwrap();
        let mut runner = MigrationRunner::new(items(2));

        let report = runner.run(&set).await.unwrap();
        assert_eq!(report.applied.len(), 3);
        assert_eq!(ledger_ids(runner.store()), json!(ids), "order {order:?}");
    }
}

#[tokio::test]
async fn second_pass_touches_no_record() {
    let set = MigrationSet::new(mark_items(&["a", "b"])).unwrap();
    let mut runner = MigrationRunner::new(items(3));
    runner.run(&set).await.unwrap();

    let ledger_before = runner.store().raw(DEFAULT_LEDGER_KEY);
    let records_before: Vec<_> = (1..=3).map(|i| runner.store().raw(&format!("Item:{i}"))).collect();
    runner.store().reset_counts();

    let report = runner.run(&set).await.unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.already_applied, vec!["a", "b"]);

    let counts = runner.store().counts();
    assert_eq!(counts.writes(), 0);
    assert_eq!(counts.scans, 0);
    // only the ledger read
    assert_eq!(counts.gets, 1);
    assert_eq!(runner.store().raw(DEFAULT_LEDGER_KEY), ledger_before);
    let records_after: Vec<_> = (1..=3).map(|i| runner.store().raw(&format!("Item:{i}"))).collect();
    assert_eq!(records_after, records_before);
}

#[tokio::test]
async fn unit_interrupted_after_three_keys_reports_them() {
    let store = FailingStore::new(items(5));
    store.fail_writes_to("Item:4");
    let set = MigrationSet::new(mark_items(&["mark"])).unwrap();
    let mut runner = MigrationRunner::new(store);

    let err = runner.run(&set).await.unwrap_err();
    assert_eq!(runner.state(), RunnerState::Failed);
    match &err {
        MigrationError::PartialUnitApplication {
            migration,
            key,
            transformed,
            partial_key_writes,
            source,
        } => {
            assert_eq!(migration, "mark");
            assert_eq!(key, "Item:4");
            assert_eq!(transformed, &vec!["Item:1", "Item:2", "Item:3"]);
            assert!(partial_key_writes.is_empty());
            assert!(matches!(**source, MigrationError::StoreUnavailable { .. }));
        }
        other => panic!("expected partial application, got {other:?}"),
    }

    let inner = runner.store().inner();
    for i in 1..=3 {
        assert_eq!(inner.record(&format!("Item:{i}")).unwrap()["mark"], json!(true));
    }
    for i in 4..=5 {
        assert_eq!(inner.record(&format!("Item:{i}")).unwrap(), json!({"n": i}));
    }
    assert!(inner.raw(DEFAULT_LEDGER_KEY).is_none());
}

#[tokio::test]
async fn failure_on_first_key_is_not_partial() {
    let store = FailingStore::new(items(2));
    store.fail_writes_to("Item:1");
    let set = MigrationSet::new(mark_items(&["mark"])).unwrap();
    let mut runner = MigrationRunner::new(store);

    let err = runner.run(&set).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::StoreUnavailable { ref migration, ref key, .. }
            if migration.as_deref() == Some("mark") && key.as_deref() == Some("Item:1")
    ));
}

#[tokio::test]
async fn ledger_write_failure_is_unrecorded_unit() {
    let store = FailingStore::new(items(2));
    store.fail_writes_to(DEFAULT_LEDGER_KEY);
    let set = MigrationSet::new(mark_items(&["first", "second"])).unwrap();
    let mut runner = MigrationRunner::new(store);

    let err = runner.run(&set).await.unwrap_err();
    match err {
        MigrationError::UnrecordedUnit {
            migration,
            keys_transformed,
            ..
        } => {
            assert_eq!(migration, "first");
            assert_eq!(keys_transformed, 2);
        }
        other => panic!("expected unrecorded unit, got {other:?}"),
    }
    // second unit never ran
    let item = runner.store().inner().record("Item:1").unwrap();
    assert_eq!(item["first"], json!(true));
    assert!(item.get("second").is_none());
}

#[tokio::test]
async fn shape_mismatch_after_first_key_is_partial() {
    let store = FailingStore::new(MemoryStore::with_records([
        ("Item:1", json!({})),
        ("Item:2", json!("not an object")),
    ]));
    let set = MigrationSet::new(mark_items(&["a"])).unwrap();
    let mut runner = MigrationRunner::new(store);

    let err = runner.run(&set).await.unwrap_err();
    match err {
        MigrationError::PartialUnitApplication { source, .. } => {
            assert!(matches!(*source, MigrationError::RecordShapeMismatch { .. }));
        }
        other => panic!("expected partial application, got {other:?}"),
    }
}

#[tokio::test]
async fn authinfo_splits_login_and_password_state() {
    let user = |uuid: &str, hash: &str| {
        json!({
            "Name": "someone",
            "Uuid": uuid,
            "Login": {
                "LastLogin": "2020-09-01T10:00:00",
                "LastLogoff": "2020-09-01T11:00:00",
                "LastLoginFailure": "2020-08-01T00:00:00",
                "LastLoginFrom": "10.0.0.1",
                "LoginFailureCount": 2,
                "CreatedTime": "2019-01-01T00:00:00",
                "FirstLogin": false
            },
            "Password": {
                "Hash": hash,
                "LastChanged": "2020-07-01T00:00:00",
                "LastChangedFrom": "10.0.0.2"
            }
        })
    };
    let store = MemoryStore::with_records([
        ("User:alice", user("uuid-alice", "$2a$alice")),
        ("User:bob", user("uuid-bob", "$2a$bob")),
    ]);
    let set = MigrationSet::new(vec![Box::new(AuthInfoSplit::new(KeySpace::default()))]).unwrap();
    let mut runner = MigrationRunner::new(store);

    let report = runner.run(&set).await.unwrap();
    assert_eq!(report.applied[0].keys_transformed, 2);
    assert_eq!(report.applied[0].writes.updates, 4);

    let store = runner.store();
    for (name, uuid, hash) in [("alice", "uuid-alice", "$2a$alice"), ("bob", "uuid-bob", "$2a$bob")] {
        let user = store.record(&format!("User:{name}")).unwrap();
        assert!(user.get("Login").is_none());
        assert!(user.get("Password").is_none());
        assert_eq!(user["Uuid"], json!(uuid));

        let authinfo = store.record(&format!("Hybrasyl.AuthInfo:{uuid}")).unwrap();
        assert_eq!(authinfo["UserUuid"], json!(uuid));
        assert_eq!(authinfo["PasswordHash"], json!(hash));
        assert_eq!(authinfo["LastPasswordChangeFrom"], json!("10.0.0.2"));
        assert_eq!(authinfo["LoginFailureCount"], json!(2));
        assert_eq!(authinfo["FirstLogin"], json!(false));
    }
    assert_eq!(ledger_ids(store), json!([authinfo::ID]));
}

fn login_user(uuid: &str) -> serde_json::Value {
    json!({
        "Uuid": uuid,
        "Login": {
            "LastLogin": null, "LastLogoff": null, "LastLoginFailure": null,
            "LastLoginFrom": null, "LoginFailureCount": 0, "CreatedTime": null,
            "FirstLogin": true
        },
        "Password": {"Hash": "h", "LastChanged": null, "LastChangedFrom": null}
    })
}

#[tokio::test]
async fn authinfo_failure_mid_key_reports_the_written_record() {
    let store = FailingStore::new(MemoryStore::with_records([
        ("User:alice", login_user("u-a")),
        ("User:bob", login_user("u-b")),
    ]));
    store.fail_writes_to("User:bob");
    let set = MigrationSet::new(vec![Box::new(AuthInfoSplit::new(KeySpace::default()))]).unwrap();
    let mut runner = MigrationRunner::new(store);

    let err = runner.run(&set).await.unwrap_err();
    assert!(err.to_string().contains("Hybrasyl.AuthInfo:u-b"));
    match err {
        MigrationError::PartialUnitApplication {
            key,
            transformed,
            partial_key_writes,
            ..
        } => {
            assert_eq!(key, "User:bob");
            assert_eq!(transformed, vec!["User:alice"]);
            assert_eq!(partial_key_writes, vec!["Hybrasyl.AuthInfo:u-b"]);
        }
        other => panic!("expected partial application, got {other:?}"),
    }

    let inner = runner.store().inner();
    assert!(inner.record("Hybrasyl.AuthInfo:u-b").is_some());
    assert!(inner.record("User:bob").unwrap().get("Login").is_some());
    assert!(inner.raw(DEFAULT_LEDGER_KEY).is_none());
}

#[tokio::test]
async fn first_key_with_a_landed_write_is_partial() {
    let store = FailingStore::new(MemoryStore::with_records([("User:bob", login_user("u-b"))]));
    store.fail_writes_to("User:bob");
    let set = MigrationSet::new(vec![Box::new(AuthInfoSplit::new(KeySpace::default()))]).unwrap();
    let mut runner = MigrationRunner::new(store);

    match runner.run(&set).await.unwrap_err() {
        MigrationError::PartialUnitApplication {
            transformed,
            partial_key_writes,
            source,
            ..
        } => {
            assert!(transformed.is_empty());
            assert_eq!(partial_key_writes, vec!["Hybrasyl.AuthInfo:u-b"]);
            assert!(matches!(*source, MigrationError::StoreUnavailable { .. }));
        }
        other => panic!("expected partial application, got {other:?}"),
    }
}

#[tokio::test]
async fn user_without_login_is_a_shape_mismatch() {
    let store = MemoryStore::with_records([("User:carol", json!({"Uuid": "u-3", "Password": {}}))]);
    let set = MigrationSet::new(vec![Box::new(AuthInfoSplit::new(KeySpace::default()))]).unwrap();
    let mut runner = MigrationRunner::new(store);

    match runner.run(&set).await.unwrap_err() {
        MigrationError::RecordShapeMismatch { migration, key, .. } => {
            assert_eq!(migration, authinfo::ID);
            assert_eq!(key, "User:carol");
        }
        other => panic!("expected shape mismatch, got {other:?}"),
    }
    assert_eq!(
        runner.store().record("User:carol").unwrap(),
        json!({"Uuid": "u-3", "Password": {}})
    );
}

#[tokio::test]
async fn board_rename_keeps_values_and_reruns_are_free() {
    let store = MemoryStore::new();
    store.insert_raw("Hybrasyl.Board:general", r#"{"Name": "General",  "Messages": [1, 2]}"#);
    store.insert_raw("Hybrasyl.Board:trade", r#"{"Name":"Trade"}"#);
    let set = MigrationSet::new(vec![Box::new(BoardRename::new(KeySpace::default()))]).unwrap();
    let mut runner = MigrationRunner::new(store);

    let report = runner.run(&set).await.unwrap();
    assert_eq!(report.applied[0].writes.renames, 2);

    let store = runner.store();
    assert_eq!(
        store.raw("Hybrasyl.Messaging.Board:general").as_deref(),
        Some(r#"{"Name": "General",  "Messages": [1, 2]}"#)
    );
    assert_eq!(store.raw("Hybrasyl.Messaging.Board:trade").as_deref(), Some(r#"{"Name":"Trade"}"#));
    assert!(store.raw("Hybrasyl.Board:general").is_none());
    assert!(store.raw("Hybrasyl.Board:trade").is_none());
    // rename-only units never read the record
    assert_eq!(store.counts().gets, 1);

    store.reset_counts();
    runner.run(&set).await.unwrap();
    let counts = runner.store().counts();
    assert_eq!(counts.total(), 1, "only the ledger is read");
    assert_eq!(ledger_ids(runner.store()), json!([board_rename::ID]));
}

#[tokio::test]
async fn mailbox_without_user_names_the_missing_record() {
    let store = MemoryStore::with_records([
        ("User:alice", json!({"Uuid": "u-1"})),
        ("Hybrasyl.Mailbox:alice", json!({"Messages": []})),
        ("Hybrasyl.Mailbox:ghost", json!({"Messages": []})),
    ]);
    let set = MigrationSet::new(vec![Box::new(MailboxUuid::new(KeySpace::default()))]).unwrap();
    let mut runner = MigrationRunner::new(store);

    match runner.run(&set).await.unwrap_err() {
        MigrationError::PartialUnitApplication { transformed, source, .. } => {
            assert_eq!(transformed, vec!["Hybrasyl.Mailbox:alice"]);
            match *source {
                MigrationError::MissingRecord { migration, key, related } => {
                    assert_eq!(migration, mailbox_uuid::ID);
                    assert_eq!(key, "Hybrasyl.Mailbox:ghost");
                    assert_eq!(related, "User:ghost");
                }
                other => panic!("expected missing record, got {other:?}"),
            }
        }
        other => panic!("expected partial application, got {other:?}"),
    }
    assert!(runner.store().record("Hybrasyl.Messaging.Mailbox:u-1").is_some());
}

#[tokio::test]
async fn catalog_migrates_a_full_store() {
    let store = MemoryStore::with_records([
        (
            "User:alice",
            json!({
                "Uuid": "u-1",
                "UserCookies": {"intro": "seen"},
                "Login": {
                    "LastLogin": null, "LastLogoff": null, "LastLoginFailure": null,
                    "LastLoginFrom": null, "LoginFailureCount": 0, "CreatedTime": null,
                    "FirstLogin": true
                },
                "Password": {"Hash": "h", "LastChanged": null, "LastChangedFrom": null}
            }),
        ),
        ("Hybrasyl.Mailbox:alice", json!({"Messages": []})),
        ("Hybrasyl.Board:general", json!({"Name": "General"})),
    ]);
    let set = catalog(&KeySpace::default()).unwrap();
    let mut runner = MigrationRunner::new(store);

    let report = runner.run(&set).await.unwrap();
    assert_eq!(report.applied.len(), 4);

    let store = runner.store();
    let user = store.record("User:alice").unwrap();
    assert_eq!(user, json!({"Uuid": "u-1", "Cookies": {"intro": "seen"}}));
    assert!(store.record("Hybrasyl.AuthInfo:u-1").is_some());
    assert!(store.record("Hybrasyl.Messaging.Mailbox:u-1").is_some());
    assert!(store.record("Hybrasyl.Messaging.Board:general").is_some());

    let ledger = Ledger::load(store, DEFAULT_LEDGER_KEY).await.unwrap();
    assert_eq!(ledger.applied(), set.ids().as_slice());
    assert_eq!(ledger.history().len(), 4);
    assert!(ledger.history().iter().all(|entry| entry.pass_id == report.pass_id));
}

#[tokio::test]
async fn dry_run_reports_planned_writes_only() {
    let set = catalog(&KeySpace::default()).unwrap();
    let store = MemoryStore::with_records([("Hybrasyl.Board:general", json!({"Name": "General"}))]);
    let mut runner = MigrationRunner::new(store).with_dry_run(true);

    let report = runner.run(&set).await.unwrap();
    assert!(report.dry_run);
    let board = report.applied.iter().find(|unit| unit.id == board_rename::ID).unwrap();
    assert_eq!(board.writes.renames, 1);

    assert_eq!(runner.store().counts().writes(), 0);
    assert!(runner.store().record("Hybrasyl.Board:general").is_some());
    assert!(runner.store().raw(DEFAULT_LEDGER_KEY).is_none());
}

#[tokio::test]
async fn duplicate_and_corrupt_ledgers() {
    let store = MemoryStore::with_records([(
        DEFAULT_LEDGER_KEY,
        json!({"Migrations": ["a", "a", "b", "a"]}),
    )]);
    let ledger = Ledger::load(&store, DEFAULT_LEDGER_KEY).await.unwrap();
    assert_eq!(ledger.applied(), ["a", "b"]);

    let set = MigrationSet::new(mark_items(&["a", "b", "c"])).unwrap();
    let mut runner = MigrationRunner::new(store);
    let report = runner.run(&set).await.unwrap();
    assert_eq!(report.applied.len(), 1);
    assert_eq!(ledger_ids(runner.store()), json!(["a", "b", "c"]));

    let corrupt = MemoryStore::new();
    corrupt.insert_raw(DEFAULT_LEDGER_KEY, "{\"Migrations\": 7}");
    let mut runner = MigrationRunner::new(corrupt);
    assert!(matches!(
        runner.run(&set).await.unwrap_err(),
        MigrationError::LedgerCorrupt { .. }
    ));
}
