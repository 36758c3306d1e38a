//! # Upsert Reconciler Tests
//!
//! Drives the reconciler against the in-memory store.
//!
//! These tests verify:
//! - Create when absent, update when present
//! - Version tokens: never on create, exactly the one read on update
//! - Failures other than not-found never fall through to create
//! - The two concurrent-upsert races surface as retryable errors
//! - The DbSecret document sent to the store

mod common;

use common::{Call, MemoryStore};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Barrier;
use vals_operator_provider::codec::{ManagedObject, ObjectKey, ResourceKind};
use vals_operator_provider::controller::{Cancellation, ReconcileError, Reconciler, UpsertOutcome};
use vals_operator_provider::crd::{
    DbSecret, DbSecretSpec, RolloutKind, RolloutTarget, SecretReference, TemplateEntry,
    ValsSecret, ValsSecretSpec,
};
use vals_operator_provider::observability::operation_count;
use vals_operator_provider::store::{Operation, StoreError};

fn vals_secret(name: &str, ttl: i64) -> ValsSecretSpec {
    ValsSecretSpec {
        name: name.to_string(),
        namespace: "apps".to_string(),
        secret_ref: vec![SecretReference {
            name: "password".to_string(),
            reference: "ref+vault://secret/data/app#password".to_string(),
            encoding: None,
        }],
        template: vec![],
        secret_type: "Opaque".to_string(),
        ttl,
    }
}

fn db_secret() -> DbSecretSpec {
    DbSecretSpec {
        name: "example".to_string(),
        namespace: "default".to_string(),
        vault_role: "role".to_string(),
        vault_mount: "cass000".to_string(),
        template: vec![TemplateEntry {
            name: "CASSANDRA_USERNAME".to_string(),
            value: "{{ .username }}".to_string(),
        }],
        rollout: vec![RolloutTarget {
            kind: RolloutKind::Deployment,
            name: "my-app".to_string(),
        }],
    }
}

fn setup() -> (Arc<MemoryStore>, Reconciler) {
    let store = MemoryStore::new();
    let reconciler = Reconciler::new(Arc::clone(&store) as _);
    (store, reconciler)
}

#[tokio::test]
async fn test_absent_object_is_created_without_version_token() {
    let (store, reconciler) = setup();
    let spec = vals_secret("app", 600);
    let key = ObjectKey::new("apps", "app");

    let applied = reconciler
        .upsert::<ValsSecret>(&spec, &Cancellation::new())
        .await
        .expect("upsert");

    assert_eq!(applied.outcome, UpsertOutcome::Created);
    assert_eq!(applied.observed, spec);
    assert_eq!(applied.resource_version.as_deref(), Some("1"));
    assert_eq!(
        store.calls(),
        vec![Call::Get(key.clone()), Call::Create(key, None)]
    );
}

#[tokio::test]
async fn test_second_apply_takes_update_branch() {
    let (store, reconciler) = setup();
    let spec = vals_secret("app", 600);
    let key = ObjectKey::new("apps", "app");
    let cancel = Cancellation::new();

    let first = reconciler
        .upsert::<ValsSecret>(&spec, &cancel)
        .await
        .expect("first");
    let second = reconciler
        .upsert::<ValsSecret>(&spec, &cancel)
        .await
        .expect("second");

    assert_eq!(first.outcome, UpsertOutcome::Created);
    assert_eq!(second.outcome, UpsertOutcome::Updated);
    assert_eq!(first.observed, second.observed);
    assert_eq!(
        store.calls(),
        vec![
            Call::Get(key.clone()),
            Call::Create(key.clone(), None),
            Call::Get(key.clone()),
            Call::Update(key, Some("1".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_update_carries_token_from_its_own_read() {
    let (store, reconciler) = setup();
    let key = ObjectKey::new("apps", "app");
    let cancel = Cancellation::new();

    reconciler
        .upsert::<ValsSecret>(&vals_secret("app", 600), &cancel)
        .await
        .expect("create");
    // Someone else wrote in between
    let current = store.touch(&ValsSecret::DESCRIPTOR, &key);
    store.clear_calls();

    let applied = reconciler
        .upsert::<ValsSecret>(&vals_secret("app", 900), &cancel)
        .await
        .expect("update");

    assert_eq!(applied.observed.ttl, 900);
    assert_eq!(
        store.calls(),
        vec![Call::Get(key.clone()), Call::Update(key, Some(current))]
    );
}

#[tokio::test]
async fn test_transport_failure_on_get_never_creates() {
    let (store, reconciler) = setup();
    store.fail_on(Operation::Get);

    let err = reconciler
        .upsert::<ValsSecret>(&vals_secret("app", 600), &Cancellation::new())
        .await
        .expect_err("get fails");

    assert!(!err.is_not_found());
    assert!(!err.is_retryable());
    assert!(matches!(
        err,
        ReconcileError::Store(StoreError::Transport {
            operation: Operation::Get,
            ..
        })
    ));
    assert_eq!(store.calls(), vec![Call::Get(ObjectKey::new("apps", "app"))]);
}

#[tokio::test]
async fn test_stored_object_without_version_is_not_updated() {
    let (store, reconciler) = setup();
    let object: ManagedObject = serde_json::from_value(json!({
        "apiVersion": "digitalis.io/v1",
        "kind": "ValsSecret",
        "metadata": { "name": "app", "namespace": "apps" },
        "spec": { "name": "app" }
    }))
    .expect("document");
    store.seed(&ValsSecret::DESCRIPTOR, object);

    let err = reconciler
        .upsert::<ValsSecret>(&vals_secret("app", 600), &Cancellation::new())
        .await
        .expect_err("no version token");

    assert!(matches!(err, ReconcileError::MissingResourceVersion { .. }));
    assert_eq!(store.calls().len(), 1);
}

#[tokio::test]
async fn test_concurrent_updates_one_conflicts() {
    let (store, reconciler) = setup();
    reconciler
        .upsert::<ValsSecret>(&vals_secret("app", 600), &Cancellation::new())
        .await
        .expect("seed");
    store.pause_after_get(Arc::new(Barrier::new(2)));

    let cancel = Cancellation::new();
    let left = vals_secret("app", 700);
    let right = vals_secret("app", 800);
    let (a, b) = tokio::join!(
        reconciler.upsert::<ValsSecret>(&left, &cancel),
        reconciler.upsert::<ValsSecret>(&right, &cancel),
    );

    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (a, b) => panic!("expected one success and one failure, got {a:?} / {b:?}"),
    };
    assert_eq!(won.outcome, UpsertOutcome::Updated);
    assert!(lost.is_retryable());
    assert!(matches!(lost, ReconcileError::Store(StoreError::Conflict { .. })));

    let stored = store
        .stored(&ValsSecret::DESCRIPTOR, &ObjectKey::new("apps", "app"))
        .expect("stored");
    assert_eq!(stored.spec["ttl"], won.observed.ttl);
}

#[tokio::test]
async fn test_concurrent_creates_one_already_exists() {
    let (store, reconciler) = setup();
    store.pause_after_get(Arc::new(Barrier::new(2)));

    let cancel = Cancellation::new();
    let left = vals_secret("app", 700);
    let right = vals_secret("app", 800);
    let (a, b) = tokio::join!(
        reconciler.upsert::<ValsSecret>(&left, &cancel),
        reconciler.upsert::<ValsSecret>(&right, &cancel),
    );

    let lost = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => {
            assert_eq!(won.outcome, UpsertOutcome::Created);
            lost
        }
        (a, b) => panic!("expected one success and one failure, got {a:?} / {b:?}"),
    };
    assert!(lost.is_retryable());
    assert!(matches!(
        lost,
        ReconcileError::Store(StoreError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_db_secret_document_end_to_end() {
    let (store, reconciler) = setup();
    let key = ObjectKey::new("default", "example");

    let applied = reconciler
        .upsert::<DbSecret>(&db_secret(), &Cancellation::new())
        .await
        .expect("upsert");
    assert_eq!(applied.outcome, UpsertOutcome::Created);

    let stored = store.stored(&DbSecret::DESCRIPTOR, &key).expect("stored");
    assert_eq!(
        serde_json::to_value(&stored).expect("to json"),
        json!({
            "apiVersion": "digitalis.io/v1beta1",
            "kind": "DbSecret",
            "metadata": { "name": "example", "namespace": "default", "resourceVersion": "1" },
            "spec": {
                "vault": { "role": "role", "mount": "cass000" },
                "template": { "CASSANDRA_USERNAME": "{{ .username }}" },
                "rollout": [ { "kind": "Deployment", "name": "my-app" } ]
            }
        })
    );

    let read = reconciler
        .read::<DbSecret>(&key, &Cancellation::new())
        .await
        .expect("read");
    assert_eq!(read, db_secret());
}

#[tokio::test]
async fn test_read_missing_is_not_found() {
    let (_store, reconciler) = setup();
    let err = reconciler
        .read::<DbSecret>(&ObjectKey::new("default", "missing"), &Cancellation::new())
        .await
        .expect_err("missing");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_then_read_is_not_found() {
    let (_store, reconciler) = setup();
    let cancel = Cancellation::new();
    let key = ObjectKey::new("default", "example");

    reconciler
        .upsert::<DbSecret>(&db_secret(), &cancel)
        .await
        .expect("create");
    reconciler
        .delete::<DbSecret>(&key, &cancel)
        .await
        .expect("delete");

    assert!(reconciler
        .read::<DbSecret>(&key, &cancel)
        .await
        .expect_err("gone")
        .is_not_found());
    assert!(reconciler
        .delete::<DbSecret>(&key, &cancel)
        .await
        .expect_err("already gone")
        .is_not_found());
}

#[tokio::test]
async fn test_cancelled_invocation_makes_no_calls() {
    let (store, reconciler) = setup();
    let cancel = Cancellation::new();
    cancel.cancel();

    let err = reconciler
        .upsert::<ValsSecret>(&vals_secret("app", 600), &cancel)
        .await
        .expect_err("cancelled");

    assert!(matches!(err, ReconcileError::Cancelled(_)));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_operations_are_counted() {
    let (_store, reconciler) = setup();
    let before = operation_count("DbSecret", "create");

    reconciler
        .upsert::<DbSecret>(&db_secret(), &Cancellation::new())
        .await
        .expect("upsert");

    assert!(operation_count("DbSecret", "create") > before);
}
