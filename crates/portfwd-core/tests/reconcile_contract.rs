//! Contract Test: Reconciliation
//!
//! Verifies what a successful `create_addresses` / `delete_addresses` does
//! to the router.
//!
//! Constraints verified:
//! - Exactly one list per call, scoped by the batch's scope
//! - Stale rules are deleted before missing rules are created
//! - Rules not owned by a desired name are never touched
//! - Repeating a reconcile against the result changes nothing
//!
//! If this test fails, the router can drift from the desired state.

mod common;

use common::*;
use portfwd_core::traits::ChannelChangeLogger;
use portfwd_core::{Address, Reconciler, RuleChange, Scope};
use tokio_test::assert_ok;

fn reconciler(store: &FakeRuleStore) -> Reconciler {
    Reconciler::new("test-", Box::new(store.clone()))
}

#[tokio::test]
async fn changed_rule_is_deleted_then_recreated() {
    let store = FakeRuleStore::with_rules([Address::new("test-svc-8080", 8080, "5.6.7.8")]);

    let summary = assert_ok!(
        reconciler(&store)
            .create_addresses(&[Address::new("svc", 80, "1.2.3.4")])
            .await
    );

    assert_eq!(
        store.calls(),
        vec![
            Call::List(Scope::new()),
            Call::Delete(Address::new("test-svc-8080", 8080, "5.6.7.8")),
            Call::Create(Address::new("test-svc-80", 80, "1.2.3.4")),
        ]
    );
    assert_eq!(summary.deleted.len(), 1);
    assert_eq!(summary.created.len(), 1);
}

#[tokio::test]
async fn second_run_is_a_noop() {
    let store = FakeRuleStore::new();
    let engine = reconciler(&store);
    let desired = vec![
        Address::new("web", 80, "10.0.0.5"),
        Address::new("web", 443, "10.0.0.5").with_source_range("192.168.0.0/16"),
    ];

    assert_ok!(engine.create_addresses(&desired).await);
    store.clear_calls();

    let summary = assert_ok!(engine.create_addresses(&desired).await);

    assert!(summary.is_noop());
    assert_eq!(store.calls(), vec![Call::List(Scope::new())]);
}

#[tokio::test]
async fn every_desired_rule_exists_after_success() {
    let store = FakeRuleStore::with_rules([
        Address::new("test-web-80", 80, "10.0.0.4"),
        Address::new("test-web-8443", 8443, "10.0.0.5"),
    ]);
    let desired = vec![
        Address::new("web", 80, "10.0.0.5"),
        Address::new("web", 443, "10.0.0.5"),
    ];

    assert_ok!(reconciler(&store).create_addresses(&desired).await);

    let mut names: Vec<String> = store.rules().iter().map(|r| r.name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["test-web-443", "test-web-80"]);
    assert!(store.rules().iter().all(|r| r.ip() == "10.0.0.5"));
}

#[tokio::test]
async fn foreign_rules_are_never_touched() {
    let store = FakeRuleStore::with_rules([
        Address::new("manual-ssh", 22, "10.0.0.2"),
        Address::new("other-tool-web-80", 80, "10.0.0.9"),
        Address::new("test-svc-admin-8443", 8443, "10.0.0.7"),
    ]);

    assert_ok!(
        reconciler(&store)
            .create_addresses(&[Address::new("svc", 80, "1.2.3.4")])
            .await
    );

    assert_eq!(
        store.mutations(),
        vec![Call::Create(Address::new("test-svc-80", 80, "1.2.3.4"))]
    );
}

#[tokio::test]
async fn any_source_is_treated_as_unrestricted() {
    let store = FakeRuleStore::with_rules([
        Address::new("test-svc-80", 80, "1.2.3.4").with_source_range("any"),
    ]);

    let summary = assert_ok!(
        reconciler(&store)
            .create_addresses(&[Address::new("svc", 80, "1.2.3.4")])
            .await
    );

    assert!(summary.is_noop());
    assert!(store.mutations().is_empty());
}

#[tokio::test]
async fn source_range_change_replaces_rule() {
    let store = FakeRuleStore::with_rules([Address::new("test-svc-80", 80, "1.2.3.4")]);

    assert_ok!(
        reconciler(&store)
            .create_addresses(&[Address::new("svc", 80, "1.2.3.4").with_source_range("10.0.0.0/8")])
            .await
    );

    assert_eq!(
        store.mutations(),
        vec![
            Call::Delete(Address::new("test-svc-80", 80, "1.2.3.4")),
            Call::Create(
                Address::new("test-svc-80", 80, "1.2.3.4").with_source_range("10.0.0.0/8")
            ),
        ]
    );
}

#[tokio::test]
async fn scopes_are_isolated() {
    let home = Scope::site("home");
    let garage = Scope::site("garage");
    let store = FakeRuleStore::with_rules([
        Address::new("test-svc-8080", 8080, "5.6.7.8").with_scope(garage.clone()),
    ]);

    assert_ok!(
        reconciler(&store)
            .create_addresses(&[Address::new("svc", 80, "1.2.3.4").with_scope(home.clone())])
            .await
    );

    assert_eq!(
        store.calls(),
        vec![
            Call::List(home.clone()),
            Call::Create(Address::new("test-svc-80", 80, "1.2.3.4").with_scope(home)),
        ]
    );
    assert!(store.rules().iter().any(|r| r.scope() == &garage));
}

#[tokio::test]
async fn delete_removes_exact_matches_only() {
    let store = FakeRuleStore::with_rules([
        Address::new("test-svc-80", 80, "1.2.3.4"),
        Address::new("test-svc-443", 443, "9.9.9.9"),
        Address::new("manual-ssh", 22, "10.0.0.2"),
    ]);
    let desired = vec![
        Address::new("svc", 80, "1.2.3.4"),
        Address::new("svc", 443, "1.2.3.4"),
    ];

    let summary = assert_ok!(reconciler(&store).delete_addresses(&desired).await);

    assert_eq!(summary.deleted, vec![Address::new("test-svc-80", 80, "1.2.3.4")]);
    assert_eq!(store.rules().len(), 2);
}

#[tokio::test]
async fn repeated_delete_is_a_noop() {
    let store = FakeRuleStore::with_rules([Address::new("test-svc-80", 80, "1.2.3.4")]);
    let engine = reconciler(&store);
    let desired = vec![Address::new("svc", 80, "1.2.3.4")];

    assert_ok!(engine.delete_addresses(&desired).await);
    store.clear_calls();

    let summary = assert_ok!(engine.delete_addresses(&desired).await);
    assert!(summary.is_noop());
    assert_eq!(store.calls(), vec![Call::List(Scope::new())]);
}

#[tokio::test]
async fn change_logger_sees_each_mutation_in_order() {
    let store = FakeRuleStore::with_rules([Address::new("test-svc-8080", 8080, "5.6.7.8")]);
    let (logger, mut changes) = ChannelChangeLogger::new(16);
    let engine = reconciler(&store).with_logger(Box::new(logger));

    assert_ok!(
        engine
            .create_addresses(&[Address::new("svc", 80, "1.2.3.4")])
            .await
    );

    assert_eq!(
        changes.try_recv().unwrap(),
        RuleChange::StaleDeleted(Address::new("test-svc-8080", 8080, "5.6.7.8"))
    );
    assert_eq!(
        changes.try_recv().unwrap(),
        RuleChange::Created(Address::new("test-svc-80", 80, "1.2.3.4"))
    );
    assert!(changes.try_recv().is_err());
}
