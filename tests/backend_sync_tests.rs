//! Backend reconciliation against an in-memory 3scale tenant
//!
//! Each test drives `reconcile_backend` the way the watch loop does and
//! checks the remote calls made and the status written back.

mod common;

use capabilities_controller::constants::BACKEND_FINALIZER;
use capabilities_controller::controller::reconciler::reconcile_backend;
use capabilities_controller::controller::store::has_finalizer;
use capabilities_controller::crd::{
    ApplicationPlanSpec, Backend, BackendUsageSpec, ConditionType, LimitSpec, MetricMethodRefSpec,
};
use capabilities_controller::remote::Scope;
use common::{
    backend, backend_spec, method, metric, product, product_spec, rule, Harness, NAMESPACE,
};
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const RESYNC: Duration = Duration::from_secs(300);

async fn pass(h: &Harness, resource: Backend) -> Action {
    reconcile_backend(Arc::new(resource), h.reconciler.clone())
        .await
        .expect("backend pass failed")
}

/// Stored backend with a new spec and a bumped generation, as the API server would hand it out
fn edited(h: &Harness, name: &str, edit: impl FnOnce(&mut Backend)) -> Backend {
    let mut resource = h.backends.get(name);
    edit(&mut resource);
    resource.metadata.generation = resource.metadata.generation.map(|g| g + 1);
    h.backends.insert(resource.clone());
    resource
}

fn mark_deleted(resource: &mut Backend) {
    resource.metadata.deletion_timestamp =
        serde_json::from_value(serde_json::json!("2026-10-19T08:00:00Z")).unwrap();
}

#[tokio::test]
async fn test_first_pass_creates_backend_and_reports_ready() {
    let h = Harness::new();
    let mut spec = backend_spec("echo");
    spec.methods.insert("ping".to_string(), method("ping"));
    spec.mapping_rules.push(rule("GET", "/ping$", "ping"));
    let resource = backend("echo", spec);
    h.backends.insert(resource.clone());

    let action = pass(&h, resource).await;
    assert_eq!(action, Action::requeue(RESYNC));

    let backend_id = h.api.backend_id("echo").expect("backend created");
    assert_eq!(h.api.method_names(Scope::Backend(backend_id)), vec!["ping"]);
    assert_eq!(h.api.rule_order(Scope::Backend(backend_id)), vec!["GET /ping$"]);

    let status = h.backends.get("echo").status.expect("status written");
    assert!(status.is_ready());
    assert_eq!(status.remote_id, Some(backend_id));
    assert_eq!(status.provider_account_host.as_deref(), Some(common::HOST));
    assert_eq!(status.observed_generation, Some(1));
}

#[tokio::test]
async fn test_methods_converge_with_deletes_before_creates() {
    let h = Harness::new();
    let mut spec = backend_spec("echo");
    spec.methods.insert("a".to_string(), method("a"));
    spec.methods.insert("b".to_string(), method("b"));
    let resource = backend("echo", spec);
    h.backends.insert(resource.clone());
    pass(&h, resource).await;

    // c takes over a's display name, which the tenant only accepts once a is gone
    let resource = edited(&h, "echo", |b| {
        b.spec.methods.remove("a");
        b.spec.methods.insert("c".to_string(), method("a"));
    });
    h.api.reset_calls();
    let action = pass(&h, resource).await;

    assert_eq!(action, Action::requeue(RESYNC));
    assert_eq!(h.api.calls(), vec!["delete method a", "create method c"]);
    let backend_id = h.api.backend_id("echo").unwrap();
    assert_eq!(h.api.method_names(Scope::Backend(backend_id)), vec!["b", "c"]);
}

#[tokio::test]
async fn test_swapped_mapping_rules_take_two_position_updates() {
    let h = Harness::new();
    let mut spec = backend_spec("echo");
    spec.mapping_rules.push(rule("GET", "/a", "hits"));
    spec.mapping_rules.push(rule("GET", "/b", "hits"));
    let resource = backend("echo", spec);
    h.backends.insert(resource.clone());
    pass(&h, resource).await;

    let resource = edited(&h, "echo", |b| b.spec.mapping_rules.reverse());
    h.api.reset_calls();
    pass(&h, resource).await;

    assert_eq!(h.api.mutations(), 2);
    let backend_id = h.api.backend_id("echo").unwrap();
    assert_eq!(
        h.api.rule_order(Scope::Backend(backend_id)),
        vec!["GET /b", "GET /a"]
    );
}

#[tokio::test]
async fn test_rule_inserted_in_the_middle_lands_at_its_index() {
    let h = Harness::new();
    let mut spec = backend_spec("echo");
    spec.mapping_rules.push(rule("GET", "/a", "hits"));
    spec.mapping_rules.push(rule("GET", "/c", "hits"));
    let resource = backend("echo", spec);
    h.backends.insert(resource.clone());
    pass(&h, resource).await;

    let resource = edited(&h, "echo", |b| {
        b.spec.mapping_rules.insert(1, rule("POST", "/b", "hits"));
    });
    h.api.reset_calls();
    pass(&h, resource).await;

    // c is compared against its snapshot position, so it gets a redundant move
    assert_eq!(
        h.api.calls(),
        vec!["create rule POST /b at 2", "update rule GET /c at 3"]
    );
    let backend_id = h.api.backend_id("echo").unwrap();
    assert_eq!(
        h.api.rule_order(Scope::Backend(backend_id)),
        vec!["GET /a", "POST /b", "GET /c"]
    );
}

#[tokio::test]
async fn test_invalid_spec_makes_no_remote_calls() {
    let h = Harness::new();
    let mut spec = backend_spec("echo");
    spec.private_base_url = "ftp://echo".to_string();
    let resource = backend("echo", spec);
    h.backends.insert(resource.clone());

    let action = pass(&h, resource).await;

    assert_eq!(action, Action::await_change());
    assert_eq!(h.api.mutations(), 0);
    assert!(h.api.backend_id("echo").is_none());

    let status = h.backends.get("echo").status.unwrap();
    assert!(status.conditions.is_true(ConditionType::Invalid));
    assert!(!status.is_ready());
    let message = status
        .conditions
        .get(ConditionType::Invalid)
        .and_then(|c| c.message.clone())
        .unwrap();
    assert!(message.contains("spec.privateBaseURL"), "{message}");
}

#[tokio::test]
async fn test_second_pass_is_steady() {
    let h = Harness::new();
    let mut spec = backend_spec("echo");
    spec.methods.insert("ping".to_string(), method("ping"));
    spec.metrics.insert("bytes".to_string(), metric("bytes"));
    spec.mapping_rules.push(rule("GET", "/ping", "ping"));
    spec.mapping_rules.push(rule("POST", "/upload", "bytes"));
    let resource = backend("echo", spec);
    h.backends.insert(resource.clone());
    pass(&h, resource).await;
    let writes = h.backends.status_writes();

    h.api.reset_calls();
    let action = pass(&h, h.backends.get("echo")).await;

    assert_eq!(action, Action::requeue(RESYNC));
    assert_eq!(h.api.mutations(), 0, "{:?}", h.api.calls());
    assert_eq!(h.backends.status_writes(), writes);
}

#[tokio::test]
async fn test_status_conflict_requeues_quickly() {
    let h = Harness::new();
    let resource = backend("echo", backend_spec("echo"));
    h.backends.insert(resource.clone());
    h.backends.fail_next_status_write();

    let action = pass(&h, resource).await;

    assert_eq!(action, Action::requeue(Duration::from_secs(1)));
    assert!(h.backends.get("echo").status.is_none());
}

#[tokio::test]
async fn test_defaults_and_finalizer_are_written_back_first() {
    let h = Harness::new();
    let mut resource = Backend::new("echo", backend_spec(""));
    resource.spec.name = "Echo API".to_string();
    resource.metadata.namespace = Some(NAMESPACE.to_string());
    h.backends.insert(resource.clone());

    let action = pass(&h, resource).await;

    assert_eq!(action, Action::await_change());
    assert_eq!(h.api.mutations(), 0);
    let stored = h.backends.get("echo");
    assert_eq!(stored.spec.system_name, "echoapi");
    assert!(stored.spec.metrics.contains_key("hits"));
    assert!(has_finalizer(&stored, BACKEND_FINALIZER));
}

#[tokio::test]
async fn test_dropped_backend_method_is_removed_from_product_limits() {
    let h = Harness::new();
    let mut spec = backend_spec("echo");
    spec.methods.insert("ping".to_string(), method("ping"));
    spec.methods.insert("pong".to_string(), method("pong"));
    let resource = backend("echo", spec);
    h.backends.insert(resource.clone());
    pass(&h, resource).await;

    let limit = |system_name: &str| LimitSpec {
        period: "day".to_string(),
        value: 10,
        metric_method_ref: MetricMethodRefSpec {
            system_name: system_name.to_string(),
            backend_system_name: Some("echo".to_string()),
        },
    };
    let mut store_spec = product_spec("store");
    store_spec.backend_usages.insert(
        "echo".to_string(),
        BackendUsageSpec {
            path: "/".to_string(),
        },
    );
    store_spec.application_plans = BTreeMap::from([(
        "basic".to_string(),
        ApplicationPlanSpec {
            limits: vec![limit("ping"), limit("pong")],
            ..Default::default()
        },
    )]);
    h.products.insert(product("store", store_spec));

    let resource = edited(&h, "echo", |b| {
        b.spec.methods.remove("pong");
    });
    pass(&h, resource).await;

    let limits = &h.products.get("store").spec.application_plans["basic"].limits;
    assert_eq!(limits, &vec![limit("ping")]);
    assert_eq!(h.products.replaces(), 1);
}

#[tokio::test]
async fn test_deletion_waits_for_products_then_deletes_remote() {
    let h = Harness::new();
    let resource = backend("echo", backend_spec("echo"));
    h.backends.insert(resource.clone());
    pass(&h, resource).await;
    let backend_id = h.api.backend_id("echo").unwrap();

    let mut store_spec = product_spec("store");
    store_spec.backend_usages.insert(
        "echo".to_string(),
        BackendUsageSpec {
            path: "/echo".to_string(),
        },
    );
    h.products.insert(product("store", store_spec));

    let mut deleting = h.backends.get("echo");
    mark_deleted(&mut deleting);
    h.backends.insert(deleting.clone());

    let action = pass(&h, deleting.clone()).await;
    assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    assert!(h.products.get("store").spec.backend_usages.is_empty());
    assert_eq!(h.api.backend_id("echo"), Some(backend_id));

    let action = pass(&h, deleting).await;
    assert_eq!(action, Action::await_change());
    assert!(h.api.backend_id("echo").is_none());
    assert!(!has_finalizer(&h.backends.get("echo"), BACKEND_FINALIZER));
}

#[tokio::test]
async fn test_deletion_without_provider_account_releases_finalizer() {
    let h = Harness::new();
    let resource = backend("echo", backend_spec("echo"));
    h.backends.insert(resource.clone());
    pass(&h, resource).await;

    h.accounts.missing.store(true, Ordering::SeqCst);
    let mut deleting = h.backends.get("echo");
    mark_deleted(&mut deleting);
    h.backends.insert(deleting.clone());
    h.api.reset_calls();

    let action = pass(&h, deleting).await;

    assert_eq!(action, Action::await_change());
    assert_eq!(h.api.mutations(), 0);
    assert!(!has_finalizer(&h.backends.get("echo"), BACKEND_FINALIZER));
}

#[tokio::test]
async fn test_missing_provider_account_is_a_failure() {
    let h = Harness::new();
    h.accounts.missing.store(true, Ordering::SeqCst);
    let resource = backend("echo", backend_spec("echo"));
    h.backends.insert(resource.clone());

    let result = reconcile_backend(Arc::new(resource), h.reconciler.clone()).await;

    assert!(result.is_err());
    let status = h.backends.get("echo").status.unwrap();
    assert!(status.conditions.is_true(ConditionType::Failed));
    assert!(!status.is_ready());
}
