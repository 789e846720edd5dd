//! Counter store failure handling, driven through a mocked store

use super::router_tests::{ScriptedAdapter, Outcome, START_MS, create_test_deployment, deployment_with};
use crate::core::router::config::RouterConfig;
use crate::core::router::context::RequestContext;
use crate::core::router::error::RouterError;
use crate::core::router::router::Router;
use crate::core::router::store::MockCounterStore;
use crate::core::router::usage::UsageTracker;
use crate::utils::error::GatewayError;
use crate::utils::time::ManualClock;
use std::sync::Arc;

fn router_on(store: MockCounterStore, deployment: crate::core::router::Deployment) -> Router {
    let clock = Arc::new(ManualClock::new(START_MS));
    Router::with_backend(RouterConfig::default(), vec![deployment], Arc::new(store), clock).unwrap()
}

#[tokio::test]
async fn test_store_error_fails_selection() {
    let mut store = MockCounterStore::new();
    store
        .expect_get()
        .returning(|_| Err(GatewayError::store("connection reset")));

    let router = router_on(store, create_test_deployment("d1", "gpt-4"));
    let err = router
        .select_deployment("gpt-4", &RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Store(msg) if msg.contains("connection reset")));
}

#[tokio::test]
async fn test_admission_error_rolls_back_applied_windows() {
    let mut store = MockCounterStore::new();
    store
        .expect_increment_and_check()
        .times(1)
        .returning(|_, amount, _, _| Ok((amount, true)));
    store
        .expect_increment()
        .withf(|_, amount, _| *amount == 1)
        .times(1)
        .returning(|_, _, _| Err(GatewayError::store("timeout")));
    store
        .expect_increment()
        .withf(|_, amount, _| *amount == -10)
        .times(1)
        .returning(|_, _, _| Ok(0));

    let clock = Arc::new(ManualClock::new(START_MS));
    let tracker = UsageTracker::new(Arc::new(store), clock, "test");
    let deployment = deployment_with("d1", "gpt-4", |p| p.tpm = Some(100));

    assert!(tracker.try_admit(&deployment, 10).await.is_err());
}

#[tokio::test]
async fn test_bookkeeping_errors_do_not_fail_the_call() {
    let mut store = MockCounterStore::new();
    store.expect_get().returning(|_| Ok(None));
    // Reconciling 100 estimated tokens down to 10 actual
    store
        .expect_increment()
        .withf(|_, amount, _| *amount == -90)
        .returning(|_, _, _| Err(GatewayError::store("read only replica")));
    store
        .expect_increment()
        .returning(|_, amount, _| Ok(amount));

    let router = router_on(store, create_test_deployment("d1", "gpt-4"));
    let adapter = ScriptedAdapter::new().script("d1", vec![Outcome::Ok(10)]);

    let result = router
        .execute(&adapter, "gpt-4", &(), RequestContext::new().with_estimated_tokens(100))
        .await
        .unwrap();
    assert_eq!(result.deployment_id, "d1");
    assert_eq!(router.deployment_metrics("d1").in_flight, 0);
}
