//! Concurrency integration tests
//!
//! Many requests racing for the same limits must never overshoot them.

#[cfg(test)]
mod tests {
    use crate::common::assertions::assert_no_deployments;
    use crate::common::{DeploymentFactory, TestAdapter, TestRequest};
    use futures::future::join_all;
    use litellm_router::core::router::{CounterStore, ExclusionReason, InMemoryCounterStore};
    use litellm_router::utils::{Clock, ManualClock};
    use litellm_router::{RequestContext, Router, RouterConfig};
    use std::sync::Arc;
    use std::time::Duration;

    const START_MS: u64 = 1_700_000_040_000;

    fn shared_backend() -> (Arc<dyn CounterStore>, Arc<dyn Clock>) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(START_MS));
        let store: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new(clock.clone()));
        (store, clock)
    }

    /// Test two routers on one store admit exactly the shared rpm limit
    #[tokio::test]
    async fn test_shared_store_rpm_limit() {
        let (store, clock) = shared_backend();
        let deployments = vec![DeploymentFactory::with_rpm("d1", "gpt-4", 10)];
        let first = Router::with_backend(
            RouterConfig::default(),
            deployments.clone(),
            store.clone(),
            clock.clone(),
        )
        .unwrap();
        let second =
            Router::with_backend(RouterConfig::default(), deployments, store, clock).unwrap();

        let ctx = RequestContext::new();
        let routers: Vec<&Router> = (0..15)
            .map(|i| if i % 2 == 0 { &first } else { &second })
            .collect();
        let selections = join_all(
            routers
                .iter()
                .map(|router| router.select_deployment("gpt-4", &ctx)),
        )
        .await;

        let mut admitted = 0;
        for (router, selection) in routers.iter().zip(selections) {
            match selection {
                Ok(selection) => {
                    admitted += 1;
                    router.release_deployment(selection.deployment.id());
                }
                Err(err) => {
                    let reasons = assert_no_deployments(err);
                    assert!(matches!(reasons[0], ExclusionReason::RateLimited { .. }));
                }
            }
        }
        assert_eq!(admitted, 10);
        assert_eq!(second.current_usage("d1").await.unwrap().rpm, 10);
    }

    /// Test max_parallel_requests caps concurrent calls to a deployment
    #[tokio::test]
    async fn test_max_parallel_requests() {
        let router = Router::new(
            RouterConfig::default(),
            vec![DeploymentFactory::with_max_parallel("d1", "gpt-4", 2)],
        )
        .unwrap();
        let adapter = TestAdapter::new().with_latency(Duration::from_millis(50));
        let request = TestRequest::new("hello");

        let results = join_all(
            (0..6).map(|_| router.execute(&adapter, "gpt-4", &request, RequestContext::new())),
        )
        .await;

        let mut succeeded = 0;
        for result in results {
            match result {
                Ok(_) => succeeded += 1,
                Err(err) => {
                    let reasons = assert_no_deployments(err);
                    assert_eq!(reasons, vec![ExclusionReason::ParallelLimit { max: 2 }]);
                }
            }
        }
        assert_eq!(succeeded, 2);
        assert_eq!(adapter.peak_in_flight(), 2);

        // Slots are released once calls finish
        assert_eq!(router.deployment_metrics("d1").in_flight, 0);
        assert!(
            router
                .execute(&adapter, "gpt-4", &request, RequestContext::new())
                .await
                .is_ok()
        );
    }

    /// Test concurrent successes all land in the usage counters
    #[tokio::test]
    async fn test_concurrent_usage_accounting() {
        let (store, clock) = shared_backend();
        let router = Router::with_backend(
            RouterConfig::default(),
            vec![
                DeploymentFactory::create("d1", "gpt-4"),
                DeploymentFactory::create("d2", "gpt-4"),
            ],
            store,
            clock,
        )
        .unwrap();
        let adapter = TestAdapter::new().with_latency(Duration::from_millis(5));
        let request = TestRequest::new("one two three");

        let results = join_all(
            (0..20).map(|_| router.execute(&adapter, "gpt-4", &request, RequestContext::new())),
        )
        .await;
        assert!(results.iter().all(|r| r.is_ok()));

        let d1 = router.current_usage("d1").await.unwrap();
        let d2 = router.current_usage("d2").await.unwrap();
        assert_eq!(d1.rpm + d2.rpm, 20);
        // 3 prompt + 5 completion tokens per call
        assert_eq!(d1.tpm + d2.tpm, 160);
    }
}
