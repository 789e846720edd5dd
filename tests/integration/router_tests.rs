//! Router integration tests
//!
//! Tests routing, retries and fallbacks through `Router::execute`.

#[cfg(test)]
mod tests {
    use crate::common::assertions::{assert_exhausted, assert_no_deployments};
    use crate::common::{DeploymentFactory, TestAdapter, TestRequest};
    use litellm_router::core::router::{AllowedFailsPolicy, ExclusionReason};
    use litellm_router::{
        ErrorKind, FallbackMap, ProviderError, RequestContext, Router, RouterConfig, RoutingStrategy,
    };

    fn fallbacks(from: &str, to: &str) -> FallbackMap {
        FallbackMap::new().with(from, vec![to.to_string()])
    }

    /// Test a healthy group serves requests
    #[tokio::test]
    async fn test_execute_round_trip() {
        let router = Router::new(
            RouterConfig::default(),
            vec![DeploymentFactory::create("gpt4-a", "gpt-4")],
        )
        .unwrap();
        let adapter = TestAdapter::new();

        let result = router
            .execute(&adapter, "gpt-4", &TestRequest::new("hello there"), RequestContext::new())
            .await
            .unwrap();

        assert_eq!(result.result, "gpt4-a: hello there");
        assert_eq!(result.attempts, 1);
        assert!(!result.used_fallback);

        let usage = router.current_usage("gpt4-a").await.unwrap();
        assert_eq!(usage.rpm, 1);
        assert_eq!(usage.tpm, 7);
    }

    /// Test that a broken group falls back to its configured alternative
    #[tokio::test]
    async fn test_fallback_to_another_group() {
        let config = RouterConfig::default().with_fallbacks(fallbacks("gpt-4", "claude-3"));
        let router = Router::new(
            config,
            vec![
                DeploymentFactory::create("gpt4-a", "gpt-4"),
                DeploymentFactory::create("claude-a", "claude-3"),
            ],
        )
        .unwrap();
        let adapter = TestAdapter::new().failing(
            "gpt4-a",
            ProviderError::service_unavailable("openai", "503 from upstream"),
        );

        let result = router
            .execute(&adapter, "gpt-4", &TestRequest::new("hi"), RequestContext::new())
            .await
            .unwrap();

        // Two retries on gpt-4, then the fallback
        assert_eq!(adapter.calls_to("gpt4-a"), 3);
        assert_eq!(result.deployment_id, "claude-a");
        assert_eq!(result.model_used, "claude-3");
        assert!(result.used_fallback);
        assert_eq!(result.failed_attempts.len(), 3);
        assert!(result
            .failed_attempts
            .iter()
            .all(|a| a.error_kind == ErrorKind::InternalServerError));
    }

    /// Test that retries move off a deployment once it cools down
    #[tokio::test]
    async fn test_cooldown_steers_retries_to_healthy_deployment() {
        let config = RouterConfig {
            routing_strategy: RoutingStrategy::LatencyBased,
            allowed_fails_policy: AllowedFailsPolicy::default().with(ErrorKind::RateLimit, 1),
            cooldown_time: 30.0,
            ..Default::default()
        };
        // Latency routing picks the first deployment while both are cold
        let router = Router::new(
            config,
            vec![
                DeploymentFactory::create("limited", "gpt-4"),
                DeploymentFactory::create("healthy", "gpt-4"),
            ],
        )
        .unwrap();
        let adapter = TestAdapter::new().failing("limited", ProviderError::rate_limit("openai", None));

        let result = router
            .execute(&adapter, "gpt-4", &TestRequest::new("hi"), RequestContext::new())
            .await
            .unwrap();

        assert_eq!(adapter.calls(), vec!["limited", "healthy"]);
        assert_eq!(result.deployment_id, "healthy");
        assert!(router.is_cooling_down("limited").await.unwrap());
        assert!(router.cooldown_remaining("limited").await.unwrap().as_secs() <= 30);
    }

    /// Test that non-transient errors are surfaced without retries
    #[tokio::test]
    async fn test_authentication_error_is_not_retried() {
        let router = Router::new(
            RouterConfig::default(),
            vec![DeploymentFactory::create("gpt4-a", "gpt-4")],
        )
        .unwrap();
        let adapter =
            TestAdapter::new().failing("gpt4-a", ProviderError::authentication("openai", "bad key"));

        let err = router
            .execute(&adapter, "gpt-4", &TestRequest::new("hi"), RequestContext::new())
            .await
            .unwrap_err();

        assert_eq!(assert_exhausted(err), 1);
        assert_eq!(adapter.calls().len(), 1);
    }

    /// Test alias resolution in execute
    #[tokio::test]
    async fn test_alias_is_resolved() {
        let mut config = RouterConfig::default();
        config
            .model_group_alias
            .insert("smart".to_string(), "gpt-4".to_string());
        let router = Router::new(config, vec![DeploymentFactory::create("gpt4-a", "gpt-4")]).unwrap();

        let result = router
            .execute(&TestAdapter::new(), "smart", &TestRequest::new("hi"), RequestContext::new())
            .await
            .unwrap();
        assert_eq!(result.model_used, "gpt-4");
    }

    /// Test rpm exhaustion surfaces NoDeploymentsAvailable with a wait hint
    #[tokio::test]
    async fn test_rpm_exhaustion() {
        let router = Router::new(
            RouterConfig::default(),
            vec![DeploymentFactory::with_rpm("gpt4-a", "gpt-4", 2)],
        )
        .unwrap();
        let adapter = TestAdapter::new();
        let request = TestRequest::new("hi");

        for _ in 0..2 {
            router
                .execute(&adapter, "gpt-4", &request, RequestContext::new())
                .await
                .unwrap();
        }

        let err = router
            .execute(&adapter, "gpt-4", &request, RequestContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("try again in"));
        let reasons = assert_no_deployments(err);
        assert!(matches!(reasons[0], ExclusionReason::RateLimited { limit: 2, .. }));
    }

    /// Test unknown model groups
    #[tokio::test]
    async fn test_unknown_model() {
        let router = Router::new(RouterConfig::default(), vec![]).unwrap();
        let err = router
            .execute(&TestAdapter::new(), "gpt-4", &TestRequest::new("hi"), RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Model not found: gpt-4");
    }

    /// Test live deployment changes are visible to the next request
    #[tokio::test]
    async fn test_deployments_can_change_at_runtime() {
        let router = Router::new(RouterConfig::default(), vec![]).unwrap();
        router
            .add_deployment(DeploymentFactory::create("gpt4-a", "gpt-4"))
            .unwrap();

        let adapter = TestAdapter::new();
        let request = TestRequest::new("hi");
        assert!(router
            .execute(&adapter, "gpt-4", &request, RequestContext::new())
            .await
            .is_ok());

        router.remove_deployment("gpt4-a").await.unwrap();
        assert!(router
            .execute(&adapter, "gpt-4", &request, RequestContext::new())
            .await
            .is_err());
        assert_eq!(router.current_usage("gpt4-a").await.unwrap().rpm, 0);
    }
}
