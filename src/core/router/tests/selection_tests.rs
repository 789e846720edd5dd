//! Deployment selection tests

use super::router_tests::{create_test_deployment, create_test_router, deployment_with};
use crate::core::router::budget::BudgetScope;
use crate::core::router::config::{ProviderBudgetConfig, RouterConfig, RoutingStrategy};
use crate::core::router::context::RequestContext;
use crate::core::router::deployment::Deployment;
use crate::core::router::error::{ExclusionReason, RouterError};
use crate::core::router::keys::WindowKind;
use crate::core::router::model_group::Capability;
use crate::core::router::router::Router;
use std::time::Duration;

const MONTH: Duration = Duration::from_secs(30 * 86_400);

fn tagged(id: &str, tags: &[&str]) -> Deployment {
    deployment_with(id, "gpt-4", |p| {
        p.tags = Some(tags.iter().map(|t| t.to_string()).collect());
    })
}

async fn selected_id(router: &Router, model_group: &str, ctx: &RequestContext) -> String {
    let selection = router.select_deployment(model_group, ctx).await.unwrap();
    let id = selection.deployment.id().to_string();
    router.release_deployment(&id);
    id
}

fn excluded_reasons(err: RouterError) -> Vec<(String, ExclusionReason)> {
    match err {
        RouterError::NoDeploymentsAvailable { excluded, .. } => excluded
            .into_iter()
            .map(|e| (e.deployment_id, e.reason))
            .collect(),
        other => panic!("expected NoDeploymentsAvailable, got {}", other),
    }
}

#[tokio::test]
async fn test_unknown_model_group() {
    let (router, _) = create_test_router(RouterConfig::default(), vec![create_test_deployment("d1", "gpt-4")]);
    let err = router
        .select_deployment("gpt-5", &RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::ModelNotFound(model) if model == "gpt-5"));
}

#[tokio::test]
async fn test_lower_order_tier_wins() {
    let primary = deployment_with("primary", "gpt-4", |p| {
        p.order = Some(1);
        p.rpm = Some(1);
    });
    let backup = deployment_with("backup", "gpt-4", |p| p.order = Some(2));
    let (router, _) = create_test_router(RouterConfig::default(), vec![backup, primary]);
    let ctx = RequestContext::new();

    assert_eq!(selected_id(&router, "gpt-4", &ctx).await, "primary");
    // Primary is out of rpm, so the next tier takes over
    assert_eq!(selected_id(&router, "gpt-4", &ctx).await, "backup");
}

#[tokio::test]
async fn test_rate_limited_exclusion_reports_retry_after() {
    let (router, _) = create_test_router(
        RouterConfig::default(),
        vec![deployment_with("d1", "gpt-4", |p| p.tpm = Some(100))],
    );
    let ctx = RequestContext::new().with_estimated_tokens(80);
    assert_eq!(selected_id(&router, "gpt-4", &ctx).await, "d1");

    match router.select_deployment("gpt-4", &ctx).await.unwrap_err() {
        RouterError::NoDeploymentsAvailable {
            excluded,
            retry_after,
            ..
        } => {
            assert!(matches!(
                excluded[0].reason,
                ExclusionReason::RateLimited {
                    window: WindowKind::Tpm,
                    limit: 100,
                    current: 80,
                    ..
                }
            ));
            assert_eq!(retry_after, Some(Duration::from_secs(60)));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_tag_routing() {
    let (router, _) = create_test_router(
        RouterConfig::default(),
        vec![
            tagged("premium", &["premium"]),
            tagged("fallback", &["default"]),
            tagged("untagged", &[]),
        ],
    );

    let premium = RequestContext::new().with_tag("premium");
    for _ in 0..10 {
        assert_eq!(selected_id(&router, "gpt-4", &premium).await, "premium");
    }

    let unknown = RequestContext::new().with_tag("batch");
    for _ in 0..10 {
        assert_eq!(selected_id(&router, "gpt-4", &unknown).await, "fallback");
    }
}

#[tokio::test]
async fn test_tag_mismatch_without_default() {
    let (router, _) = create_test_router(RouterConfig::default(), vec![tagged("premium", &["premium"])]);

    let err = router
        .select_deployment("gpt-4", &RequestContext::new().with_tag("batch"))
        .await
        .unwrap_err();
    let reasons = excluded_reasons(err);
    assert_eq!(reasons.len(), 1);
    assert_eq!(reasons[0].1, ExclusionReason::TagMismatch);

    // Untagged requests may use any deployment
    assert!(router
        .select_deployment("gpt-4", &RequestContext::new())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_team_deployments() {
    let mut team = create_test_deployment("team-d", "gpt-4-team-a");
    team.model_info.team_id = Some("team-a".to_string());
    team.model_info.team_public_model_name = Some("gpt-4".to_string());
    let shared = create_test_deployment("shared", "gpt-4");
    let (router, _) = create_test_router(RouterConfig::default(), vec![team, shared]);

    let team_ctx = RequestContext::new().with_team("team-a");
    assert_eq!(selected_id(&router, "gpt-4", &team_ctx).await, "team-d");
    assert_eq!(selected_id(&router, "gpt-4", &RequestContext::new()).await, "shared");

    let other_team = RequestContext::new().with_team("team-b");
    assert_eq!(selected_id(&router, "gpt-4", &other_team).await, "shared");

    let err = router
        .select_deployment("gpt-4-team-a", &other_team)
        .await
        .unwrap_err();
    assert_eq!(excluded_reasons(err)[0].1, ExclusionReason::TeamMismatch);
}

#[tokio::test]
async fn test_required_capabilities() {
    let mut vision = create_test_deployment("vision", "gpt-4");
    vision.model_info.supports_vision = true;
    let text = create_test_deployment("text", "gpt-4");
    let (router, _) = create_test_router(RouterConfig::default(), vec![text, vision]);

    let ctx = RequestContext::new().with_capability(Capability::Vision);
    for _ in 0..10 {
        assert_eq!(selected_id(&router, "gpt-4", &ctx).await, "vision");
    }

    let ctx = RequestContext::new().with_capability(Capability::Reasoning);
    let reasons = excluded_reasons(router.select_deployment("gpt-4", &ctx).await.unwrap_err());
    assert!(reasons
        .iter()
        .all(|(_, r)| *r == ExclusionReason::MissingCapability(Capability::Reasoning)));
}

#[tokio::test]
async fn test_max_parallel_requests() {
    let (router, _) = create_test_router(
        RouterConfig::default(),
        vec![deployment_with("d1", "gpt-4", |p| p.max_parallel_requests = Some(1))],
    );
    let ctx = RequestContext::new();

    let held = router.select_deployment("gpt-4", &ctx).await.unwrap();
    assert_eq!(router.deployment_metrics("d1").in_flight, 1);

    let reasons = excluded_reasons(router.select_deployment("gpt-4", &ctx).await.unwrap_err());
    assert_eq!(reasons[0].1, ExclusionReason::ParallelLimit { max: 1 });

    router.release_deployment(held.deployment.id());
    assert!(router.select_deployment("gpt-4", &ctx).await.is_ok());
}

#[tokio::test]
async fn test_deployment_budget_exclusion() {
    let capped = deployment_with("capped", "gpt-4", |p| p.max_budget = Some(1.0));
    let open = create_test_deployment("open", "gpt-4");
    let (router, _) = create_test_router(RouterConfig::default(), vec![capped, open]);

    router
        .budget
        .record_spend(BudgetScope::Deployment("capped"), MONTH, 1.0)
        .await
        .unwrap();
    assert!((router.deployment_spend("capped").await.unwrap() - 1.0).abs() < 1e-9);

    for _ in 0..10 {
        assert_eq!(selected_id(&router, "gpt-4", &RequestContext::new()).await, "open");
    }
}

#[tokio::test]
async fn test_provider_budget_exclusion() {
    let mut config = RouterConfig::default().with_strategy(RoutingStrategy::ProviderBudget);
    config.provider_budget_config.insert(
        "openai".to_string(),
        ProviderBudgetConfig {
            max_budget: 10.0,
            budget_duration: "1d".to_string(),
        },
    );
    let openai = create_test_deployment("openai-d", "gpt-4");
    let azure = deployment_with("azure-d", "gpt-4", |p| p.model = "azure/gpt-4".to_string());
    let (router, clock) = create_test_router(config, vec![openai, azure]);

    router
        .budget
        .record_spend(BudgetScope::Provider("openai"), Duration::from_secs(86_400), 12.5)
        .await
        .unwrap();
    assert!((router.provider_spend("openai").await.unwrap() - 12.5).abs() < 1e-9);

    for _ in 0..10 {
        assert_eq!(selected_id(&router, "gpt-4", &RequestContext::new()).await, "azure-d");
    }

    // The window resets after budget_duration
    clock.advance(Duration::from_secs(86_400));
    assert_eq!(router.provider_spend("openai").await.unwrap(), 0.0);
}

#[tokio::test]
async fn test_usage_based_routing_spreads_tokens() {
    let config = RouterConfig::default().with_strategy(RoutingStrategy::UsageBasedV2);
    let (router, _) = create_test_router(
        config,
        vec![
            deployment_with("d1", "gpt-4", |p| p.tpm = Some(1000)),
            deployment_with("d2", "gpt-4", |p| p.tpm = Some(1000)),
        ],
    );
    let ctx = RequestContext::new().with_estimated_tokens(800);

    assert_eq!(selected_id(&router, "gpt-4", &ctx).await, "d1");
    assert_eq!(selected_id(&router, "gpt-4", &ctx).await, "d2");

    let usage = router.current_usage("d1").await.unwrap();
    assert_eq!(usage.tpm, 800);
    assert_eq!(usage.rpm, 1);
}

#[tokio::test]
async fn test_cost_based_routing() {
    let config = RouterConfig::default().with_strategy(RoutingStrategy::CostBased);
    let (router, _) = create_test_router(
        config,
        vec![
            deployment_with("expensive", "gpt-4", |p| p.input_cost_per_token = Some(0.00003)),
            deployment_with("cheap", "gpt-4", |p| {
                p.input_cost_per_token = Some(0.000001);
                p.rpm = Some(1);
            }),
        ],
    );
    let ctx = RequestContext::new();

    assert_eq!(selected_id(&router, "gpt-4", &ctx).await, "cheap");
    // Cheap is out of rpm for this minute
    assert_eq!(selected_id(&router, "gpt-4", &ctx).await, "expensive");
}

#[tokio::test]
async fn test_least_busy_spreads_until_rpm_saturated() {
    let config = RouterConfig::default().with_strategy(RoutingStrategy::LeastBusy);
    let (router, _) = create_test_router(
        config,
        vec![
            deployment_with("d1", "gpt-4", |p| p.rpm = Some(2)),
            deployment_with("d2", "gpt-4", |p| p.rpm = Some(2)),
        ],
    );
    let ctx = RequestContext::new();

    // Selections keep their in-flight slots
    let mut picked = Vec::new();
    for _ in 0..4 {
        let selection = router.select_deployment("gpt-4", &ctx).await.unwrap();
        picked.push(selection.deployment.id().to_string());
    }
    assert_ne!(picked[0], picked[1]);
    for id in ["d1", "d2"] {
        assert_eq!(picked.iter().filter(|p| *p == id).count(), 2);
        assert_eq!(router.deployment_metrics(id).in_flight, 2);
    }

    let reasons = excluded_reasons(router.select_deployment("gpt-4", &ctx).await.unwrap_err());
    assert_eq!(reasons.len(), 2);
    for (_, reason) in reasons {
        assert!(matches!(
            reason,
            ExclusionReason::RateLimited {
                window: WindowKind::Rpm,
                limit: 2,
                current: 2,
                ..
            }
        ));
    }
}
