//! Configuration integration tests
//!
//! Loads YAML configs from disk and runs requests through the resulting router.

#[cfg(test)]
mod tests {
    use crate::common::{TestAdapter, TestRequest};
    use litellm_router::config::RedisConfig;
    use litellm_router::core::router::Capability;
    use litellm_router::{Config, RequestContext, Router, RoutingStrategy};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ROUTER_YAML: &str = r#"
model_list:
  - model_name: gpt-4
    litellm_params:
      model: azure/gpt-4-eu
      api_base: https://eu.example.com
      api_key: sk-test
      rpm: 100
      order: 1
      temperature: 0.2
      logit_bias: {}
    model_info:
      id: azure-eu
      supports_vision: true
  - model_name: gpt-4
    litellm_params:
      model: openai/gpt-4
      seed: 7
      order: 2
  - model_name: gpt-3.5-turbo
    litellm_params:
      model: openai/gpt-3.5-turbo
      input_cost_per_token: 0.0000005
      output_cost_per_token: 0.0000015

router_settings:
  routing_strategy: latency-based-routing
  num_retries: 1
  cooldown_time: 10
  fallbacks:
    - gpt-4: ["gpt-3.5-turbo"]
  model_group_alias:
    gpt4: gpt-4
  provider_budget_config:
    azure:
      max_budget: 50
      budget_duration: 1d

redis:
  enabled: false

logging:
  level: warn
"#;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    /// Test loading a full config and routing through it
    #[tokio::test]
    async fn test_router_from_config_file() {
        let file = write_config(ROUTER_YAML);
        let config = Config::from_file(file.path()).await.unwrap();

        assert_eq!(
            config.router_settings.routing_strategy,
            RoutingStrategy::LatencyBased
        );
        assert_eq!(config.redis, Some(RedisConfig { enabled: false, ..Default::default() }));

        let router = Router::from_config(&config).await.unwrap();
        assert_eq!(router.list_models(), vec!["gpt-4", "gpt-3.5-turbo"]);

        let result = router
            .execute(&TestAdapter::new(), "gpt4", &TestRequest::new("hi"), RequestContext::new())
            .await
            .unwrap();
        // Lowest order tier
        assert_eq!(result.deployment_id, "azure-eu");
    }

    /// Test model group info reflects the configured deployments
    #[tokio::test]
    async fn test_model_group_info_from_config() {
        let config = Config::from_yaml_str(ROUTER_YAML).unwrap();
        let router = Router::from_config(&config).await.unwrap();

        let info = router
            .model_group_info_with_params("gpt-4", &TestAdapter::new())
            .unwrap();
        assert_eq!(info.deployment_count, 2);
        assert_eq!(info.providers, vec!["azure", "openai"]);
        assert_eq!(info.rpm, Some(100));
        assert!(info.supports(Capability::Vision));
        assert!(info.supported_params.contains("seed"));

        let cheap = router.model_group_info("gpt-3.5-turbo").unwrap();
        assert_eq!(cheap.input_cost_per_token, Some(0.0000005));
    }

    /// Test unsupported extra params produce warnings, not errors
    #[test]
    fn test_validate_params_reports_unsupported() {
        let config = Config::from_yaml_str(ROUTER_YAML).unwrap();
        let warnings = config.validate_params(&TestAdapter::new());

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("logit_bias"));
        assert!(warnings[0].contains("azure-eu"));
    }

    /// Test invalid configs are rejected with a config error
    #[test]
    fn test_invalid_configs_rejected() {
        let bad_budget = ROUTER_YAML.replace("budget_duration: 1d", "budget_duration: someday");
        assert!(Config::from_yaml_str(&bad_budget).is_err());

        let bad_strategy = ROUTER_YAML.replace("latency-based-routing", "round-robin");
        assert!(Config::from_yaml_str(&bad_strategy).is_err());

        let negative_cooldown = ROUTER_YAML.replace("cooldown_time: 10", "cooldown_time: -1");
        assert!(Config::from_yaml_str(&negative_cooldown).is_err());
    }

    /// Test settings from one file applied to a running router
    #[tokio::test]
    async fn test_replace_settings_from_config() {
        let config = Config::from_yaml_str(ROUTER_YAML).unwrap();
        let router = Router::from_config(&config).await.unwrap();

        let updated = Config::from_yaml_str(
            &ROUTER_YAML.replace("latency-based-routing", "least-busy"),
        )
        .unwrap();
        router.replace_settings(updated.router_settings).unwrap();

        assert_eq!(router.config().routing_strategy, RoutingStrategy::LeastBusy);
        assert_eq!(router.config().fallbacks.for_group("gpt-4").len(), 1);
    }
}
