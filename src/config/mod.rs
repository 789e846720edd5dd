//! Configuration management for the router
//!
//! This module handles loading, environment overrides and validation of the
//! router configuration: the model list, router settings, the optional Redis
//! counter store and logging.

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::Validate;

use crate::core::providers::ProviderAdapter;
use crate::core::router::{Deployment, RouterConfig, RoutingStrategy};
use crate::utils::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable overriding `redis.url` (and enabling Redis)
pub const ENV_REDIS_URL: &str = "LITELLM_ROUTER_REDIS_URL";
/// Environment variable overriding `router_settings.routing_strategy`
pub const ENV_ROUTING_STRATEGY: &str = "LITELLM_ROUTER_ROUTING_STRATEGY";
/// Environment variable overriding `router_settings.router_id`
pub const ENV_ROUTER_ID: &str = "LITELLM_ROUTER_ID";

/// Main configuration struct for the router
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployments, grouped by `model_name`
    pub model_list: Vec<Deployment>,
    /// Routing policy
    pub router_settings: RouterConfig,
    /// Shared counter store; in-memory when absent or disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
    /// Logging setup
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file, apply environment overrides and validate
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::Config(format!("Failed to read config file: {}", e)))?;

        let config = Self::parse(&content)?.apply_env_overrides()?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {} deployments",
            config.model_list.len()
        );
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    ///
    /// Environment overrides are not applied.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply `LITELLM_ROUTER_*` environment overrides
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_REDIS_URL).filter(|v| !v.is_empty()) {
            debug!("Redis URL overridden from {}", ENV_REDIS_URL);
            let mut redis = self.redis.take().unwrap_or_default();
            redis.url = url;
            redis.enabled = true;
            self.redis = Some(redis);
        }

        if let Some(strategy) = lookup(ENV_ROUTING_STRATEGY).filter(|v| !v.is_empty()) {
            self.router_settings.routing_strategy = strategy
                .parse::<RoutingStrategy>()
                .map_err(|e| GatewayError::Config(format!("{}: {}", ENV_ROUTING_STRATEGY, e)))?;
        }

        if let Some(router_id) = lookup(ENV_ROUTER_ID).filter(|v| !v.is_empty()) {
            self.router_settings.router_id = router_id;
        }

        Ok(self)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration");

        self.router_settings
            .validate()
            .map_err(|e| GatewayError::Config(format!("Router settings error: {}", e)))?;

        let mut seen = HashSet::new();
        for deployment in &self.model_list {
            deployment.validate().map_err(|e| {
                GatewayError::Config(format!(
                    "Deployment '{}' ({}) error: {}",
                    deployment.model_name,
                    deployment.id(),
                    e
                ))
            })?;
            if !seen.insert(deployment.id()) {
                return Err(GatewayError::Config(format!(
                    "Duplicate deployment id: {}",
                    deployment.id()
                )));
            }
        }

        if let Some(redis) = &self.redis {
            redis
                .validate()
                .map_err(|e| GatewayError::Config(format!("Redis config error: {}", e)))?;
        }

        self.logging
            .validate()
            .map_err(|e| GatewayError::Config(format!("Logging config error: {}", e)))?;

        self.warn_unknown_fallbacks();

        debug!("Configuration validation completed");
        Ok(())
    }

    fn warn_unknown_fallbacks(&self) {
        let groups: HashSet<&str> = self
            .model_list
            .iter()
            .map(|d| d.model_name.as_str())
            .collect();
        let settings = &self.router_settings;
        for map in [
            &settings.fallbacks,
            &settings.context_window_fallbacks,
            &settings.content_policy_fallbacks,
        ] {
            for target in map.iter().flat_map(|(_, targets)| targets) {
                if !groups.contains(target.as_str()) && !settings.model_group_alias.contains_key(target) {
                    warn!("Fallback target '{}' is not a configured model group", target);
                }
            }
        }
    }

    /// Report extra deployment params the adapter does not support
    ///
    /// Unsupported params are only warned about, never rejected.
    pub fn validate_params<A>(&self, adapter: &A) -> Vec<String>
    where
        A: ProviderAdapter + ?Sized,
    {
        let mut warnings = Vec::new();
        for deployment in &self.model_list {
            let supported = adapter.supported_params(&deployment.litellm_params.model);
            let mut unsupported: Vec<&String> = deployment
                .litellm_params
                .extra
                .keys()
                .filter(|param| !supported.contains(*param))
                .collect();
            unsupported.sort();
            for param in unsupported {
                let message = format!(
                    "Deployment {} ({}): param '{}' is not supported by model {}",
                    deployment.id(),
                    deployment.model_name,
                    param,
                    deployment.litellm_params.model
                );
                warn!("{}", message);
                warnings.push(message);
            }
        }
        warnings
    }

    /// Convert to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| GatewayError::Config(format!("Failed to serialize config to YAML: {}", e)))
    }
}
