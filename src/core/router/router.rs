//! Router core structure
//!
//! The [`Router`] is the explicit context object owning the deployment
//! registry, usage tracker, cooldown manager, budget tracker, live metrics
//! and the current policy. Every routing operation goes through it; there is
//! no global mutable state.

use super::budget::{BudgetScope, BudgetTracker};
use super::config::{RouterConfig, RouterSettingsUpdate};
use super::cooldown::CooldownManager;
use super::deployment::{Deployment, DeploymentPatch};
use super::error::RouterError;
use super::metrics::{LiveMetrics, MetricsSnapshot};
use super::model_group::ModelGroupInfo;
use super::registry::DeploymentRegistry;
use super::store::{CounterStore, InMemoryCounterStore};
use super::usage::{UsageSnapshot, UsageTracker};
use crate::config::Validate;
use crate::core::providers::ProviderAdapter;
use crate::utils::time::{Clock, SystemClock};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Interval between expired-counter sweeps
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Model-group router
///
/// Reads (selection, lookups) are lock-free. Deployment and settings changes
/// publish whole new snapshots, so concurrent requests see either the old or
/// the new state.
pub struct Router {
    pub(crate) registry: DeploymentRegistry,
    pub(crate) config: ArcSwap<RouterConfig>,
    pub(crate) store: Arc<dyn CounterStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) usage: UsageTracker,
    pub(crate) cooldown: CooldownManager,
    pub(crate) budget: BudgetTracker,
    pub(crate) metrics: LiveMetrics,
    router_id: String,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("router_id", &self.router_id)
            .field("deployments", &self.registry.len())
            .field("routing_strategy", &self.config.load().routing_strategy)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Create a router with an in-memory counter store and the system clock
    pub fn new(config: RouterConfig, deployments: Vec<Deployment>) -> Result<Self, RouterError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryCounterStore::new(clock.clone()));
        Self::with_backend(config, deployments, store, clock)
    }

    /// Create a router on an explicit counter store and clock
    ///
    /// Routers sharing a store and a `router_id` share usage limits,
    /// cooldowns and budgets.
    pub fn with_backend(
        config: RouterConfig,
        deployments: Vec<Deployment>,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RouterError> {
        config.validate().map_err(RouterError::Config)?;
        for deployment in &deployments {
            validate_deployment(deployment)?;
        }
        let registry = DeploymentRegistry::from_deployments(deployments)?;
        let router_id = config.router_id.clone();
        info!(
            "Router {} starting with {} deployments ({})",
            router_id,
            registry.len(),
            config.routing_strategy
        );
        Ok(Self {
            registry,
            usage: UsageTracker::new(store.clone(), clock.clone(), router_id.clone()),
            cooldown: CooldownManager::new(store.clone(), clock.clone(), router_id.clone()),
            budget: BudgetTracker::new(store.clone(), clock.clone(), router_id.clone()),
            metrics: LiveMetrics::new(),
            config: ArcSwap::from_pointee(config),
            store,
            clock,
            router_id,
        })
    }

    /// Build a router from a loaded [`Config`](crate::config::Config)
    ///
    /// Uses Redis for shared counters when `redis` is configured and enabled.
    pub async fn from_config(config: &crate::config::Config) -> Result<Self, RouterError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn CounterStore> = match &config.redis {
            #[cfg(feature = "redis")]
            Some(redis) if redis.enabled => {
                Arc::new(super::redis_store::RedisCounterStore::connect(redis).await?)
            }
            #[cfg(not(feature = "redis"))]
            Some(redis) if redis.enabled => {
                return Err(RouterError::Config(
                    "redis is configured but the `redis` feature is disabled".to_string(),
                ));
            }
            _ => Arc::new(InMemoryCounterStore::new(clock.clone())),
        };
        Self::with_backend(
            config.router_settings.clone(),
            config.model_list.clone(),
            store,
            clock,
        )
    }

    /// Namespace of this router's shared counters
    pub fn router_id(&self) -> &str {
        &self.router_id
    }

    /// Current policy
    pub fn config(&self) -> Arc<RouterConfig> {
        self.config.load_full()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ========== Deployment Management ==========

    /// Register a deployment
    pub fn add_deployment(&self, deployment: Deployment) -> Result<Arc<Deployment>, RouterError> {
        validate_deployment(&deployment)?;
        self.registry.add(deployment)
    }

    /// Apply a structural patch to a deployment
    pub fn update_deployment(&self, id: &str, patch: DeploymentPatch) -> Result<Arc<Deployment>, RouterError> {
        self.registry.update(id, patch)
    }

    /// Unregister a deployment and drop its counters, cooldown, budget and metrics
    pub async fn remove_deployment(&self, id: &str) -> Result<Arc<Deployment>, RouterError> {
        let removed = self.registry.remove(id)?;
        self.purge_state(id).await;
        Ok(removed)
    }

    /// Replace the whole model list atomically
    pub async fn set_model_list(&self, deployments: Vec<Deployment>) -> Result<(), RouterError> {
        for deployment in &deployments {
            validate_deployment(deployment)?;
        }
        let dropped = self.registry.set_model_list(deployments)?;
        for id in &dropped {
            self.purge_state(id).await;
        }
        info!(
            "Model list replaced: {} deployments, {} dropped",
            self.registry.len(),
            dropped.len()
        );
        Ok(())
    }

    pub fn get_deployment(&self, id: &str) -> Option<Arc<Deployment>> {
        self.registry.get(id)
    }

    /// Deployments serving a model group (aliases resolved)
    pub fn deployments_for_group(&self, model_group: &str) -> Vec<Arc<Deployment>> {
        let config = self.config();
        self.registry
            .deployments_for_group(config.resolve_alias(model_group))
    }

    pub fn list_deployments(&self) -> Vec<Arc<Deployment>> {
        self.registry.list_deployments()
    }

    /// Model group names in registration order
    pub fn list_models(&self) -> Vec<String> {
        self.registry.list_groups()
    }

    /// Aggregate info for a model group (aliases resolved)
    pub fn model_group_info(&self, model_group: &str) -> Option<ModelGroupInfo> {
        let config = self.config();
        self.registry.group_info(config.resolve_alias(model_group))
    }

    /// Aggregate info including the params `adapter` supports
    pub fn model_group_info_with_params<A: ProviderAdapter>(
        &self,
        model_group: &str,
        adapter: &A,
    ) -> Option<ModelGroupInfo> {
        let config = self.config();
        let name = config.resolve_alias(model_group);
        let members = self.registry.deployments_for_group(name);
        if members.is_empty() {
            return None;
        }
        Some(ModelGroupInfo::with_supported_params(
            name,
            members.iter().map(|d| d.as_ref()),
            adapter,
        ))
    }

    // ========== Live State ==========

    /// Usage in the current window buckets
    pub async fn current_usage(&self, deployment_id: &str) -> Result<UsageSnapshot, RouterError> {
        Ok(self.usage.current_usage(deployment_id).await?)
    }

    pub async fn is_cooling_down(&self, deployment_id: &str) -> Result<bool, RouterError> {
        Ok(self.cooldown.is_cooling_down(deployment_id).await?)
    }

    pub async fn cooldown_remaining(&self, deployment_id: &str) -> Result<Duration, RouterError> {
        Ok(self.cooldown.cooldown_remaining(deployment_id).await?)
    }

    /// Spend in the deployment's open budget window
    pub async fn deployment_spend(&self, deployment_id: &str) -> Result<f64, RouterError> {
        Ok(self
            .budget
            .current_spend(BudgetScope::Deployment(deployment_id))
            .await?)
    }

    /// Spend in the provider's open budget window
    pub async fn provider_spend(&self, provider: &str) -> Result<f64, RouterError> {
        Ok(self
            .budget
            .current_spend(BudgetScope::Provider(provider))
            .await?)
    }

    pub fn deployment_metrics(&self, deployment_id: &str) -> MetricsSnapshot {
        self.metrics.snapshot(deployment_id)
    }

    // ========== Settings ==========

    /// Merge present fields into a copy of the policy and swap it in
    ///
    /// The merged policy is validated first; on error the current one stays.
    pub fn update_settings(&self, update: RouterSettingsUpdate) -> Result<(), RouterError> {
        update
            .clone()
            .apply_to(&self.config.load())
            .validate()
            .map_err(RouterError::Config)?;
        // Fields validate independently, so merging onto a newer policy stays valid
        self.config.rcu(|current| update.clone().apply_to(current));
        info!("Router {} settings updated", self.router_id);
        Ok(())
    }

    /// Swap in a whole new policy
    ///
    /// The counter namespace is fixed at construction; a different
    /// `router_id` in `config` is ignored.
    pub fn replace_settings(&self, mut config: RouterConfig) -> Result<(), RouterError> {
        if config.router_id != self.router_id {
            warn!(
                "Ignoring router_id change from {} to {}",
                self.router_id, config.router_id
            );
            config.router_id = self.router_id.clone();
        }
        config.validate().map_err(RouterError::Config)?;
        self.config.store(Arc::new(config));
        info!("Router {} settings replaced", self.router_id);
        Ok(())
    }

    // ========== Maintenance ==========

    /// Periodically purge expired counters from the store
    pub fn start_maintenance_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                match self.store.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => debug!("Purged {} expired counters", purged),
                    Err(e) => warn!("Counter purge failed: {}", e),
                }
            }
        })
    }

    async fn purge_state(&self, id: &str) {
        self.metrics.remove(id);
        let (usage, cooldown, budget) = futures::join!(
            self.usage.purge(id),
            self.cooldown.purge(id),
            self.budget.purge(BudgetScope::Deployment(id)),
        );
        if let Err(e) = usage {
            warn!("Failed to purge usage of {}: {}", id, e);
        }
        if let Err(e) = cooldown {
            warn!("Failed to purge cooldown of {}: {}", id, e);
        }
        if let Err(e) = budget {
            warn!("Failed to purge budget of {}: {}", id, e);
        }
    }
}

fn validate_deployment(deployment: &Deployment) -> Result<(), RouterError> {
    deployment
        .validate()
        .map_err(|e| RouterError::Config(format!("Deployment {}: {}", deployment.id(), e)))
}
