//! Core router for model-group deployment selection and admission control
//!
//! This module picks one deployment of a model group per request, admits it
//! against time-windowed usage limits and spend budgets, and drives
//! retry/fallback/cooldown behavior on failure.
//!
//! ## Module Structure
//!
//! - `config` - Router policy and routing strategy definitions
//! - `context` - Per-request routing inputs
//! - `deployment` - Deployment records and structural patches
//! - `registry` - Lock-free deployment registry
//! - `model_group` - Aggregate model-group info and capabilities
//! - `keys` - Typed counter-key builders
//! - `store` - Shared counter store contract and in-memory backend
//! - `redis_store` - Redis backend (feature `redis`)
//! - `usage` - Usage tracker and admission
//! - `cooldown` - Failure counting and cooldowns
//! - `budget` - Spend budget windows
//! - `metrics` - Live per-deployment metrics
//! - `strategy_impl` - Routing strategy implementations
//! - `selection` - Candidate filtering and selection
//! - `execution` - Retry/fallback transition table
//! - `execute_impl` - Request execution with retry and fallback support
//! - `fallback` - Fallback maps and execution results
//! - `error` - Error taxonomy and router errors
//! - `router` - Router context object

pub mod budget;
pub mod config;
pub mod context;
pub mod cooldown;
pub mod deployment;
pub mod error;
pub mod execute_impl;
pub mod execution;
pub mod fallback;
pub mod keys;
pub mod metrics;
pub mod model_group;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod registry;
pub mod router;
pub mod selection;
pub mod store;
pub mod strategy_impl;
pub mod usage;

#[cfg(test)]
mod tests;

pub use budget::{BudgetLimit, BudgetScope, BudgetTracker, BudgetWindow};
pub use config::{
    AllowedFailsPolicy, ProviderBudgetConfig, RetryPolicy, RouterConfig, RouterSettingsUpdate,
    RoutingStrategy,
};
pub use context::RequestContext;
pub use cooldown::CooldownManager;
pub use deployment::{
    Deployment, DeploymentId, DeploymentPatch, LitellmParams, LitellmParamsPatch, ModelInfo,
    ModelInfoPatch, Tier,
};
pub use error::{AttemptRecord, ErrorKind, Exclusion, ExclusionReason, RouterError};
pub use execution::{AttemptState, Step};
pub use fallback::{ExecutionResult, FallbackMap, FallbackType};
pub use keys::{CounterKey, WindowKind};
pub use metrics::{LiveMetrics, MetricsSnapshot};
pub use model_group::{Capability, ModelGroupInfo};
#[cfg(feature = "redis")]
pub use redis_store::RedisCounterStore;
pub use registry::DeploymentRegistry;
pub use router::Router;
pub use selection::{MAX_DEPLOYMENTS_INSPECTED, Selection};
pub use store::{CounterStore, InMemoryCounterStore};
pub use usage::{Admission, AdmissionTicket, Denial, UsageSnapshot, UsageTracker};
