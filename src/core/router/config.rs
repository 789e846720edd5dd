//! Router configuration types
//!
//! This module defines configuration types for the router including
//! routing strategies, retry and cooldown policies, fallbacks and budgets.
//! A [`RouterConfig`] is immutable once handed to a router; changes are made
//! by building a new one (directly or through [`RouterSettingsUpdate`]) and
//! swapping it in whole.

use super::error::ErrorKind;
use super::fallback::{FallbackMap, FallbackType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Budget window used when `max_budget` is set without `budget_duration`
pub const DEFAULT_BUDGET_DURATION: &str = "30d";

/// Upper bound for every duration setting given in seconds (one year)
pub const MAX_DURATION_SECS: f64 = 365.0 * 86_400.0;

/// Routing strategy enumeration
///
/// Defines how the router selects which deployment to use when multiple deployments
/// are available for the same model.
///
/// ## Strategies
///
/// - **SimpleShuffle**: Weighted random selection (default)
/// - **LeastBusy**: Fewest in-flight requests, ties broken by shuffle
/// - **LatencyBased**: Lowest latency moving average
/// - **UsageBased**: Most tpm headroom
/// - **UsageBasedV2**: Most normalized headroom across tpm/rpm/tpd/rpd
/// - **CostBased**: Lowest configured per-token cost
/// - **ProviderBudget**: Drop providers over budget, then shuffle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoutingStrategy {
    #[default]
    #[serde(rename = "simple-shuffle")]
    SimpleShuffle,
    #[serde(rename = "least-busy")]
    LeastBusy,
    #[serde(rename = "latency-based-routing")]
    LatencyBased,
    #[serde(rename = "usage-based-routing")]
    UsageBased,
    #[serde(rename = "usage-based-routing-v2")]
    UsageBasedV2,
    #[serde(rename = "cost-based-routing")]
    CostBased,
    #[serde(rename = "provider-budget-routing")]
    ProviderBudget,
}

impl RoutingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingStrategy::SimpleShuffle => "simple-shuffle",
            RoutingStrategy::LeastBusy => "least-busy",
            RoutingStrategy::LatencyBased => "latency-based-routing",
            RoutingStrategy::UsageBased => "usage-based-routing",
            RoutingStrategy::UsageBasedV2 => "usage-based-routing-v2",
            RoutingStrategy::CostBased => "cost-based-routing",
            RoutingStrategy::ProviderBudget => "provider-budget-routing",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "simple-shuffle" => Ok(RoutingStrategy::SimpleShuffle),
            "least-busy" => Ok(RoutingStrategy::LeastBusy),
            "latency-based-routing" => Ok(RoutingStrategy::LatencyBased),
            "usage-based-routing" => Ok(RoutingStrategy::UsageBased),
            "usage-based-routing-v2" => Ok(RoutingStrategy::UsageBasedV2),
            "cost-based-routing" => Ok(RoutingStrategy::CostBased),
            "provider-budget-routing" => Ok(RoutingStrategy::ProviderBudget),
            other => Err(format!("Unknown routing strategy: {}", other)),
        }
    }
}

/// Retries per error kind
///
/// Unset kinds fall back to the router default: `num_retries` for
/// transient kinds, zero for the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default, alias = "BadRequestErrorRetries", skip_serializing_if = "Option::is_none")]
    pub bad_request: Option<u32>,
    #[serde(default, alias = "AuthenticationErrorRetries", skip_serializing_if = "Option::is_none")]
    pub authentication: Option<u32>,
    #[serde(default, alias = "TimeoutErrorRetries", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, alias = "RateLimitErrorRetries", skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
    #[serde(
        default,
        alias = "ContentPolicyViolationErrorRetries",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_policy_violation: Option<u32>,
    #[serde(
        default,
        alias = "InternalServerErrorRetries",
        skip_serializing_if = "Option::is_none"
    )]
    pub internal_server_error: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<u32>,
}

impl RetryPolicy {
    pub fn get(&self, kind: ErrorKind) -> Option<u32> {
        *kind_slot(self.slots(), kind)
    }

    /// Set the retry count for one kind (builder pattern)
    pub fn with(mut self, kind: ErrorKind, retries: u32) -> Self {
        *kind_slot(self.slots_mut(), kind) = Some(retries);
        self
    }

    fn slots(&self) -> [&Option<u32>; 7] {
        [
            &self.bad_request,
            &self.authentication,
            &self.timeout,
            &self.rate_limit,
            &self.content_policy_violation,
            &self.internal_server_error,
            &self.other,
        ]
    }

    fn slots_mut(&mut self) -> [&mut Option<u32>; 7] {
        [
            &mut self.bad_request,
            &mut self.authentication,
            &mut self.timeout,
            &mut self.rate_limit,
            &mut self.content_policy_violation,
            &mut self.internal_server_error,
            &mut self.other,
        ]
    }
}

/// Failures tolerated per error kind before a deployment cools down
///
/// Unset kinds use the router-wide `allowed_fails`, and never cool down
/// when that is unset too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedFailsPolicy {
    #[serde(default, alias = "BadRequestErrorAllowedFails", skip_serializing_if = "Option::is_none")]
    pub bad_request: Option<u32>,
    #[serde(
        default,
        alias = "AuthenticationErrorAllowedFails",
        skip_serializing_if = "Option::is_none"
    )]
    pub authentication: Option<u32>,
    #[serde(default, alias = "TimeoutErrorAllowedFails", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, alias = "RateLimitErrorAllowedFails", skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
    #[serde(
        default,
        alias = "ContentPolicyViolationErrorAllowedFails",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_policy_violation: Option<u32>,
    #[serde(
        default,
        alias = "InternalServerErrorAllowedFails",
        skip_serializing_if = "Option::is_none"
    )]
    pub internal_server_error: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<u32>,
}

impl AllowedFailsPolicy {
    pub fn get(&self, kind: ErrorKind) -> Option<u32> {
        *kind_slot(
            [
                &self.bad_request,
                &self.authentication,
                &self.timeout,
                &self.rate_limit,
                &self.content_policy_violation,
                &self.internal_server_error,
                &self.other,
            ],
            kind,
        )
    }

    /// Set the threshold for one kind (builder pattern)
    pub fn with(mut self, kind: ErrorKind, allowed_fails: u32) -> Self {
        *kind_slot(
            [
                &mut self.bad_request,
                &mut self.authentication,
                &mut self.timeout,
                &mut self.rate_limit,
                &mut self.content_policy_violation,
                &mut self.internal_server_error,
                &mut self.other,
            ],
            kind,
        ) = Some(allowed_fails);
        self
    }
}

/// Pick the slot for `kind` out of a per-kind array laid out like [`ErrorKind::ALL`]
fn kind_slot<T>(slots: [T; 7], kind: ErrorKind) -> T {
    let index = ErrorKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(ErrorKind::ALL.len() - 1);
    let [a, b, c, d, e, f, g] = slots;
    match index {
        0 => a,
        1 => b,
        2 => c,
        3 => d,
        4 => e,
        5 => f,
        _ => g,
    }
}

/// Spend ceiling for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBudgetConfig {
    pub max_budget: f64,
    #[serde(default = "default_budget_duration")]
    pub budget_duration: String,
}

fn default_budget_duration() -> String {
    DEFAULT_BUDGET_DURATION.to_string()
}

/// Router configuration
///
/// ## Defaults
///
/// - `routing_strategy`: simple-shuffle
/// - `num_retries`: 2 (transient kinds only)
/// - `retry_after`: 0 (no delay between retries)
/// - `max_retry_delay`: 60 seconds (cap on provider retry-after hints)
/// - `allowed_fails`: unset (kinds without a policy never cool down)
/// - `cooldown_time`: 5 seconds
/// - `timeout`: unset (per-deployment timeouts and the caller deadline apply)
/// - `max_fallbacks`: 5
/// - `router_id`: "default"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Routing strategy to use for deployment selection
    pub routing_strategy: RoutingStrategy,

    /// Retries for transient kinds when no policy says otherwise
    pub num_retries: u32,

    /// Minimum seconds to wait between retries
    pub retry_after: f64,

    /// Longest provider retry-after hint honored before a retry, in seconds
    pub max_retry_delay: f64,

    /// Retries per error kind
    pub retry_policy: RetryPolicy,

    /// Per-group retry overrides, consulted before `retry_policy`
    pub model_group_retry_policy: HashMap<String, RetryPolicy>,

    /// Failures per error kind before cooldown
    pub allowed_fails_policy: AllowedFailsPolicy,

    /// Threshold for kinds missing from `allowed_fails_policy`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_fails: Option<u32>,

    /// Cooldown duration in seconds
    pub cooldown_time: f64,

    /// Default per-attempt timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    /// Maximum number of fallback groups tried per request
    pub max_fallbacks: u32,

    /// General fallbacks, used once retries are exhausted
    pub fallbacks: FallbackMap,

    /// Fallbacks used only for context-window errors
    pub context_window_fallbacks: FallbackMap,

    /// Fallbacks used only for content-policy violations
    pub content_policy_fallbacks: FallbackMap,

    /// Alias -> model group
    pub model_group_alias: HashMap<String, String>,

    /// Provider -> spend ceiling
    pub provider_budget_config: HashMap<String, ProviderBudgetConfig>,

    /// Namespace for shared counter keys; routers sharing a store and an id share limits
    pub router_id: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            routing_strategy: RoutingStrategy::SimpleShuffle,
            num_retries: 2,
            retry_after: 0.0,
            max_retry_delay: 60.0,
            retry_policy: RetryPolicy::default(),
            model_group_retry_policy: HashMap::new(),
            allowed_fails_policy: AllowedFailsPolicy::default(),
            allowed_fails: None,
            cooldown_time: 5.0,
            timeout: None,
            max_fallbacks: 5,
            fallbacks: FallbackMap::default(),
            context_window_fallbacks: FallbackMap::default(),
            content_policy_fallbacks: FallbackMap::default(),
            model_group_alias: HashMap::new(),
            provider_budget_config: HashMap::new(),
            router_id: "default".to_string(),
        }
    }
}

impl RouterConfig {
    /// Set routing strategy (builder pattern)
    pub fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.routing_strategy = strategy;
        self
    }

    /// Set retry policy (builder pattern)
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set allowed-fails policy (builder pattern)
    pub fn with_allowed_fails_policy(mut self, policy: AllowedFailsPolicy) -> Self {
        self.allowed_fails_policy = policy;
        self
    }

    /// Set cooldown duration (builder pattern)
    pub fn with_cooldown_time(mut self, cooldown: Duration) -> Self {
        self.cooldown_time = cooldown.as_secs_f64();
        self
    }

    /// Set general fallbacks (builder pattern)
    pub fn with_fallbacks(mut self, fallbacks: FallbackMap) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Set context-window fallbacks (builder pattern)
    pub fn with_context_window_fallbacks(mut self, fallbacks: FallbackMap) -> Self {
        self.context_window_fallbacks = fallbacks;
        self
    }

    /// Set content-policy fallbacks (builder pattern)
    pub fn with_content_policy_fallbacks(mut self, fallbacks: FallbackMap) -> Self {
        self.content_policy_fallbacks = fallbacks;
        self
    }

    /// Retry budget for `kind` within `model_group`
    pub fn retries_for(&self, model_group: &str, kind: ErrorKind) -> u32 {
        self.model_group_retry_policy
            .get(model_group)
            .and_then(|policy| policy.get(kind))
            .or_else(|| self.retry_policy.get(kind))
            .unwrap_or(if kind.is_transient() { self.num_retries } else { 0 })
    }

    /// Retries of every kind combined within `model_group`
    ///
    /// Budgets are spent per kind, so a group failing with mixed kinds can
    /// use up to this many retries before it falls back.
    pub fn total_retries_for(&self, model_group: &str) -> u32 {
        ErrorKind::ALL
            .iter()
            .map(|kind| self.retries_for(model_group, *kind))
            .fold(0u32, u32::saturating_add)
    }

    /// Failures of `kind` tolerated before cooldown, `None` = never cool down
    pub fn allowed_fails_for(&self, kind: ErrorKind) -> Option<u32> {
        self.allowed_fails_policy.get(kind).or(self.allowed_fails)
    }

    pub fn cooldown_duration(&self) -> Duration {
        secs_to_duration(self.cooldown_time).unwrap_or_default()
    }

    pub fn retry_delay(&self) -> Duration {
        secs_to_duration(self.retry_after).unwrap_or_default()
    }

    /// Cap applied to provider retry-after hints
    pub fn max_retry_delay(&self) -> Duration {
        secs_to_duration(self.max_retry_delay).unwrap_or_default()
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.timeout.and_then(secs_to_duration)
    }

    /// Fallback groups of a given type for `model_group`
    pub fn fallbacks_for(&self, model_group: &str, fallback_type: FallbackType) -> &[String] {
        let map = match fallback_type {
            FallbackType::General => &self.fallbacks,
            FallbackType::ContextWindow => &self.context_window_fallbacks,
            FallbackType::ContentPolicy => &self.content_policy_fallbacks,
        };
        map.for_group(model_group)
    }

    /// Resolve a model group alias
    pub fn resolve_alias<'a>(&'a self, model: &'a str) -> &'a str {
        self.model_group_alias
            .get(model)
            .map(String::as_str)
            .unwrap_or(model)
    }
}

/// Positive seconds as a duration, clamped to [`MAX_DURATION_SECS`]
pub(crate) fn secs_to_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs.min(MAX_DURATION_SECS)).ok()
    } else {
        None
    }
}

/// Partial router settings; present fields replace the current values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettingsUpdate {
    pub routing_strategy: Option<RoutingStrategy>,
    pub num_retries: Option<u32>,
    pub retry_after: Option<f64>,
    pub max_retry_delay: Option<f64>,
    pub retry_policy: Option<RetryPolicy>,
    pub model_group_retry_policy: Option<HashMap<String, RetryPolicy>>,
    pub allowed_fails_policy: Option<AllowedFailsPolicy>,
    pub allowed_fails: Option<u32>,
    pub cooldown_time: Option<f64>,
    pub timeout: Option<f64>,
    pub max_fallbacks: Option<u32>,
    pub fallbacks: Option<FallbackMap>,
    pub context_window_fallbacks: Option<FallbackMap>,
    pub content_policy_fallbacks: Option<FallbackMap>,
    pub model_group_alias: Option<HashMap<String, String>>,
    pub provider_budget_config: Option<HashMap<String, ProviderBudgetConfig>>,
}

impl RouterSettingsUpdate {
    /// Produce a new config with this update applied to `base`
    pub fn apply_to(self, base: &RouterConfig) -> RouterConfig {
        let mut next = base.clone();
        macro_rules! overwrite {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field { next.$field = value; })*
            };
        }
        overwrite!(
            routing_strategy,
            num_retries,
            retry_after,
            max_retry_delay,
            retry_policy,
            model_group_retry_policy,
            allowed_fails_policy,
            cooldown_time,
            max_fallbacks,
            fallbacks,
            context_window_fallbacks,
            content_policy_fallbacks,
            model_group_alias,
            provider_budget_config,
        );
        if self.allowed_fails.is_some() {
            next.allowed_fails = self.allowed_fails;
        }
        if self.timeout.is_some() {
            next.timeout = self.timeout;
        }
        next
    }
}
