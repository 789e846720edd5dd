//! Deployment records
//!
//! A [`Deployment`] is one concrete backend serving a model group. Its shape
//! follows the LiteLLM `model_list` entry: `model_name` (group key, not
//! unique), `litellm_params` (provider, credentials, limits, pricing) and
//! `model_info` (unique id, tier, team scoping, capability flags).
//!
//! Deployments are immutable once registered. Changes go through
//! [`DeploymentPatch`] and the registry swaps in a whole new record.

use super::config::secs_to_duration;
use super::keys::WindowKind;
use super::model_group::Capability;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Deployment identifier (unique within router)
pub type DeploymentId = String;

/// Provider assumed when neither `custom_llm_provider` nor a model prefix says otherwise
pub const DEFAULT_PROVIDER: &str = "openai";

/// Deployment - a concrete provider deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// User-facing model name / model group (e.g., "gpt-4")
    pub model_name: String,

    /// Provider call parameters and limits
    pub litellm_params: LitellmParams,

    /// Identity and descriptive metadata
    #[serde(default)]
    pub model_info: ModelInfo,
}

impl Deployment {
    /// Create a deployment with a generated id
    pub fn new(model_name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            litellm_params: LitellmParams::new(model),
            model_info: ModelInfo::default(),
        }
    }

    /// Set deployment id (builder pattern)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.model_info.id = id.into();
        self
    }

    /// Set call parameters (builder pattern)
    pub fn with_params(mut self, params: LitellmParams) -> Self {
        self.litellm_params = params;
        self
    }

    /// Set model info, keeping the current id when `info` carries an empty one
    pub fn with_model_info(mut self, info: ModelInfo) -> Self {
        let id = std::mem::take(&mut self.model_info.id);
        self.model_info = info;
        if self.model_info.id.is_empty() {
            self.model_info.id = id;
        }
        self
    }

    /// Unique deployment id
    pub fn id(&self) -> &str {
        &self.model_info.id
    }

    /// Provider name used for provider budgets and group info
    ///
    /// `custom_llm_provider` wins, then the `provider/` prefix of the model.
    pub fn provider(&self) -> &str {
        if let Some(provider) = self.litellm_params.custom_llm_provider.as_deref() {
            return provider;
        }
        match self.litellm_params.model.split_once('/') {
            Some((prefix, _)) if !prefix.is_empty() => prefix,
            _ => DEFAULT_PROVIDER,
        }
    }

    /// Configured limit for a usage window (None = unlimited)
    pub fn limit(&self, window: WindowKind) -> Option<u64> {
        let params = &self.litellm_params;
        match window {
            WindowKind::Tpm => params.tpm,
            WindowKind::Rpm => params.rpm,
            WindowKind::Tpd => params.tpd,
            WindowKind::Rpd => params.rpd,
        }
    }

    /// Weight for weighted random selection
    pub fn weight(&self) -> u32 {
        self.litellm_params.weight.unwrap_or(1)
    }

    /// Priority tier (lower is preferred)
    pub fn order(&self) -> u32 {
        self.litellm_params.order.unwrap_or(u32::MAX)
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.litellm_params.timeout.and_then(secs_to_duration)
    }

    /// Tags configured on this deployment
    pub fn tags(&self) -> &[String] {
        self.litellm_params.tags.as_deref().unwrap_or(&[])
    }

    /// Cost of a call in the deployment's currency
    pub fn call_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        let input = self.litellm_params.input_cost_per_token.unwrap_or(0.0);
        let output = self.litellm_params.output_cost_per_token.unwrap_or(0.0);
        prompt_tokens as f64 * input + completion_tokens as f64 * output
    }

    /// Combined per-token price, `None` when no pricing is configured
    pub fn unit_cost(&self) -> Option<f64> {
        let params = &self.litellm_params;
        match (params.input_cost_per_token, params.output_cost_per_token) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0.0) + output.unwrap_or(0.0)),
        }
    }

    /// Apply a structural patch; only present fields overwrite
    pub fn apply_patch(&mut self, patch: DeploymentPatch) {
        merge(&mut self.model_name, patch.model_name);
        if let Some(params) = patch.litellm_params {
            params.apply(&mut self.litellm_params);
        }
        if let Some(info) = patch.model_info {
            info.apply(&mut self.model_info);
        }
    }
}

/// Provider call parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LitellmParams {
    /// Provider model (e.g., "azure/gpt-4-turbo")
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_llm_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,

    /// Tokens per minute limit (None = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm: Option<u64>,
    /// Requests per minute limit (None = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u64>,
    /// Tokens per day limit (None = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpd: Option<u64>,
    /// Requests per day limit (None = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpd: Option<u64>,

    /// Per-attempt timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Client-side retries for the adapter; the router's own retries are policy driven
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Weight for weighted random selection (default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// Priority tier (lower value = higher priority)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    /// Maximum parallel requests (None = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_requests: Option<u32>,

    /// Spend ceiling per budget window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
    /// Budget window length, e.g. "1d" or "30d"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_duration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cost_per_token: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_cost_per_token: Option<f64>,

    /// Tags for tag-based routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// Params the router does not interpret; handed to the adapter as-is
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl LitellmParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Free or paid deployment tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Paid,
}

/// Deployment identity and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Unique id; generated when absent, integers are accepted and stringified
    #[serde(default = "generate_id", deserialize_with = "deserialize_id")]
    pub id: DeploymentId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    /// Underlying model used for cost tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,

    /// Team this deployment belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// Model name the team uses to reach this deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_public_model_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,

    #[serde(default)]
    pub supports_vision: bool,
    #[serde(default)]
    pub supports_function_calling: bool,
    #[serde(default)]
    pub supports_parallel_function_calling: bool,
    #[serde(default)]
    pub supports_web_search: bool,
    #[serde(default)]
    pub supports_url_context: bool,
    #[serde(default)]
    pub supports_reasoning: bool,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for ModelInfo {
    fn default() -> Self {
        Self {
            id: generate_id(),
            tier: None,
            base_model: None,
            team_id: None,
            team_public_model_name: None,
            max_input_tokens: None,
            max_output_tokens: None,
            supports_vision: false,
            supports_function_calling: false,
            supports_parallel_function_calling: false,
            supports_web_search: false,
            supports_url_context: false,
            supports_reasoning: false,
            extra: HashMap::new(),
        }
    }
}

impl ModelInfo {
    /// Whether this deployment advertises `capability`
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Vision => self.supports_vision,
            Capability::FunctionCalling => self.supports_function_calling,
            Capability::ParallelFunctionCalling => self.supports_parallel_function_calling,
            Capability::WebSearch => self.supports_web_search,
            Capability::UrlContext => self.supports_url_context,
            Capability::Reasoning => self.supports_reasoning,
        }
    }
}

fn generate_id() -> DeploymentId {
    uuid::Uuid::new_v4().to_string()
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<DeploymentId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(generate_id()),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(generate_id()),
        Some(serde_json::Value::String(s)) => Ok(s),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(serde::de::Error::custom(format!(
            "model_info.id must be a string or integer, got {}",
            other
        ))),
    }
}

/// Structural update for a registered deployment
///
/// `None` leaves the field untouched. The id cannot be changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentPatch {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub litellm_params: Option<LitellmParamsPatch>,
    #[serde(default)]
    pub model_info: Option<ModelInfoPatch>,
}

/// Patch for [`LitellmParams`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LitellmParamsPatch {
    pub model: Option<String>,
    pub custom_llm_provider: Option<String>,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub api_version: Option<String>,
    pub region_name: Option<String>,
    pub tpm: Option<u64>,
    pub rpm: Option<u64>,
    pub tpd: Option<u64>,
    pub rpd: Option<u64>,
    pub timeout: Option<f64>,
    pub max_retries: Option<u32>,
    pub weight: Option<u32>,
    pub order: Option<u32>,
    pub max_parallel_requests: Option<u32>,
    pub max_budget: Option<f64>,
    pub budget_duration: Option<String>,
    pub input_cost_per_token: Option<f64>,
    pub output_cost_per_token: Option<f64>,
    pub tags: Option<Vec<String>>,
    /// Merged key by key into `extra`
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl LitellmParamsPatch {
    fn apply(self, params: &mut LitellmParams) {
        merge(&mut params.model, self.model);
        merge_opt(&mut params.custom_llm_provider, self.custom_llm_provider);
        merge_opt(&mut params.api_key, self.api_key);
        merge_opt(&mut params.api_base, self.api_base);
        merge_opt(&mut params.api_version, self.api_version);
        merge_opt(&mut params.region_name, self.region_name);
        merge_opt(&mut params.tpm, self.tpm);
        merge_opt(&mut params.rpm, self.rpm);
        merge_opt(&mut params.tpd, self.tpd);
        merge_opt(&mut params.rpd, self.rpd);
        merge_opt(&mut params.timeout, self.timeout);
        merge_opt(&mut params.max_retries, self.max_retries);
        merge_opt(&mut params.weight, self.weight);
        merge_opt(&mut params.order, self.order);
        merge_opt(&mut params.max_parallel_requests, self.max_parallel_requests);
        merge_opt(&mut params.max_budget, self.max_budget);
        merge_opt(&mut params.budget_duration, self.budget_duration);
        merge_opt(&mut params.input_cost_per_token, self.input_cost_per_token);
        merge_opt(&mut params.output_cost_per_token, self.output_cost_per_token);
        merge_opt(&mut params.tags, self.tags);
        params.extra.extend(self.extra);
    }
}

/// Patch for [`ModelInfo`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInfoPatch {
    pub tier: Option<Tier>,
    pub base_model: Option<String>,
    pub team_id: Option<String>,
    pub team_public_model_name: Option<String>,
    pub max_input_tokens: Option<u64>,
    pub max_output_tokens: Option<u64>,
    pub supports_vision: Option<bool>,
    pub supports_function_calling: Option<bool>,
    pub supports_parallel_function_calling: Option<bool>,
    pub supports_web_search: Option<bool>,
    pub supports_url_context: Option<bool>,
    pub supports_reasoning: Option<bool>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ModelInfoPatch {
    fn apply(self, info: &mut ModelInfo) {
        merge_opt(&mut info.tier, self.tier);
        merge_opt(&mut info.base_model, self.base_model);
        merge_opt(&mut info.team_id, self.team_id);
        merge_opt(&mut info.team_public_model_name, self.team_public_model_name);
        merge_opt(&mut info.max_input_tokens, self.max_input_tokens);
        merge_opt(&mut info.max_output_tokens, self.max_output_tokens);
        merge(&mut info.supports_vision, self.supports_vision);
        merge(&mut info.supports_function_calling, self.supports_function_calling);
        merge(
            &mut info.supports_parallel_function_calling,
            self.supports_parallel_function_calling,
        );
        merge(&mut info.supports_web_search, self.supports_web_search);
        merge(&mut info.supports_url_context, self.supports_url_context);
        merge(&mut info.supports_reasoning, self.supports_reasoning);
        info.extra.extend(self.extra);
    }
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn merge_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_creation() {
        let deployment = Deployment::new("gpt-4", "azure/gpt-4-turbo").with_id("azure-east");

        assert_eq!(deployment.id(), "azure-east");
        assert_eq!(deployment.model_name, "gpt-4");
        assert_eq!(deployment.litellm_params.model, "azure/gpt-4-turbo");
        assert_eq!(deployment.weight(), 1);
        assert!(deployment.tags().is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Deployment::new("gpt-4", "gpt-4");
        let b = Deployment::new("gpt-4", "gpt-4");
        assert!(!a.id().is_empty());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_provider_resolution() {
        let prefixed = Deployment::new("g", "bedrock/claude-3");
        assert_eq!(prefixed.provider(), "bedrock");

        let bare = Deployment::new("g", "gpt-4o");
        assert_eq!(bare.provider(), DEFAULT_PROVIDER);

        let mut explicit = Deployment::new("g", "azure/gpt-4");
        explicit.litellm_params.custom_llm_provider = Some("openai".to_string());
        assert_eq!(explicit.provider(), "openai");
    }

    #[test]
    fn test_deserialize_model_list_entry() {
        let yaml = r#"
model_name: gpt-4
litellm_params:
  model: azure/gpt-4
  api_base: https://example.openai.azure.com
  tpm: 100000
  rpm: 500
  timeout: 30
  weight: 3
  deployment_region: eastus
model_info:
  id: 42
  tier: paid
  supports_vision: true
"#;
        let deployment: Deployment = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(deployment.id(), "42");
        assert_eq!(deployment.litellm_params.tpm, Some(100_000));
        assert_eq!(deployment.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(deployment.weight(), 3);
        assert_eq!(deployment.model_info.tier, Some(Tier::Paid));
        assert!(deployment.model_info.supports(Capability::Vision));
        assert_eq!(
            deployment.litellm_params.extra.get("deployment_region"),
            Some(&serde_json::Value::String("eastus".to_string()))
        );
    }

    #[test]
    fn test_missing_model_info_generates_id() {
        let yaml = "model_name: g\nlitellm_params:\n  model: gpt-4o\n";
        let deployment: Deployment = serde_yaml::from_str(yaml).unwrap();
        assert!(uuid::Uuid::parse_str(deployment.id()).is_ok());
    }

    #[test]
    fn test_call_cost() {
        let mut deployment = Deployment::new("g", "gpt-4o");
        assert_eq!(deployment.unit_cost(), None);
        deployment.litellm_params.input_cost_per_token = Some(0.001);
        deployment.litellm_params.output_cost_per_token = Some(0.002);

        let cost = deployment.call_cost(1000, 500);
        assert!((cost - 2.0).abs() < 1e-9);
        assert!((deployment.unit_cost().unwrap() - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_apply_patch_only_overwrites_present_fields() {
        let mut deployment = Deployment::new("gpt-4", "azure/gpt-4").with_id("d1");
        deployment.litellm_params.rpm = Some(100);
        deployment.litellm_params.tpm = Some(10_000);

        deployment.apply_patch(DeploymentPatch {
            litellm_params: Some(LitellmParamsPatch {
                rpm: Some(200),
                ..Default::default()
            }),
            model_info: Some(ModelInfoPatch {
                team_id: Some("team-a".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(deployment.id(), "d1");
        assert_eq!(deployment.model_name, "gpt-4");
        assert_eq!(deployment.litellm_params.rpm, Some(200));
        assert_eq!(deployment.litellm_params.tpm, Some(10_000));
        assert_eq!(deployment.model_info.team_id.as_deref(), Some("team-a"));
    }

    #[test]
    fn test_invalid_timeout_is_ignored() {
        let mut deployment = Deployment::new("g", "m");
        deployment.litellm_params.timeout = Some(0.0);
        assert_eq!(deployment.timeout(), None);
    }
}
