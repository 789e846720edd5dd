//! Model group aggregates
//!
//! [`ModelGroupInfo`] is derived on demand by folding over every deployment
//! that shares a `model_name`. It is never stored as a source of truth.

use super::deployment::Deployment;
use crate::core::providers::ProviderAdapter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Optional model capabilities a request can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Vision,
    FunctionCalling,
    ParallelFunctionCalling,
    WebSearch,
    UrlContext,
    Reasoning,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Vision,
        Capability::FunctionCalling,
        Capability::ParallelFunctionCalling,
        Capability::WebSearch,
        Capability::UrlContext,
        Capability::Reasoning,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Vision => "vision",
            Capability::FunctionCalling => "function_calling",
            Capability::ParallelFunctionCalling => "parallel_function_calling",
            Capability::WebSearch => "web_search",
            Capability::UrlContext => "url_context",
            Capability::Reasoning => "reasoning",
        };
        f.write_str(name)
    }
}

/// Aggregate view of a model group
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelGroupInfo {
    pub model_group: String,
    /// Distinct providers, in registration order
    pub providers: Vec<String>,
    pub deployment_count: usize,
    pub max_input_tokens: Option<u64>,
    pub max_output_tokens: Option<u64>,
    pub input_cost_per_token: Option<f64>,
    pub output_cost_per_token: Option<f64>,
    /// Summed across deployments; `None` when no deployment sets the limit
    pub tpm: Option<u64>,
    pub rpm: Option<u64>,
    pub tpd: Option<u64>,
    pub rpd: Option<u64>,
    /// Capabilities offered by at least one deployment
    pub capabilities: BTreeSet<Capability>,
    /// Params supported by at least one deployment's adapter
    pub supported_params: BTreeSet<String>,
}

impl ModelGroupInfo {
    /// Fold `deployments` into a group aggregate
    pub fn from_deployments<'a>(
        model_group: &str,
        deployments: impl IntoIterator<Item = &'a Deployment>,
    ) -> Self {
        let mut info = ModelGroupInfo {
            model_group: model_group.to_string(),
            ..Default::default()
        };

        for deployment in deployments {
            info.deployment_count += 1;

            let provider = deployment.provider();
            if !info.providers.iter().any(|p| p == provider) {
                info.providers.push(provider.to_string());
            }

            let model_info = &deployment.model_info;
            let params = &deployment.litellm_params;
            info.max_input_tokens = max_opt(info.max_input_tokens, model_info.max_input_tokens);
            info.max_output_tokens = max_opt(info.max_output_tokens, model_info.max_output_tokens);
            info.input_cost_per_token =
                max_opt_f64(info.input_cost_per_token, params.input_cost_per_token);
            info.output_cost_per_token =
                max_opt_f64(info.output_cost_per_token, params.output_cost_per_token);
            info.tpm = sum_opt(info.tpm, params.tpm);
            info.rpm = sum_opt(info.rpm, params.rpm);
            info.tpd = sum_opt(info.tpd, params.tpd);
            info.rpd = sum_opt(info.rpd, params.rpd);

            for capability in Capability::ALL {
                if model_info.supports(capability) {
                    info.capabilities.insert(capability);
                }
            }
        }

        info
    }

    /// Same as [`from_deployments`](Self::from_deployments), plus the union of
    /// params `adapter` supports for each deployment's model
    pub fn with_supported_params<'a, A>(
        model_group: &str,
        deployments: impl IntoIterator<Item = &'a Deployment> + Clone,
        adapter: &A,
    ) -> Self
    where
        A: ProviderAdapter + ?Sized,
    {
        let mut info = Self::from_deployments(model_group, deployments.clone());
        for deployment in deployments {
            info.supported_params
                .extend(adapter.supported_params(&deployment.litellm_params.model));
        }
        info
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

fn max_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt_f64(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn sum_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.saturating_add(b)),
        (a, b) => a.or(b),
    }
}
