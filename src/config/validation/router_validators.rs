//! Router configuration validators
//!
//! This module provides validation implementations for the routing policy
//! (RouterConfig, ProviderBudgetConfig) and for deployments.

use super::trait_def::Validate;
use crate::core::router::config::MAX_DURATION_SECS;
use crate::core::router::{Deployment, ProviderBudgetConfig, RouterConfig};
use crate::utils::duration::parse_duration;
use tracing::debug;

impl Validate for RouterConfig {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating router configuration");

        validate_seconds("Cooldown time", self.cooldown_time, true)?;
        validate_seconds("Retry after", self.retry_after, true)?;
        validate_seconds("Max retry delay", self.max_retry_delay, true)?;

        if let Some(timeout) = self.timeout {
            validate_seconds("Router timeout", timeout, false)?;
        }

        validate_namespace("Router id", &self.router_id)?;

        for (provider, budget) in &self.provider_budget_config {
            budget
                .validate()
                .map_err(|e| format!("Provider budget '{}': {}", provider, e))?;
        }

        for (alias, target) in &self.model_group_alias {
            if alias == target {
                return Err(format!("Model group alias '{}' points to itself", alias));
            }
        }

        Ok(())
    }
}

impl Validate for ProviderBudgetConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.max_budget.is_finite() || self.max_budget < 0.0 {
            return Err("Max budget must be a non-negative number".to_string());
        }

        parse_duration(&self.budget_duration).map_err(|e| e.to_string())?;

        Ok(())
    }
}

impl Validate for Deployment {
    fn validate(&self) -> Result<(), String> {
        if self.model_name.is_empty() {
            return Err("Model name cannot be empty".to_string());
        }

        let params = &self.litellm_params;
        if params.model.is_empty() {
            return Err("Provider model cannot be empty".to_string());
        }

        validate_namespace("Deployment id", self.id())?;

        if let Some(timeout) = params.timeout {
            validate_seconds("Deployment timeout", timeout, false)?;
        }

        if let Some(max_budget) = params.max_budget {
            if !max_budget.is_finite() || max_budget < 0.0 {
                return Err("Max budget must be a non-negative number".to_string());
            }
        }

        if let Some(duration) = &params.budget_duration {
            parse_duration(duration).map_err(|e| e.to_string())?;
        }

        for (name, cost) in [
            ("Input cost per token", params.input_cost_per_token),
            ("Output cost per token", params.output_cost_per_token),
        ] {
            if let Some(cost) = cost {
                if !cost.is_finite() || cost < 0.0 {
                    return Err(format!("{} must be a non-negative number", name));
                }
            }
        }

        Ok(())
    }
}

/// Durations in seconds must be finite and at most [`MAX_DURATION_SECS`]
fn validate_seconds(what: &str, secs: f64, allow_zero: bool) -> Result<(), String> {
    if !secs.is_finite() || secs < 0.0 || (!allow_zero && secs == 0.0) {
        let bound = if allow_zero { "non-negative" } else { "positive" };
        return Err(format!("{} must be a {} number of seconds", what, bound));
    }

    if secs > MAX_DURATION_SECS {
        return Err(format!(
            "{} of {}s exceeds the maximum of {}s",
            what, secs, MAX_DURATION_SECS
        ));
    }

    Ok(())
}

/// Ids become counter key segments, so they cannot contain the separator
fn validate_namespace(what: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} cannot be empty", what));
    }

    if value.contains(':') {
        return Err(format!("{} cannot contain ':' ({})", what, value));
    }

    Ok(())
}
