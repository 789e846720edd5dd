//! Execution implementation for Router
//!
//! This module contains `execute`, which drives one logical request through
//! selection, dispatch and the retry/fallback state machine, plus the
//! bookkeeping done after every attempt.

use super::budget::{BudgetLimit, BudgetScope};
use super::config::RouterConfig;
use super::context::RequestContext;
use super::deployment::Deployment;
use super::error::{AttemptRecord, ErrorKind, RouterError};
use super::execution::{AttemptState, Step, failure_kind, next_step};
use super::fallback::{ExecutionResult, FallbackType};
use super::router::Router;
use super::usage::AdmissionTicket;
use crate::core::providers::{ProviderAdapter, ProviderError, TokenUsage};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Provider name used for errors the router raises itself
const ROUTER_PROVIDER: &str = "router";

impl Router {
    /// Execute a request with full retry and fallback support
    ///
    /// # Flow
    ///
    /// 1. Select and admit a deployment of the current group
    /// 2. Call the adapter, bounded by the deployment timeout and the caller deadline
    /// 3. On success, reconcile usage and spend and return
    /// 4. On failure, record it for cooldown and follow [`next_step`]
    pub async fn execute<A>(
        &self,
        adapter: &A,
        model_group: &str,
        request: &A::Request,
        ctx: RequestContext,
    ) -> Result<ExecutionResult<A::Response>, RouterError>
    where
        A: ProviderAdapter,
    {
        let started = Instant::now();
        let config = self.config();
        let mut state = AttemptState::new(config.resolve_alias(model_group), &config);
        let mut failed_attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<ProviderError> = None;

        loop {
            if ctx.is_expired() {
                let error = last_error.unwrap_or_else(|| {
                    ProviderError::timeout(ROUTER_PROVIDER, "deadline expired before dispatch")
                });
                warn!("Deadline expired for {} after {} attempts", model_group, state.attempts());
                return Err(RouterError::Exhausted {
                    model: model_group.to_string(),
                    last_error: error,
                    attempts: failed_attempts,
                });
            }

            let group = state.current_group().to_string();
            let selection = match self.select_deployment(&group, &ctx).await {
                Ok(selection) => selection,
                Err(err @ (RouterError::NoDeploymentsAvailable { .. } | RouterError::ModelNotFound(_))) => {
                    if let Some(next) = state.next_fallback(&config, FallbackType::General) {
                        info!("No deployment for {}: falling back to {}", group, next);
                        state.apply(&Step::Fallback {
                            model_group: next,
                            fallback_type: FallbackType::General,
                        });
                        continue;
                    }
                    return Err(match (err, last_error) {
                        (RouterError::ModelNotFound(_), Some(last_error)) => RouterError::Exhausted {
                            model: model_group.to_string(),
                            last_error,
                            attempts: failed_attempts,
                        },
                        (err, _) => err,
                    });
                }
                Err(err) => return Err(err),
            };

            state.record_attempt();
            let deployment = selection.deployment.clone();
            let slot = self.metrics.hold(deployment.id());
            let attempt_started = Instant::now();
            let outcome = self
                .dispatch(adapter, &deployment, request, &ctx, &config)
                .await;
            let latency_us = attempt_started.elapsed().as_micros() as u64;
            drop(slot);

            match outcome {
                Ok(response) => {
                    self.record_success(&deployment, selection.ticket, response.usage, latency_us, &config)
                        .await;
                    return Ok(ExecutionResult {
                        result: response.body,
                        deployment_id: deployment.id().to_string(),
                        attempts: state.attempts(),
                        model_used: group,
                        used_fallback: state.used_fallback(),
                        latency_us: started.elapsed().as_micros() as u64,
                        failed_attempts,
                    });
                }
                Err(error) => {
                    let kind = failure_kind(&error);
                    self.record_failure(&deployment, selection.ticket, kind, &config)
                        .await;
                    failed_attempts.push(AttemptRecord {
                        model_group: group.clone(),
                        deployment_id: deployment.id().to_string(),
                        error_kind: kind,
                    });

                    let step = next_step(&state, &error, &config);
                    state.apply(&step);
                    match &step {
                        Step::Retry(kind) => {
                            debug!(
                                "Retrying {} after {} ({}/{})",
                                group,
                                kind,
                                state.retries_used(*kind),
                                config.retries_for(&group, *kind)
                            );
                            self.wait_before_retry(&config, &error, &ctx).await;
                        }
                        Step::Fallback {
                            model_group: next,
                            fallback_type,
                        } => {
                            info!(
                                "Falling back from {} to {} ({:?}) after {}",
                                group, next, fallback_type, kind
                            );
                        }
                        Step::Fail => {
                            warn!(
                                "Giving up on {} after {} attempts: {}",
                                model_group,
                                state.attempts(),
                                error
                            );
                            return Err(RouterError::Exhausted {
                                model: model_group.to_string(),
                                last_error: error,
                                attempts: failed_attempts,
                            });
                        }
                    }
                    last_error = Some(error);
                }
            }
        }
    }

    /// One adapter call bounded by the deployment timeout and the caller deadline
    async fn dispatch<A>(
        &self,
        adapter: &A,
        deployment: &Deployment,
        request: &A::Request,
        ctx: &RequestContext,
        config: &RouterConfig,
    ) -> Result<crate::core::providers::ProviderResponse<A::Response>, ProviderError>
    where
        A: ProviderAdapter,
    {
        let per_attempt = deployment
            .timeout()
            .or_else(|| config.default_timeout())
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let deadline = match (ctx.deadline, per_attempt) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let Some(deadline) = deadline else {
            return adapter.execute(deployment, request).await;
        };
        match tokio::time::timeout_at(deadline, adapter.execute(deployment, request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::timeout(
                deployment.provider(),
                format!("call to {} timed out", deployment.id()),
            )),
        }
    }

    async fn wait_before_retry(&self, config: &RouterConfig, error: &ProviderError, ctx: &RequestContext) {
        let hinted = error
            .retry_after()
            .map(Duration::from_secs)
            .unwrap_or_default()
            .min(config.max_retry_delay());
        let mut delay = config.retry_delay().max(hinted);
        if let Some(remaining) = ctx.remaining() {
            delay = delay.min(remaining);
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn record_success(
        &self,
        deployment: &Deployment,
        ticket: AdmissionTicket,
        usage: TokenUsage,
        latency_us: u64,
        config: &RouterConfig,
    ) {
        self.metrics.record_success(deployment.id(), latency_us);
        if let Err(e) = self.usage.record_actual(ticket, usage.total()).await {
            warn!("Failed to reconcile usage of {}: {}", deployment.id(), e);
        }

        let cost = deployment.call_cost(usage.prompt_tokens, usage.completion_tokens);
        if cost <= 0.0 {
            return;
        }
        if let Some(limit) = BudgetLimit::for_deployment(deployment) {
            let scope = BudgetScope::Deployment(deployment.id());
            if let Err(e) = self.budget.record_spend(scope, limit.duration, cost).await {
                warn!("Failed to record spend of {}: {}", deployment.id(), e);
            }
        }
        let provider = deployment.provider();
        if let Some(budget_config) = config.provider_budget_config.get(provider) {
            let limit = BudgetLimit::for_provider(provider, budget_config);
            let scope = BudgetScope::Provider(provider);
            if let Err(e) = self.budget.record_spend(scope, limit.duration, cost).await {
                warn!("Failed to record spend of provider {}: {}", provider, e);
            }
        }
    }

    async fn record_failure(
        &self,
        deployment: &Deployment,
        ticket: AdmissionTicket,
        kind: ErrorKind,
        config: &RouterConfig,
    ) {
        self.metrics.record_failure(deployment.id());
        if let Err(e) = self.usage.record_actual(ticket, 0).await {
            warn!("Failed to reconcile usage of {}: {}", deployment.id(), e);
        }
        if let Err(e) = self
            .cooldown
            .record_failure(deployment.id(), kind, config)
            .await
        {
            warn!("Failed to record failure of {}: {}", deployment.id(), e);
        }
    }
}
