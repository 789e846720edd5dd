//! Deployment selection logic
//!
//! This module contains the core routing logic: narrowing a model group to
//! the deployments that may take a request right now, picking one with the
//! configured strategy, and admitting the request against its usage limits.

use super::budget::{BudgetLimit, BudgetScope};
use super::config::{RouterConfig, RoutingStrategy};
use super::context::{DEFAULT_TAG, RequestContext};
use super::deployment::Deployment;
use super::error::{Exclusion, ExclusionReason, RouterError};
use super::keys::WindowKind;
use super::router::Router;
use super::strategy_impl::{self, CandidateMetrics};
use super::usage::{Admission, AdmissionTicket, UsageSnapshot};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Deployments inspected per selection; members beyond this are skipped
pub const MAX_DEPLOYMENTS_INSPECTED: usize = 5000;

/// An admitted deployment holding one in-flight slot
///
/// Release the slot with [`Router::release_deployment`] once the call ends.
#[derive(Debug)]
pub struct Selection {
    pub deployment: Arc<Deployment>,
    pub ticket: AdmissionTicket,
}

impl Router {
    /// Select and admit one deployment of `model_group`
    ///
    /// # Flow
    ///
    /// 1. Resolve aliases and team public names
    /// 2. Drop deployments failing team, tag or capability requirements
    /// 3. Drop deployments cooling down, at their parallel cap or over budget
    /// 4. Within the lowest `order` tier, pick with the routing strategy
    /// 5. Admit against usage limits; a denied pick is excluded and 4 repeats
    pub async fn select_deployment(&self, model_group: &str, ctx: &RequestContext) -> Result<Selection, RouterError> {
        let config = self.config();
        let group = config.resolve_alias(model_group);

        let mut members = self.group_members(group, ctx.team_id.as_deref());
        if members.is_empty() {
            return Err(RouterError::ModelNotFound(model_group.to_string()));
        }
        if members.len() > MAX_DEPLOYMENTS_INSPECTED {
            warn!(
                "Model group {} has {} deployments; inspecting the first {}",
                group,
                members.len(),
                MAX_DEPLOYMENTS_INSPECTED
            );
            members.truncate(MAX_DEPLOYMENTS_INSPECTED);
        }

        let mut excluded = Vec::new();
        let mut eligible = Vec::with_capacity(members.len());
        let tag_matched = !ctx.tags.is_empty() && members.iter().any(|d| has_any_tag(d, &ctx.tags));
        let mut provider_spend: HashMap<String, Option<ExclusionReason>> = HashMap::new();

        for deployment in members {
            let reason = match static_exclusion(&deployment, ctx, tag_matched) {
                Some(reason) => Some(reason),
                None => {
                    self.dynamic_exclusion(&deployment, &config, &mut provider_spend)
                        .await?
                }
            };
            match reason {
                Some(reason) => {
                    debug!("Excluding {}: {}", deployment.id(), reason);
                    excluded.push(Exclusion {
                        deployment_id: deployment.id().to_string(),
                        reason,
                    });
                }
                None => eligible.push(deployment),
            }
        }

        let tiers: BTreeSet<u32> = eligible.iter().map(|d| d.order()).collect();
        for order in tiers {
            let mut tier: Vec<Arc<Deployment>> = eligible
                .iter()
                .filter(|d| d.order() == order)
                .cloned()
                .collect();

            while !tier.is_empty() {
                let candidates = self
                    .candidate_metrics(&tier, config.routing_strategy)
                    .await?;
                let index = {
                    let mut rng = rand::thread_rng();
                    strategy_impl::select(config.routing_strategy, &candidates, &mut rng)
                };
                let Some(index) = index else { break };
                let pick = tier.remove(index);

                match self.usage.try_admit(&pick, ctx.estimated_tokens).await? {
                    Admission::Admitted(ticket) => {
                        let max_parallel = pick.litellm_params.max_parallel_requests;
                        if !self.metrics.try_begin(pick.id(), max_parallel) {
                            // Lost the last slot to a concurrent caller
                            self.usage.record_actual(ticket, 0).await?;
                            excluded.push(Exclusion {
                                deployment_id: pick.id().to_string(),
                                reason: ExclusionReason::ParallelLimit {
                                    max: max_parallel.unwrap_or_default(),
                                },
                            });
                            continue;
                        }
                        debug!(
                            "Selected deployment {} for {} ({})",
                            pick.id(),
                            group,
                            config.routing_strategy
                        );
                        return Ok(Selection {
                            deployment: pick,
                            ticket,
                        });
                    }
                    Admission::Denied(denial) => {
                        excluded.push(Exclusion {
                            deployment_id: pick.id().to_string(),
                            reason: ExclusionReason::RateLimited {
                                window: denial.window,
                                limit: denial.limit,
                                current: denial.current,
                                retry_after: denial.retry_after,
                            },
                        });
                    }
                }
            }
        }

        let retry_after = excluded.iter().filter_map(|e| e.reason.retry_after()).min();
        warn!(
            "No deployments available for {} ({} excluded)",
            model_group,
            excluded.len()
        );
        Err(RouterError::NoDeploymentsAvailable {
            model: model_group.to_string(),
            excluded,
            retry_after,
        })
    }

    /// Give back the in-flight slot taken by a selection
    pub fn release_deployment(&self, deployment_id: &str) {
        self.metrics.end(deployment_id);
    }

    fn group_members(&self, group: &str, team_id: Option<&str>) -> Vec<Arc<Deployment>> {
        if let Some(team_id) = team_id {
            let team_members = self.registry.deployments_for_team_model(team_id, group);
            if !team_members.is_empty() {
                return team_members;
            }
        }
        self.registry.deployments_for_group(group)
    }

    async fn dynamic_exclusion(
        &self,
        deployment: &Deployment,
        config: &RouterConfig,
        provider_spend: &mut HashMap<String, Option<ExclusionReason>>,
    ) -> Result<Option<ExclusionReason>, RouterError> {
        let remaining = self.cooldown.cooldown_remaining(deployment.id()).await?;
        if !remaining.is_zero() {
            return Ok(Some(ExclusionReason::CoolingDown { remaining }));
        }

        if let Some(max) = deployment.litellm_params.max_parallel_requests {
            if self.metrics.in_flight(deployment.id()) >= max {
                return Ok(Some(ExclusionReason::ParallelLimit { max }));
            }
        }

        if let Some(limit) = BudgetLimit::for_deployment(deployment) {
            let scope = BudgetScope::Deployment(deployment.id());
            if let Some(spent) = self.budget.exceeded(scope, &limit).await? {
                return Ok(Some(ExclusionReason::BudgetExceeded {
                    spent,
                    max_budget: limit.max_budget,
                }));
            }
        }

        let provider = deployment.provider();
        if let Some(budget_config) = config.provider_budget_config.get(provider) {
            if !provider_spend.contains_key(provider) {
                let limit = BudgetLimit::for_provider(provider, budget_config);
                let reason = self
                    .budget
                    .exceeded(BudgetScope::Provider(provider), &limit)
                    .await?
                    .map(|spent| ExclusionReason::ProviderBudgetExceeded {
                        provider: provider.to_string(),
                        spent,
                        max_budget: limit.max_budget,
                    });
                provider_spend.insert(provider.to_string(), reason);
            }
            if let Some(reason) = provider_spend.get(provider).cloned().flatten() {
                return Ok(Some(reason));
            }
        }

        Ok(None)
    }

    async fn candidate_metrics(
        &self,
        tier: &[Arc<Deployment>],
        strategy: RoutingStrategy,
    ) -> Result<Vec<CandidateMetrics>, RouterError> {
        let needs_usage = matches!(
            strategy,
            RoutingStrategy::UsageBased | RoutingStrategy::UsageBasedV2
        );
        let mut candidates = Vec::with_capacity(tier.len());
        for deployment in tier {
            let live = self.metrics.snapshot(deployment.id());
            let usage = if needs_usage {
                self.usage.current_usage(deployment.id()).await?
            } else {
                UsageSnapshot::default()
            };
            candidates.push(CandidateMetrics {
                weight: deployment.weight(),
                in_flight: live.in_flight,
                avg_latency_us: live.avg_latency_us,
                latency_samples: live.latency_samples,
                usage,
                limits: WindowKind::ALL.map(|w| deployment.limit(w)),
                unit_cost: deployment.unit_cost(),
            });
        }
        Ok(candidates)
    }
}

fn has_any_tag(deployment: &Deployment, tags: &[String]) -> bool {
    deployment.tags().iter().any(|t| tags.contains(t))
}

/// Requirements that depend only on the request and the deployment record
fn static_exclusion(deployment: &Deployment, ctx: &RequestContext, tag_matched: bool) -> Option<ExclusionReason> {
    if let Some(owner) = deployment.model_info.team_id.as_deref() {
        if ctx.team_id.as_deref() != Some(owner) {
            return Some(ExclusionReason::TeamMismatch);
        }
    }

    if !ctx.tags.is_empty() {
        let accepted = if tag_matched {
            has_any_tag(deployment, &ctx.tags)
        } else {
            deployment.tags().iter().any(|t| t == DEFAULT_TAG)
        };
        if !accepted {
            return Some(ExclusionReason::TagMismatch);
        }
    }

    ctx.required_capabilities
        .iter()
        .find(|cap| !deployment.model_info.supports(**cap))
        .map(|cap| ExclusionReason::MissingCapability(*cap))
}
