//! Spend budget windows
//!
//! A budget window opens on the first recorded spend and lasts
//! `budget_duration`. Spend accumulates in the shared store as integer
//! micro-units; both the spend key and the start-time key expire when the
//! window ends, which resets the budget.

use super::config::{DEFAULT_BUDGET_DURATION, ProviderBudgetConfig};
use super::deployment::Deployment;
use super::keys::{CounterKey, budget_prefix, budget_spend_key, budget_start_key};
use super::store::CounterStore;
use crate::utils::duration::parse_duration;
use crate::utils::error::Result;
use crate::utils::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Whose spend a window tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetScope<'a> {
    Deployment(&'a str),
    Provider(&'a str),
}

impl BudgetScope<'_> {
    fn subject(&self) -> String {
        match self {
            BudgetScope::Deployment(id) => format!("deployment:{}", id),
            BudgetScope::Provider(name) => format!("provider:{}", name),
        }
    }
}

/// One open spend-accounting period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetWindow {
    /// Window start, epoch seconds
    pub budget_start: u64,
    pub spend_key: CounterKey,
    pub start_time_key: CounterKey,
    /// Seconds until the window resets
    pub ttl_seconds: u64,
}

/// A spend ceiling and the window it applies to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetLimit {
    pub max_budget: f64,
    pub duration: Duration,
}

impl BudgetLimit {
    /// Deployment budget from `max_budget` / `budget_duration`
    pub fn for_deployment(deployment: &Deployment) -> Option<Self> {
        let params = &deployment.litellm_params;
        let max_budget = params.max_budget?;
        Some(Self {
            max_budget,
            duration: budget_duration(params.budget_duration.as_deref(), deployment.id()),
        })
    }

    pub fn for_provider(provider: &str, config: &ProviderBudgetConfig) -> Self {
        Self {
            max_budget: config.max_budget,
            duration: budget_duration(Some(&config.budget_duration), provider),
        }
    }
}

fn budget_duration(raw: Option<&str>, owner: &str) -> Duration {
    let raw = raw.unwrap_or(DEFAULT_BUDGET_DURATION);
    parse_duration(raw).unwrap_or_else(|e| {
        warn!(
            "Invalid budget_duration '{}' for {}: {}; using {}",
            raw, owner, e, DEFAULT_BUDGET_DURATION
        );
        Duration::from_secs(30 * 86_400)
    })
}

/// Spend accounting over budget windows
pub struct BudgetTracker {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    router_id: String,
}

impl std::fmt::Debug for BudgetTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetTracker")
            .field("router_id", &self.router_id)
            .finish_non_exhaustive()
    }
}

impl BudgetTracker {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, router_id: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            router_id: router_id.into(),
        }
    }

    fn keys(&self, scope: BudgetScope<'_>) -> (CounterKey, CounterKey) {
        let subject = scope.subject();
        (
            budget_spend_key(&self.router_id, &subject),
            budget_start_key(&self.router_id, &subject),
        )
    }

    /// The currently open window, `None` if no spend has been recorded in it
    pub async fn window(&self, scope: BudgetScope<'_>, duration: Duration) -> Result<Option<BudgetWindow>> {
        let (spend_key, start_time_key) = self.keys(scope);
        let Some(start_ms) = self.store.get(&start_time_key).await? else {
            return Ok(None);
        };
        let start_ms = start_ms.max(0) as u64;
        let end_ms = start_ms.saturating_add(duration.as_millis() as u64);
        Ok(Some(BudgetWindow {
            budget_start: start_ms / 1000,
            spend_key,
            start_time_key,
            ttl_seconds: end_ms.saturating_sub(self.clock.now_millis()) / 1000,
        }))
    }

    /// Spend in the open window
    pub async fn current_spend(&self, scope: BudgetScope<'_>) -> Result<f64> {
        let (spend_key, start_time_key) = self.keys(scope);
        if self.store.get(&start_time_key).await?.is_none() {
            return Ok(0.0);
        }
        let micros = self.store.get(&spend_key).await?.unwrap_or(0);
        Ok(micros as f64 / MICROS_PER_UNIT)
    }

    /// Add spend, opening a window of `duration` if none is open
    pub async fn record_spend(&self, scope: BudgetScope<'_>, duration: Duration, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount <= 0.0 {
            return Ok(());
        }
        let (spend_key, start_time_key) = self.keys(scope);
        let now_ms = self.clock.now_millis();

        if self
            .store
            .set_if_absent(&start_time_key, now_ms as i64, duration)
            .await?
        {
            debug!("Opened budget window for {:?}", scope);
        }
        let start_ms = self
            .store
            .get(&start_time_key)
            .await?
            .map(|v| v.max(0) as u64)
            .unwrap_or(now_ms);
        let end_ms = start_ms.saturating_add(duration.as_millis() as u64);
        let ttl = Duration::from_millis(end_ms.saturating_sub(now_ms).max(1));

        let micros = (amount * MICROS_PER_UNIT).round() as i64;
        self.store.increment(&spend_key, micros, ttl).await?;
        Ok(())
    }

    /// Whether spend has reached `limit`; returns the spend when it has
    pub async fn exceeded(&self, scope: BudgetScope<'_>, limit: &BudgetLimit) -> Result<Option<f64>> {
        let spent = self.current_spend(scope).await?;
        Ok((spent >= limit.max_budget).then_some(spent))
    }

    /// Delete the window of one scope
    pub async fn purge(&self, scope: BudgetScope<'_>) -> Result<usize> {
        self.store
            .delete_prefix(&budget_prefix(&self.router_id, &scope.subject()))
            .await
    }
}
