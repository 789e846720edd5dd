//! Usage tracking and admission control
//!
//! Each deployment has four counters per window bucket (tpm, rpm, tpd, rpd).
//! Admission increments every window; limited windows go through the store's
//! atomic check-and-increment so concurrent callers can never push a bucket
//! past its limit. Buckets are discrete epoch minutes/days, which allows a
//! brief burst across a bucket boundary.

use super::deployment::{Deployment, DeploymentId};
use super::keys::{CounterKey, WindowKind, usage_key, usage_prefix};
use super::store::CounterStore;
use crate::utils::error::Result;
use crate::utils::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of an admission attempt
#[derive(Debug)]
pub enum Admission {
    Admitted(AdmissionTicket),
    Denied(Denial),
}

/// Why a deployment could not take a request right now
#[derive(Debug, Clone, PartialEq)]
pub struct Denial {
    pub window: WindowKind,
    pub limit: u64,
    /// Counter value at the time of denial
    pub current: u64,
    /// Time until the window rolls over
    pub retry_after: Duration,
}

/// Proof of admission, consumed when the call's real usage is known
#[derive(Debug)]
pub struct AdmissionTicket {
    deployment_id: DeploymentId,
    estimated_tokens: u64,
    /// Token buckets this admission was counted in
    token_buckets: Vec<(CounterKey, Duration)>,
}

impl AdmissionTicket {
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn estimated_tokens(&self) -> u64 {
        self.estimated_tokens
    }
}

/// Current window usage of one deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub tpm: u64,
    pub rpm: u64,
    pub tpd: u64,
    pub rpd: u64,
}

impl UsageSnapshot {
    pub fn get(&self, window: WindowKind) -> u64 {
        match window {
            WindowKind::Tpm => self.tpm,
            WindowKind::Rpm => self.rpm,
            WindowKind::Tpd => self.tpd,
            WindowKind::Rpd => self.rpd,
        }
    }

    fn set(&mut self, window: WindowKind, value: u64) {
        match window {
            WindowKind::Tpm => self.tpm = value,
            WindowKind::Rpm => self.rpm = value,
            WindowKind::Tpd => self.tpd = value,
            WindowKind::Rpd => self.rpd = value,
        }
    }
}

/// Time-windowed request and token counters
pub struct UsageTracker {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    router_id: String,
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("router_id", &self.router_id)
            .finish_non_exhaustive()
    }
}

impl UsageTracker {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, router_id: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            router_id: router_id.into(),
        }
    }

    /// Count a request of `estimated_tokens` against every window of `deployment`
    ///
    /// Either every window is incremented and a ticket returned, or nothing
    /// stays incremented and the first overflowing window is reported.
    pub async fn try_admit(&self, deployment: &Deployment, estimated_tokens: u64) -> Result<Admission> {
        let now_ms = self.clock.now_millis();
        let now_secs = now_ms / 1000;
        let tokens = i64::try_from(estimated_tokens).unwrap_or(i64::MAX);
        let mut applied: Vec<Applied> = Vec::with_capacity(WindowKind::ALL.len());

        for window in WindowKind::ALL {
            let key = usage_key(&self.router_id, deployment.id(), window, window.bucket(now_secs));
            let ttl = window.duration();
            let amount = if window.counts_tokens() { tokens } else { 1 };

            let outcome = match deployment.limit(window) {
                Some(limit) => {
                    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                    self.store
                        .increment_and_check(&key, amount, limit, ttl)
                        .await
                        .map(|(current, admitted)| (!admitted).then_some(current))
                }
                None => self.store.increment(&key, amount, ttl).await.map(|_| None),
            };

            match outcome {
                Ok(None) => applied.push(Applied {
                    window,
                    key,
                    amount,
                    ttl,
                }),
                Ok(Some(current)) => {
                    self.rollback(&applied).await;
                    let limit = deployment.limit(window).unwrap_or_default();
                    let denial = Denial {
                        window,
                        limit,
                        current: current.max(0) as u64,
                        retry_after: window.remaining_in_bucket(now_ms),
                    };
                    debug!(
                        "Deployment {} denied: {} at {}/{}",
                        deployment.id(),
                        window,
                        denial.current,
                        limit
                    );
                    return Ok(Admission::Denied(denial));
                }
                Err(e) => {
                    self.rollback(&applied).await;
                    return Err(e);
                }
            }
        }

        let token_buckets = applied
            .into_iter()
            .filter(|a| a.window.counts_tokens())
            .map(|a| (a.key, a.ttl))
            .collect();

        Ok(Admission::Admitted(AdmissionTicket {
            deployment_id: deployment.id().to_string(),
            estimated_tokens,
            token_buckets,
        }))
    }

    /// Reconcile the estimate with the tokens the call actually used
    ///
    /// Applies `actual - estimated` to the buckets the admission was counted
    /// in, even if the clock has since moved to a new bucket.
    pub async fn record_actual(&self, ticket: AdmissionTicket, actual_tokens: u64) -> Result<()> {
        let delta = actual_tokens as i128 - ticket.estimated_tokens as i128;
        if delta == 0 {
            return Ok(());
        }
        let delta = delta.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        for (key, ttl) in &ticket.token_buckets {
            self.store.increment(key, delta, *ttl).await?;
        }
        Ok(())
    }

    /// Usage in the current buckets
    pub async fn current_usage(&self, deployment_id: &str) -> Result<UsageSnapshot> {
        let now_secs = self.clock.now_secs();
        let mut snapshot = UsageSnapshot::default();
        for window in WindowKind::ALL {
            let key = usage_key(&self.router_id, deployment_id, window, window.bucket(now_secs));
            let value = self.store.get(&key).await?.unwrap_or(0);
            snapshot.set(window, value.max(0) as u64);
        }
        Ok(snapshot)
    }

    /// Delete every usage counter of a deployment
    pub async fn purge(&self, deployment_id: &str) -> Result<usize> {
        self.store
            .delete_prefix(&usage_prefix(&self.router_id, deployment_id))
            .await
    }

    async fn rollback(&self, applied: &[Applied]) {
        for a in applied {
            if let Err(e) = self.store.increment(&a.key, -a.amount, a.ttl).await {
                warn!("Failed to roll back usage counter {}: {}", a.key, e);
            }
        }
    }
}

/// An increment made during one admission
struct Applied {
    window: WindowKind,
    key: CounterKey,
    amount: i64,
    ttl: Duration,
}
